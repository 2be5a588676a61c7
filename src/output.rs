use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ListResult, PipelineResult, ProgressEvent, ProgressSink, QueryResult};
use crate::dedup::DedupReport;
use crate::index::IndexSummary;
use crate::orchestrator::RunReport;
use crate::prune::PruneReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &RunReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_dedup(result: &DedupReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_prune(result: &PruneReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_index(result: &IndexSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_query(result: &QueryResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_pipeline(result: &PipelineResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress sink for interactive runs: one line per event on stderr so
/// stdout stays parseable.
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => eprintln!("{}", event.message),
        }
    }
}
