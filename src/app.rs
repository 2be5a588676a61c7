use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::checkpoint::CheckpointStore;
use crate::config::ResolvedConfig;
use crate::dedup::{DedupReport, Deduplicator};
use crate::error::MedError;
use crate::index::{IndexSummary, QueryMatch, SymptomIndex, SymptomIndexBuilder};
use crate::manifest::{FetchStatus, Manifest};
use crate::orchestrator::{FetchOrchestrator, RunReport};
use crate::prune::{ManifestPruner, PruneReport};
use crate::sources::SourceRegistry;
use crate::store::CorpusStore;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub terms: Vec<String>,
    pub match_all: bool,
    pub matches: Vec<QueryMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestSummary {
    pub fetch_id: String,
    pub source: String,
    pub status: FetchStatus,
    pub record_count: u64,
    pub fetched_at: String,
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub manifests: Vec<ManifestSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub fetch: RunReport,
    pub dedup: Option<DedupReport>,
    pub prune: Option<PruneReport>,
    pub index: Option<IndexSummary>,
}

impl PipelineResult {
    pub fn success(&self) -> bool {
        self.fetch.success()
    }
}

/// Wires the store, config, and source fetchers into the pipeline
/// operations: fetch → dedup → prune → index, plus queries against the
/// persisted index.
pub struct App {
    store: CorpusStore,
    config: ResolvedConfig,
    registry: SourceRegistry,
}

impl App {
    pub fn new(store: CorpusStore, config: ResolvedConfig, registry: SourceRegistry) -> Self {
        Self {
            store,
            config,
            registry,
        }
    }

    pub fn fetch(&self, reset: bool, sink: &dyn ProgressSink) -> Result<RunReport, MedError> {
        self.store.ensure_data_root()?;
        let checkpoint = CheckpointStore::new(self.store.checkpoint_path());
        if reset {
            checkpoint.reset()?;
            sink.event(ProgressEvent {
                message: "phase=Fetch; checkpoint reset".to_string(),
                elapsed: None,
            });
        }

        let orchestrator = FetchOrchestrator::new(checkpoint, self.config.jobs.clone());
        orchestrator.run(&self.registry, sink)
    }

    pub fn dedup(&self, sink: &dyn ProgressSink) -> Result<DedupReport, MedError> {
        sink.event(ProgressEvent {
            message: "phase=Dedup; reconciling raw directories".to_string(),
            elapsed: None,
        });
        let report = Deduplicator::new(self.store.clone(), self.config.dedup_targets.clone()).run()?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Dedup; kept {} files, deleted {} duplicates",
                report.kept.len(),
                report.deleted.len()
            ),
            elapsed: None,
        });
        Ok(report)
    }

    pub fn prune(&self, sink: &dyn ProgressSink) -> Result<PruneReport, MedError> {
        sink.event(ProgressEvent {
            message: "phase=Prune; reconciling manifests".to_string(),
            elapsed: None,
        });
        let report = ManifestPruner::new(self.store.clone()).run()?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Prune; retained {}, deleted {} orphan manifests",
                report.retained, report.deleted
            ),
            elapsed: None,
        });
        Ok(report)
    }

    pub fn build_index(&self, sink: &dyn ProgressSink) -> Result<IndexSummary, MedError> {
        sink.event(ProgressEvent {
            message: "phase=Index; building symptom index".to_string(),
            elapsed: None,
        });
        let start = std::time::Instant::now();
        let summary = SymptomIndexBuilder::new(self.store.clone()).build()?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Index; {} diseases, {} symptoms",
                summary.disease_count, summary.symptom_count
            ),
            elapsed: Some(start.elapsed()),
        });
        Ok(summary)
    }

    pub fn query(
        &self,
        terms: &[String],
        match_all: bool,
        sink: &dyn ProgressSink,
    ) -> Result<QueryResult, MedError> {
        sink.event(ProgressEvent {
            message: format!("phase=Query; {} term(s)", terms.len()),
            elapsed: None,
        });
        let index = SymptomIndex::load(&self.store.symptom_index_path())?;
        let matches = index.query(terms, match_all);
        Ok(QueryResult {
            terms: terms.to_vec(),
            match_all,
            matches,
        })
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, MedError> {
        sink.event(ProgressEvent {
            message: "phase=List; scanning manifests".to_string(),
            elapsed: None,
        });
        let mut manifests = Vec::new();
        for path in CorpusStore::list_json_files(&self.store.metadata_root())? {
            match Manifest::load(&path) {
                Ok(manifest) => manifests.push(ManifestSummary {
                    fetch_id: manifest.fetch_id.as_str().to_string(),
                    source: manifest.source,
                    status: manifest.status,
                    record_count: manifest.record_count,
                    fetched_at: manifest.fetched_at,
                    file_path: manifest.file_path,
                }),
                Err(err) => warn!(path = path.as_str(), %err, "skipping unreadable manifest"),
            }
        }
        manifests.sort_by(|a, b| a.fetch_id.cmp(&b.fetch_id));
        Ok(ListResult { manifests })
    }

    /// Full pipeline: fetch, then reconcile and rebuild the index. A
    /// halted fetch stops the pipeline before any destructive step.
    pub fn run(&self, reset: bool, sink: &dyn ProgressSink) -> Result<PipelineResult, MedError> {
        let fetch = self.fetch(reset, sink)?;
        if !fetch.success() {
            return Ok(PipelineResult {
                fetch,
                dedup: None,
                prune: None,
                index: None,
            });
        }

        let dedup = self.dedup(sink)?;
        let prune = self.prune(sink)?;
        let index = self.build_index(sink)?;
        Ok(PipelineResult {
            fetch,
            dedup: Some(dedup),
            prune: Some(prune),
            index: Some(index),
        })
    }
}
