use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::checkpoint::CheckpointStore;
use crate::domain::FetchJob;
use crate::error::MedError;
use crate::sources::SourceRegistry;

const ERROR_PREVIEW_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Completed in an earlier run; the fetcher was not invoked.
    Skipped,
    Done,
    Failed,
    /// Not reached because an earlier job halted the run.
    Pending,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub key: String,
    pub name: String,
    pub status: JobStatus,
    pub artifact_path: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub jobs: Vec<JobOutcome>,
    pub fetched: usize,
    pub skipped: usize,
    pub halted_on: Option<String>,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.halted_on.is_none()
    }
}

/// Sequences fetch jobs strictly in configuration order, one at a time.
/// Progress is checkpointed after every job transition, so an
/// interrupted run resumes at the first unfinished job; a failed job
/// halts the run immediately, preserving all prior progress.
pub struct FetchOrchestrator {
    checkpoint: CheckpointStore,
    jobs: Vec<FetchJob>,
}

impl FetchOrchestrator {
    pub fn new(checkpoint: CheckpointStore, jobs: Vec<FetchJob>) -> Self {
        Self { checkpoint, jobs }
    }

    pub fn run(
        &self,
        registry: &SourceRegistry,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, MedError> {
        let state = self.checkpoint.load();
        if let Some(last_error) = &state.last_error {
            sink.event(ProgressEvent {
                message: format!("phase=Resume; last error: {last_error}"),
                elapsed: None,
            });
        }
        let mut completed = state.completed;

        let mut outcomes = Vec::with_capacity(self.jobs.len());
        let mut fetched = 0usize;
        let mut skipped = 0usize;
        let mut halted_on: Option<String> = None;

        for job in &self.jobs {
            if halted_on.is_some() {
                outcomes.push(outcome(job, JobStatus::Pending, None, None));
                continue;
            }

            if completed.iter().any(|done| done == job.key.as_str()) {
                sink.event(ProgressEvent {
                    message: format!("phase=Fetch; skip {} (already done)", job.name),
                    elapsed: None,
                });
                skipped += 1;
                outcomes.push(outcome(job, JobStatus::Skipped, None, None));
                continue;
            }

            sink.event(ProgressEvent {
                message: format!("phase=Fetch; {} ({})", job.name, job.key),
                elapsed: None,
            });

            let result = match registry.get(&job.key) {
                Some(fetcher) => fetcher.fetch(job),
                None => Err(MedError::UnknownSource(job.key.as_str().to_string())),
            };

            match result {
                Ok(artifact_path) => {
                    completed.push(job.key.as_str().to_string());
                    self.checkpoint.save(&completed, None)?;
                    fetched += 1;
                    outcomes.push(outcome(
                        job,
                        JobStatus::Done,
                        Some(artifact_path.to_string()),
                        None,
                    ));
                }
                // Persistence failures stop the run; they are not job
                // failures.
                Err(err @ MedError::Persistence(_)) => return Err(err),
                Err(err) => {
                    let message = truncate_error(&err.to_string());
                    self.checkpoint.save(&completed, Some(&message))?;
                    sink.event(ProgressEvent {
                        message: format!(
                            "phase=Fetch; {} failed, run halted (rerun resumes from the next unfinished job)",
                            job.name
                        ),
                        elapsed: None,
                    });
                    halted_on = Some(job.key.as_str().to_string());
                    outcomes.push(outcome(job, JobStatus::Failed, None, Some(message)));
                }
            }
        }

        if halted_on.is_none() {
            self.checkpoint.save(&completed, None)?;
        }

        Ok(RunReport {
            jobs: outcomes,
            fetched,
            skipped,
            halted_on,
        })
    }
}

fn outcome(
    job: &FetchJob,
    status: JobStatus,
    artifact_path: Option<String>,
    error: Option<String>,
) -> JobOutcome {
    JobOutcome {
        key: job.key.as_str().to_string(),
        name: job.name.clone(),
        status,
        artifact_path,
        error,
    }
}

fn truncate_error(message: &str) -> String {
    if message.chars().count() <= ERROR_PREVIEW_LEN {
        return message.to_string();
    }
    message.chars().take(ERROR_PREVIEW_LEN).collect()
}
