use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MedError {
    #[error("invalid source key: {0}")]
    InvalidSourceKey(String),

    #[error("invalid fetch id: {0}")]
    InvalidFetchId(String),

    #[error("missing config file medcorpus.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("no fetcher registered for source: {0}")]
    UnknownSource(String),

    #[error("{source_name} request failed: {message}")]
    SourceHttp {
        source_name: String,
        message: String,
    },

    #[error("{source_name} returned status {status}: {message}")]
    SourceStatus {
        source_name: String,
        status: u16,
        message: String,
    },

    #[error("fetch failed for {source_name}: {message}")]
    SourceFetch {
        source_name: String,
        message: String,
    },

    #[error("dataset not found locally: {0}")]
    DatasetNotFound(String),

    #[error("malformed dataset {path}: {message}")]
    MalformedDataset { path: String, message: String },

    #[error("failed to persist {0}")]
    Persistence(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
