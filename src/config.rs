use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{FetchJob, SourceKey};
use crate::error::MedError;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub data_root: Option<String>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
    #[serde(default)]
    pub jobs: Option<Vec<JobEntry>>,
    #[serde(default)]
    pub dedup: Option<Vec<DedupEntry>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_min_backoff_secs")]
    pub min_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_backoff_secs: default_min_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_min_backoff_secs() -> u64 {
    2
}

fn default_max_backoff_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub rate_limit_per_sec: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum JobEntry {
    Shorthand(String),
    Detailed(JobEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct JobEntryObject {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DedupEntry {
    pub source: String,
    #[serde(default)]
    pub subdir: Option<String>,
}

/// One (source directory, optional subdirectory) pair the deduplicator
/// reconciles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupTarget {
    pub source: SourceKey,
    pub subdir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub data_root: Utf8PathBuf,
    pub retry: RetryConfig,
    pub jobs: Vec<FetchJob>,
    pub dedup_targets: Vec<DedupTarget>,
    rate_limits: BTreeMap<String, f64>,
}

impl ResolvedConfig {
    /// Minimum delay between two requests to the same source.
    pub fn rate_limit_delay(&self, source: &SourceKey) -> Duration {
        let per_sec = self
            .rate_limits
            .get(source.as_str())
            .copied()
            .unwrap_or(DEFAULT_RATE_LIMIT_PER_SEC);
        if per_sec > 0.0 {
            Duration::from_secs_f64(1.0 / per_sec)
        } else {
            Duration::ZERO
        }
    }
}

const DEFAULT_RATE_LIMIT_PER_SEC: f64 = 3.0;

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, MedError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("medcorpus.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Err(MedError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| MedError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| MedError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, MedError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let data_root = Utf8PathBuf::from(config.data_root.unwrap_or_else(|| "data".to_string()));
        let retry = config.retry.unwrap_or_default();

        let jobs = match config.jobs {
            Some(entries) => entries
                .into_iter()
                .map(|entry| match entry {
                    JobEntry::Shorthand(value) => {
                        let key: SourceKey = value.parse()?;
                        Ok(FetchJob {
                            name: key.as_str().to_string(),
                            key,
                            params: Value::Null,
                        })
                    }
                    JobEntry::Detailed(obj) => {
                        let key: SourceKey = obj.key.parse()?;
                        Ok(FetchJob {
                            name: obj.name.unwrap_or_else(|| key.as_str().to_string()),
                            key,
                            params: obj.params.unwrap_or(Value::Null),
                        })
                    }
                })
                .collect::<Result<Vec<_>, MedError>>()?,
            None => default_jobs(),
        };

        let dedup_targets = match config.dedup {
            Some(entries) => entries
                .into_iter()
                .map(|entry| {
                    Ok(DedupTarget {
                        source: entry.source.parse()?,
                        subdir: entry.subdir,
                    })
                })
                .collect::<Result<Vec<_>, MedError>>()?,
            None => default_dedup_targets(),
        };

        Ok(ResolvedConfig {
            schema_version,
            data_root,
            retry,
            jobs,
            dedup_targets,
            rate_limits: config
                .sources
                .into_iter()
                .filter_map(|(key, source)| source.rate_limit_per_sec.map(|value| (key, value)))
                .collect(),
        })
    }
}

/// Standard fetch plan when the config file does not override `jobs`.
/// Order matters: the orchestrator runs these strictly in sequence.
pub fn default_jobs() -> Vec<FetchJob> {
    let entries = [
        ("orphanet", "Orphanet", serde_json::json!({"dataset": "phenotypes"})),
        (
            "pubmed",
            "PubMed",
            serde_json::json!({"term": "rare disease", "max_records": 5000}),
        ),
        (
            "pmc",
            "PMC",
            serde_json::json!({"term": "rare disease", "max_records": 2000}),
        ),
        (
            "openfda_label",
            "OpenFDA (labels)",
            serde_json::json!({"endpoint": "label", "max_records": 25000}),
        ),
        (
            "openfda_event",
            "OpenFDA (events)",
            serde_json::json!({"endpoint": "event", "max_records": 25000}),
        ),
        (
            "rxnorm",
            "RxNorm",
            serde_json::json!({"query": "aspirin", "max_records": 100}),
        ),
        (
            "who",
            "WHO",
            serde_json::json!({"endpoint": "documents", "limit": 200}),
        ),
        (
            "ncbi_bookshelf",
            "NCBI Bookshelf",
            serde_json::json!({"term": "pharmacology", "max_records": 100}),
        ),
        (
            "openstax",
            "OpenStax (pharmacology)",
            serde_json::json!({"book": "pharmacology"}),
        ),
    ];
    entries
        .into_iter()
        .map(|(key, name, params)| FetchJob {
            key: key.parse().unwrap(),
            name: name.to_string(),
            params,
        })
        .collect()
}

/// Directories the deduplicator reconciles when `dedup` is not overridden.
pub fn default_dedup_targets() -> Vec<DedupTarget> {
    let entries = [
        ("pubmed", None),
        ("pmc", None),
        ("openfda", Some("label")),
        ("openfda", Some("event")),
        ("rxnorm", None),
        ("who", Some("documents")),
        ("ncbi_bookshelf", Some("sections")),
        ("orphanet", Some("phenotypes")),
        ("openstax", Some("extracted")),
    ];
    entries
        .into_iter()
        .map(|(source, subdir)| DedupTarget {
            source: source.parse().unwrap(),
            subdir: subdir.map(str::to_string),
        })
        .collect()
}
