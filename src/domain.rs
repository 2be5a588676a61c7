use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MedError;

/// Identifier of one configured data source, unique within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceKey(String);

impl SourceKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SourceKey {
    type Err = MedError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let is_valid = !normalized.is_empty()
            && normalized.starts_with(|ch: char| ch.is_ascii_lowercase())
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_');
        if !is_valid {
            return Err(MedError::InvalidSourceKey(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Identifier of one fetch attempt: `<source>_<YYYYMMDD>_<HHMMSS>` (UTC).
/// Unique per (source, timestamp-second); doubles as the raw artifact
/// file stem and the manifest file prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchId(String);

fn fetch_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9_]*_\d{8}_\d{6}$").unwrap()
    })
}

impl FetchId {
    pub fn generate(source: &SourceKey, at: DateTime<Utc>) -> Self {
        Self(format!("{}_{}", source.as_str(), at.format("%Y%m%d_%H%M%S")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The source segment, with the trailing date and time segments removed.
    pub fn source(&self) -> &str {
        let mut end = self.0.len();
        for _ in 0..2 {
            end = self.0[..end].rfind('_').unwrap_or(0);
        }
        &self.0[..end]
    }
}

impl fmt::Display for FetchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FetchId {
    type Err = MedError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !fetch_id_pattern().is_match(trimmed) {
            return Err(MedError::InvalidFetchId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// One configured (source, parameters) unit of work in a pipeline run.
/// The ordered job list is fixed configuration; jobs never change while
/// a run is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchJob {
    pub key: SourceKey,
    pub name: String,
    #[serde(default)]
    pub params: Value,
}
