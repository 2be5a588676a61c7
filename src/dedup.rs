use std::fs;
use std::time::SystemTime;

use camino::Utf8Path;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::config::DedupTarget;
use crate::error::MedError;
use crate::store::CorpusStore;

/// Rank assigned to a candidate that cannot be parsed or whose source
/// accessor finds no countable field. Worst possible, but the file stays
/// eligible: among only-unreadable candidates the newest still survives.
pub const WORST_RANK: i64 = -1;

/// Number of records in a source body, via the documented per-source
/// accessor. `body` is the artifact's `data` payload. Returns `None`
/// for unknown sources or bodies missing the expected field.
pub fn record_count(source: &str, body: &Value) -> Option<u64> {
    let len_of = |value: &Value, field: &str| value.get(field)?.as_array().map(|arr| arr.len() as u64);
    match source {
        "pubmed" | "pmc" => len_of(body, "articles"),
        "openfda" | "openfda_label" | "openfda_event" => len_of(body, "results"),
        "rxnorm" => len_of(body, "drugs").filter(|count| *count > 0).or_else(|| {
            body.get("raw_response")?
                .get("approximateGroup")?
                .get("candidate")?
                .as_array()
                .map(|arr| arr.len() as u64)
        }),
        "who" => match body {
            Value::Array(items) => Some(items.len() as u64),
            _ => len_of(body, "results").or_else(|| len_of(body, "items")),
        },
        "ncbi_bookshelf" => len_of(body, "books"),
        "orphanet" => {
            let status_list = body.get("HPODisorderSetStatusList")?;
            match status_list.get("HPODisorderSetStatus")? {
                Value::Array(disorders) => Some(disorders.len() as u64),
                Value::Object(_) => Some(1),
                _ => None,
            }
        }
        "openstax" => len_of(body, "chapters"),
        _ => None,
    }
}

fn candidate_rank(path: &Utf8Path, source: &str) -> i64 {
    let Ok(content) = fs::read_to_string(path.as_std_path()) else {
        return WORST_RANK;
    };
    let Ok(document) = serde_json::from_str::<Value>(&content) else {
        return WORST_RANK;
    };
    // Artifacts carry the {_header, data} envelope; tolerate bare bodies.
    let body = document.get("data").unwrap_or(&document);
    match record_count(source, body) {
        Some(count) => count as i64,
        None => WORST_RANK,
    }
}

fn modified_at(path: &Utf8Path) -> SystemTime {
    fs::metadata(path.as_std_path())
        .and_then(|meta| meta.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Index of the candidate to keep: highest record count wins, newer
/// modification time breaks ties.
pub fn select_survivor(candidates: &[(i64, SystemTime)]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .max_by_key(|(_, (count, mtime))| (*count, *mtime))
        .map(|(idx, _)| idx)
}

#[derive(Debug, Clone, Serialize)]
pub struct DedupReport {
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
}

/// Reconciles each configured raw directory down to one canonical
/// artifact.
///
/// Destructive: every candidate except the top-ranked one is deleted
/// from disk and cannot be recovered. Directories with zero or one
/// candidate are left untouched, so reruns are no-ops.
pub struct Deduplicator {
    store: CorpusStore,
    targets: Vec<DedupTarget>,
}

impl Deduplicator {
    pub fn new(store: CorpusStore, targets: Vec<DedupTarget>) -> Self {
        Self { store, targets }
    }

    pub fn run(&self) -> Result<DedupReport, MedError> {
        let mut kept = Vec::new();
        let mut deleted = Vec::new();

        for target in &self.targets {
            let dir = self.store.source_dir(&target.source, target.subdir.as_deref());
            let files = CorpusStore::list_json_files(&dir)?;
            if files.len() <= 1 {
                continue;
            }

            let ranks: Vec<(i64, SystemTime)> = files
                .iter()
                .map(|path| (candidate_rank(path, target.source.as_str()), modified_at(path)))
                .collect();
            let survivor = select_survivor(&ranks).unwrap_or(0);

            kept.push(files[survivor].to_string());
            for (idx, path) in files.iter().enumerate() {
                if idx == survivor {
                    continue;
                }
                if ranks[idx].0 == WORST_RANK {
                    warn!(path = path.as_str(), "deleting unparseable duplicate");
                }
                fs::remove_file(path.as_std_path())
                    .map_err(|err| MedError::Filesystem(format!("{path}: {err}")))?;
                deleted.push(path.to_string());
            }
        }

        Ok(DedupReport { kept, deleted })
    }
}
