use std::collections::HashSet;
use std::fs;

use camino::Utf8Path;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::domain::FetchId;
use crate::error::MedError;
use crate::store::CorpusStore;

#[derive(Debug, Clone, Serialize)]
pub struct PruneReport {
    pub retained: usize,
    pub deleted: usize,
    pub deleted_manifests: Vec<String>,
}

/// Deletes manifests whose fetch id no longer matches any raw artifact.
/// Run after deduplication so orphaned metadata does not outlive the
/// artifacts it described.
pub struct ManifestPruner {
    store: CorpusStore,
}

impl ManifestPruner {
    pub fn new(store: CorpusStore) -> Self {
        Self { store }
    }

    pub fn run(&self) -> Result<PruneReport, MedError> {
        let retained = self.retained_fetch_ids()?;

        let mut deleted_manifests = Vec::new();
        for path in CorpusStore::list_json_files(&self.store.metadata_root())? {
            let Some(fetch_id) = manifest_fetch_id(&path) else {
                continue;
            };
            if retained.contains(fetch_id.as_str()) {
                continue;
            }
            fs::remove_file(path.as_std_path())
                .map_err(|err| MedError::Filesystem(format!("{path}: {err}")))?;
            deleted_manifests.push(path.to_string());
        }

        Ok(PruneReport {
            retained: retained.len(),
            deleted: deleted_manifests.len(),
            deleted_manifests,
        })
    }

    /// Fetch ids of every surviving raw artifact. The id comes from the
    /// artifact's `_header`; an artifact that cannot be read or parsed
    /// is still retained via its file stem, so a transiently unreadable
    /// file cannot orphan its manifest.
    fn retained_fetch_ids(&self) -> Result<HashSet<String>, MedError> {
        let mut retained = HashSet::new();
        for path in CorpusStore::walk_files(&self.store.raw_root())? {
            if path.extension() != Some("json") {
                continue;
            }
            match artifact_fetch_id(&path) {
                Some(fetch_id) => {
                    retained.insert(fetch_id);
                }
                None => {
                    if let Some(stem) = fetch_id_from_stem(&path) {
                        warn!(
                            path = path.as_str(),
                            "unreadable artifact, retaining by file stem"
                        );
                        retained.insert(stem);
                    }
                }
            }
        }
        Ok(retained)
    }
}

fn artifact_fetch_id(path: &Utf8Path) -> Option<String> {
    let content = fs::read_to_string(path.as_std_path()).ok()?;
    let document: Value = serde_json::from_str(&content).ok()?;
    let fetch_id = document.get("_header")?.get("fetch_id")?.as_str()?;
    Some(fetch_id.to_string())
}

fn fetch_id_from_stem(path: &Utf8Path) -> Option<String> {
    let stem = path.file_stem()?;
    stem.parse::<FetchId>().ok().map(|id| id.as_str().to_string())
}

fn manifest_fetch_id(path: &Utf8Path) -> Option<String> {
    let stem = path.file_stem()?;
    stem.strip_suffix("_manifest").map(str::to_string)
}
