use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{FetchId, SourceKey};
use crate::error::MedError;

/// Filesystem layout of the local corpus:
///
/// ```text
/// <data_root>/
///   .fetch_checkpoint.json
///   raw/<source>[/<subdir>]/<fetch_id>.json
///   metadata/<fetch_id>_manifest.json
///   normalized/symptom_index.json
/// ```
#[derive(Debug, Clone)]
pub struct CorpusStore {
    data_root: Utf8PathBuf,
}

impl CorpusStore {
    pub fn new(data_root: Utf8PathBuf) -> Self {
        Self { data_root }
    }

    pub fn data_root(&self) -> &Utf8Path {
        &self.data_root
    }

    pub fn raw_root(&self) -> Utf8PathBuf {
        self.data_root.join("raw")
    }

    pub fn metadata_root(&self) -> Utf8PathBuf {
        self.data_root.join("metadata")
    }

    pub fn normalized_root(&self) -> Utf8PathBuf {
        self.data_root.join("normalized")
    }

    pub fn checkpoint_path(&self) -> Utf8PathBuf {
        self.data_root.join(".fetch_checkpoint.json")
    }

    pub fn source_dir(&self, source: &SourceKey, subdir: Option<&str>) -> Utf8PathBuf {
        let dir = self.raw_root().join(source.as_str());
        match subdir {
            Some(subdir) => dir.join(subdir),
            None => dir,
        }
    }

    pub fn artifact_path(
        &self,
        source: &SourceKey,
        subdir: Option<&str>,
        fetch_id: &FetchId,
    ) -> Utf8PathBuf {
        self.source_dir(source, subdir)
            .join(format!("{fetch_id}.json"))
    }

    pub fn manifest_path(&self, fetch_id: &FetchId) -> Utf8PathBuf {
        self.metadata_root()
            .join(format!("{fetch_id}_manifest.json"))
    }

    pub fn symptom_index_path(&self) -> Utf8PathBuf {
        self.normalized_root().join("symptom_index.json")
    }

    /// Directory holding the hierarchical disease/phenotype dataset the
    /// symptom index is built from.
    pub fn disease_dataset_dir(&self) -> Utf8PathBuf {
        self.raw_root().join("orphanet").join("phenotypes")
    }

    pub fn ensure_data_root(&self) -> Result<(), MedError> {
        fs::create_dir_all(self.data_root.as_std_path())
            .map_err(|err| MedError::Filesystem(err.to_string()))
    }

    /// Whole-file replace: a concurrent reader sees either the previous
    /// content or the new content, never a partial write.
    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), MedError> {
        let parent = path
            .parent()
            .ok_or_else(|| MedError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| MedError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix(".medcorpus")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| MedError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content).map_err(|err| MedError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| MedError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), MedError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| MedError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    /// JSON files directly inside `dir`, in unspecified order. A missing
    /// directory yields an empty list.
    pub fn list_json_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, MedError> {
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        let entries = fs::read_dir(dir.as_std_path())
            .map_err(|err| MedError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| MedError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_file() && path.extension().map(|ext| ext == "json").unwrap_or(false) {
                let path = Utf8PathBuf::from_path_buf(path)
                    .map_err(|_| MedError::Filesystem("non-utf8 path in store".to_string()))?;
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Every file under `root`, recursively. A missing root yields an
    /// empty list.
    pub fn walk_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, MedError> {
        if !root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut items = Vec::new();
        for path in walk_dir(root.as_std_path())? {
            if path.is_file() {
                let path = Utf8PathBuf::from_path_buf(path)
                    .map_err(|_| MedError::Filesystem("non-utf8 path in store".to_string()))?;
                items.push(path);
            }
        }
        Ok(items)
    }
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, MedError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| MedError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| MedError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}
