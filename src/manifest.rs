use std::fs;
use std::io::Read;

use camino::Utf8Path;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::{FetchId, SourceKey};
use crate::error::MedError;
use crate::store::CorpusStore;

pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Success,
    Failure,
}

/// Metadata record for one fetch attempt, success or failure. Written
/// exactly once per attempt and never mutated; only the pruner removes
/// manifests, and only when their artifact is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub source: String,
    pub fetch_id: FetchId,
    pub fetched_at: String,
    pub schema_version: String,
    pub api_endpoint: String,
    pub query_params: Value,
    pub record_count: u64,
    pub total_available: Option<u64>,
    pub file_path: String,
    pub checksum_sha256: Option<String>,
    pub status: FetchStatus,
    pub error: Option<String>,
}

impl Manifest {
    pub fn load(path: &Utf8Path) -> Result<Self, MedError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| MedError::Filesystem(format!("{path}: {err}")))?;
        serde_json::from_str(&content)
            .map_err(|err| MedError::Filesystem(format!("{path}: {err}")))
    }
}

/// Envelope header prepended to every raw artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub source: String,
    pub fetch_id: FetchId,
    pub fetched_at: String,
    pub schema_version: String,
}

fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn sha256_hex(path: &Utf8Path) -> Result<String, MedError> {
    let mut file = fs::File::open(path.as_std_path())
        .map_err(|err| MedError::Filesystem(format!("{path}: {err}")))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 65536];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|err| MedError::Filesystem(format!("{path}: {err}")))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    let digest = hasher.finalize();
    Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
}

/// Persists raw artifacts and their manifests. One artifact plus one
/// manifest per successful fetch; one failure manifest (no artifact)
/// per failed fetch.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    store: CorpusStore,
}

pub struct RawWrite<'a> {
    pub source: &'a SourceKey,
    pub subdir: Option<&'a str>,
    pub fetch_id: &'a FetchId,
    pub data: &'a Value,
    pub api_endpoint: &'a str,
    pub query_params: Value,
    pub record_count: u64,
    pub total_available: Option<u64>,
}

impl ArtifactWriter {
    pub fn new(store: CorpusStore) -> Self {
        Self { store }
    }

    pub fn write_raw(&self, write: RawWrite<'_>) -> Result<camino::Utf8PathBuf, MedError> {
        let fetched_at = utc_timestamp();
        let envelope = serde_json::json!({
            "_header": ArtifactHeader {
                source: write.source.as_str().to_string(),
                fetch_id: write.fetch_id.clone(),
                fetched_at: fetched_at.clone(),
                schema_version: SCHEMA_VERSION.to_string(),
            },
            "data": write.data,
        });

        let artifact_path = self
            .store
            .artifact_path(write.source, write.subdir, write.fetch_id);
        let content = serde_json::to_vec_pretty(&envelope)
            .map_err(|err| MedError::Filesystem(err.to_string()))?;
        CorpusStore::write_bytes_atomic(&artifact_path, &content)?;

        let checksum = sha256_hex(&artifact_path)?;
        let manifest = Manifest {
            source: write.source.as_str().to_string(),
            fetch_id: write.fetch_id.clone(),
            fetched_at,
            schema_version: SCHEMA_VERSION.to_string(),
            api_endpoint: write.api_endpoint.to_string(),
            query_params: write.query_params,
            record_count: write.record_count,
            total_available: write.total_available,
            file_path: artifact_path.to_string(),
            checksum_sha256: Some(checksum),
            status: FetchStatus::Success,
            error: None,
        };
        self.save_manifest(&manifest)?;

        Ok(artifact_path)
    }

    pub fn write_failure(
        &self,
        source: &SourceKey,
        fetch_id: &FetchId,
        api_endpoint: &str,
        query_params: Value,
        error: &str,
    ) -> Result<(), MedError> {
        let manifest = Manifest {
            source: source.as_str().to_string(),
            fetch_id: fetch_id.clone(),
            fetched_at: utc_timestamp(),
            schema_version: SCHEMA_VERSION.to_string(),
            api_endpoint: api_endpoint.to_string(),
            query_params,
            record_count: 0,
            total_available: None,
            file_path: String::new(),
            checksum_sha256: None,
            status: FetchStatus::Failure,
            error: Some(error.to_string()),
        };
        self.save_manifest(&manifest)
    }

    fn save_manifest(&self, manifest: &Manifest) -> Result<(), MedError> {
        let path = self.store.manifest_path(&manifest.fetch_id);
        CorpusStore::write_json_atomic(&path, manifest)
            .map_err(|err| MedError::Persistence(format!("manifest: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    fn writer_in(dir: &std::path::Path) -> (ArtifactWriter, CorpusStore) {
        let root = Utf8PathBuf::from_path_buf(dir.join("data")).unwrap();
        let store = CorpusStore::new(root);
        (ArtifactWriter::new(store.clone()), store)
    }

    #[test]
    fn write_raw_persists_envelope_and_manifest() {
        let temp = tempfile::tempdir().unwrap();
        let (writer, store) = writer_in(temp.path());
        let source: SourceKey = "orphanet".parse().unwrap();
        let fetch_id: FetchId = "orphanet_20240309_143005".parse().unwrap();

        let path = writer
            .write_raw(RawWrite {
                source: &source,
                subdir: Some("phenotypes"),
                fetch_id: &fetch_id,
                data: &serde_json::json!({"records": [1, 2, 3]}),
                api_endpoint: "https://example.org/product4",
                query_params: serde_json::json!({"dataset": "phenotypes"}),
                record_count: 3,
                total_available: Some(3),
            })
            .unwrap();

        let envelope: Value =
            serde_json::from_str(&fs::read_to_string(path.as_std_path()).unwrap()).unwrap();
        assert_eq!(envelope["_header"]["source"], "orphanet");
        assert_eq!(envelope["_header"]["fetch_id"], "orphanet_20240309_143005");
        assert!(
            envelope["_header"]["fetched_at"]
                .as_str()
                .unwrap()
                .ends_with('Z')
        );
        assert_eq!(envelope["data"]["records"][2], 3);

        let manifest = Manifest::load(&store.manifest_path(&fetch_id)).unwrap();
        assert_eq!(manifest.status, FetchStatus::Success);
        assert_eq!(manifest.record_count, 3);
        assert_eq!(manifest.checksum_sha256, Some(sha256_hex(&path).unwrap()));
        assert!(manifest.error.is_none());
    }

    #[test]
    fn write_failure_persists_manifest_without_artifact() {
        let temp = tempfile::tempdir().unwrap();
        let (writer, store) = writer_in(temp.path());
        let source: SourceKey = "pubmed".parse().unwrap();
        let fetch_id: FetchId = "pubmed_20240309_143005".parse().unwrap();

        writer
            .write_failure(
                &source,
                &fetch_id,
                "https://example.org/esearch",
                serde_json::json!({"term": "rare disease"}),
                "connection reset",
            )
            .unwrap();

        let manifest = Manifest::load(&store.manifest_path(&fetch_id)).unwrap();
        assert_eq!(manifest.status, FetchStatus::Failure);
        assert_eq!(manifest.record_count, 0);
        assert_eq!(manifest.error.as_deref(), Some("connection reset"));
        assert!(manifest.file_path.is_empty());
        assert!(store.source_dir(&source, None).as_std_path().read_dir().is_err());
    }
}
