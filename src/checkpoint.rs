use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::MedError;
use crate::store::CorpusStore;

/// Persisted record of which fetch jobs have completed and the last
/// error seen. `completed` keeps insertion order so reruns replay the
/// original job sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Checkpoint {
    pub fn is_completed(&self, key: &str) -> bool {
        self.completed.iter().any(|done| done == key)
    }
}

/// Durable checkpoint persistence. Loads are tolerant (missing or
/// corrupt state reads as a fresh run); saves are whole-file atomic so
/// a crash mid-write cannot corrupt resumability.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: Utf8PathBuf,
}

impl CheckpointStore {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn load(&self) -> Checkpoint {
        let Ok(content) = fs::read_to_string(self.path.as_std_path()) else {
            return Checkpoint::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    pub fn save(&self, completed: &[String], last_error: Option<&str>) -> Result<(), MedError> {
        let checkpoint = Checkpoint {
            completed: completed.to_vec(),
            last_error: last_error.map(str::to_string),
        };
        CorpusStore::write_json_atomic(&self.path, &checkpoint)
            .map_err(|err| MedError::Persistence(format!("checkpoint: {err}")))
    }

    pub fn reset(&self) -> Result<(), MedError> {
        self.save(&[], None)
    }
}
