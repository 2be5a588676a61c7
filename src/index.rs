use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::MedError;
use crate::store::CorpusStore;

/// One inverted-index posting: (disease code, disease name, frequency
/// label, phenotype term id). Serialized as a four-element array.
pub type IndexEntry = (String, String, String, String);

/// A disease as returned from queries: (code, name, frequency). The
/// phenotype term id is dropped so multiple phenotype terms for the
/// same disease collapse into one result.
pub type DiseaseRef = (String, String, String);

/// Normalization applied to every indexed and queried term: trim,
/// collapse internal whitespace, case-fold. Equal-after-normalization
/// terms always land in the same bucket.
pub fn normalize_symptom(term: &str) -> String {
    term.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Disorder parsed out of the phenotypes dataset. Transient: exists
/// only while the index is being built.
#[derive(Debug, Clone)]
pub struct DisorderRecord {
    pub code: String,
    pub name: String,
    pub associations: Vec<PhenotypeAssociation>,
}

#[derive(Debug, Clone)]
pub struct PhenotypeAssociation {
    pub term_id: String,
    pub term: String,
    pub frequency: String,
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        // XML-derived documents wrap element text in a `_text` field.
        Value::Object(map) => map.get("_text")?.as_str().map(str::to_string),
        _ => None,
    }
}

/// The dataset encodes one-element collections as bare objects.
fn as_object_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    }
}

pub fn extract_disorders(document: &Value) -> Vec<&Value> {
    let body = document.get("data").unwrap_or(document);
    let Some(status_list) = body
        .get("HPODisorderSetStatusList")
        .and_then(|list| list.get("HPODisorderSetStatus"))
    else {
        return Vec::new();
    };
    as_object_list(status_list)
}

/// A disorder missing its code or name contributes nothing to the index.
pub fn extract_disorder(entry: &Value) -> Option<DisorderRecord> {
    let disorder = entry.get("Disorder")?;
    let code = value_as_string(disorder.get("OrphaCode")?)?;
    let name = value_as_string(disorder.get("Name")?)?;
    if code.is_empty() || name.is_empty() {
        return None;
    }

    let associations = disorder
        .get("HPODisorderAssociationList")
        .and_then(|list| list.get("HPODisorderAssociation"))
        .map(as_object_list)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|assoc| {
            let hpo = assoc.get("HPO")?;
            let term = value_as_string(hpo.get("HPOTerm")?)?;
            if term.is_empty() {
                return None;
            }
            let term_id = hpo
                .get("HPOId")
                .and_then(value_as_string)
                .unwrap_or_default();
            let frequency = assoc
                .get("HPOFrequency")
                .and_then(|freq| freq.get("Name"))
                .and_then(value_as_string)
                .unwrap_or_default();
            Some(PhenotypeAssociation {
                term_id,
                term,
                frequency,
            })
        })
        .collect();

    Some(DisorderRecord {
        code,
        name,
        associations,
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexPayload {
    source: String,
    symptom_to_diseases: BTreeMap<String, Vec<IndexEntry>>,
    disease_count: usize,
    symptom_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub source: String,
    pub output_path: String,
    pub disease_count: usize,
    pub symptom_count: usize,
}

/// Builds the symptom→disease inverted index from the canonical
/// phenotypes dataset and persists it under `normalized/`.
pub struct SymptomIndexBuilder {
    store: CorpusStore,
}

impl SymptomIndexBuilder {
    pub fn new(store: CorpusStore) -> Self {
        Self { store }
    }

    pub fn build(&self) -> Result<IndexSummary, MedError> {
        let dataset_path = self.canonical_dataset()?;
        let content = fs::read_to_string(dataset_path.as_std_path())
            .map_err(|err| MedError::Filesystem(format!("{dataset_path}: {err}")))?;
        let document: Value =
            serde_json::from_str(&content).map_err(|err| MedError::MalformedDataset {
                path: dataset_path.to_string(),
                message: err.to_string(),
            })?;

        let (index, disease_count) = build_index_map(&document);

        let payload = IndexPayload {
            source: dataset_path.to_string(),
            symptom_count: index.len(),
            disease_count,
            symptom_to_diseases: index,
        };
        let output_path = self.store.symptom_index_path();
        CorpusStore::write_json_atomic(&output_path, &payload)
            .map_err(|err| MedError::Persistence(format!("symptom index: {err}")))?;

        Ok(IndexSummary {
            source: payload.source,
            output_path: output_path.to_string(),
            disease_count: payload.disease_count,
            symptom_count: payload.symptom_count,
        })
    }

    /// The single post-dedup phenotypes artifact; with several still
    /// present the newest wins, matching the deduplicator's tie-break.
    fn canonical_dataset(&self) -> Result<Utf8PathBuf, MedError> {
        let dir = self.store.disease_dataset_dir();
        let files = CorpusStore::list_json_files(&dir)?;
        files
            .into_iter()
            .max_by_key(|path| {
                fs::metadata(path.as_std_path())
                    .and_then(|meta| meta.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
            })
            .ok_or_else(|| MedError::DatasetNotFound(dir.to_string()))
    }
}

pub fn build_index_map(document: &Value) -> (BTreeMap<String, Vec<IndexEntry>>, usize) {
    let mut index: BTreeMap<String, Vec<IndexEntry>> = BTreeMap::new();
    let mut diseases = BTreeSet::new();

    for entry in extract_disorders(document) {
        let Some(disorder) = extract_disorder(entry) else {
            warn!("skipping disorder without code or name");
            continue;
        };
        diseases.insert(disorder.code.clone());

        for assoc in &disorder.associations {
            let normalized = normalize_symptom(&assoc.term);
            if normalized.is_empty() {
                continue;
            }
            let posting = (
                disorder.code.clone(),
                disorder.name.clone(),
                assoc.frequency.clone(),
                assoc.term_id.clone(),
            );
            let bucket = index.entry(normalized).or_default();
            if !bucket.contains(&posting) {
                bucket.push(posting);
            }
        }
    }

    (index, diseases.len())
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryMatch {
    pub disease_code: String,
    pub disease_name: String,
    pub matched_symptoms: Vec<String>,
    pub frequency: String,
    pub reference_url: String,
}

pub fn reference_url(code: &str) -> String {
    format!("https://www.orpha.net/consor/cgi-bin/OC_Exp.php?lng=en&Expert={code}")
}

/// In-memory view of the persisted index, answering boolean multi-term
/// queries.
#[derive(Debug, Default)]
pub struct SymptomIndex {
    symptom_to_diseases: BTreeMap<String, Vec<IndexEntry>>,
}

impl SymptomIndex {
    /// Loads the persisted index; a missing file yields an empty index
    /// rather than an error.
    pub fn load(path: &Utf8Path) -> Result<Self, MedError> {
        if !path.as_std_path().exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| MedError::Filesystem(format!("{path}: {err}")))?;
        let payload: IndexPayload =
            serde_json::from_str(&content).map_err(|err| MedError::MalformedDataset {
                path: path.to_string(),
                message: err.to_string(),
            })?;
        Ok(Self {
            symptom_to_diseases: payload.symptom_to_diseases,
        })
    }

    pub fn from_map(symptom_to_diseases: BTreeMap<String, Vec<IndexEntry>>) -> Self {
        Self {
            symptom_to_diseases,
        }
    }

    pub fn symptom_count(&self) -> usize {
        self.symptom_to_diseases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symptom_to_diseases.is_empty()
    }

    /// Diseases for one term. Exact bucket lookup first; on a miss,
    /// falls back to a substring scan over every indexed key (linear in
    /// the number of distinct terms).
    pub fn diseases_for(&self, term: &str) -> BTreeSet<DiseaseRef> {
        let normalized = normalize_symptom(term);
        if normalized.is_empty() {
            return BTreeSet::new();
        }

        let mut result: BTreeSet<DiseaseRef> = self
            .symptom_to_diseases
            .get(&normalized)
            .into_iter()
            .flatten()
            .map(|(code, name, freq, _)| (code.clone(), name.clone(), freq.clone()))
            .collect();

        if result.is_empty() {
            for (key, entries) in &self.symptom_to_diseases {
                if key.contains(&normalized) || normalized.contains(key.as_str()) {
                    result.extend(
                        entries
                            .iter()
                            .map(|(code, name, freq, _)| (code.clone(), name.clone(), freq.clone())),
                    );
                }
            }
        }

        result
    }

    /// Boolean multi-term query. Terms with no results are discarded;
    /// the rest are intersected (`match_all`) or unioned. If every term
    /// comes up empty the query returns no matches.
    pub fn query(&self, terms: &[String], match_all: bool) -> Vec<QueryMatch> {
        if terms.is_empty() {
            return Vec::new();
        }

        let sets: Vec<BTreeSet<DiseaseRef>> = terms
            .iter()
            .map(|term| self.diseases_for(term))
            .filter(|set| !set.is_empty())
            .collect();

        let Some(first) = sets.first().cloned() else {
            return Vec::new();
        };

        let combined = sets.iter().skip(1).fold(first, |acc, set| {
            if match_all {
                acc.intersection(set).cloned().collect()
            } else {
                acc.union(set).cloned().collect()
            }
        });

        combined
            .into_iter()
            .map(|(code, name, frequency)| QueryMatch {
                reference_url: reference_url(&code),
                disease_code: code,
                disease_name: name,
                matched_symptoms: terms.to_vec(),
                frequency,
            })
            .collect()
    }
}
