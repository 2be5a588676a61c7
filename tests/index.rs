use std::collections::BTreeSet;
use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use medcorpus::error::MedError;
use medcorpus::index::{SymptomIndex, SymptomIndexBuilder};
use medcorpus::store::CorpusStore;

fn store_in(dir: &std::path::Path) -> CorpusStore {
    CorpusStore::new(Utf8PathBuf::from_path_buf(dir.join("data")).unwrap())
}

fn write_dataset(store: &CorpusStore, document: &serde_json::Value) {
    let dir = store.disease_dataset_dir();
    fs::create_dir_all(dir.as_std_path()).unwrap();
    let path = dir.join("orphanet_20240309_143005.json");
    fs::write(path.as_std_path(), serde_json::to_vec_pretty(document).unwrap()).unwrap();
}

fn sample_dataset() -> serde_json::Value {
    let disorder = |code: u32, name: &str, terms: &[(&str, &str, &str)]| {
        serde_json::json!({
            "Disorder": {
                "OrphaCode": code,
                "Name": name,
                "HPODisorderAssociationList": {
                    "HPODisorderAssociation": terms
                        .iter()
                        .map(|(id, term, freq)| serde_json::json!({
                            "HPO": {"HPOId": id, "HPOTerm": term},
                            "HPOFrequency": {"Name": freq}
                        }))
                        .collect::<Vec<_>>()
                }
            }
        })
    };

    serde_json::json!({
        "_header": {
            "source": "orphanet",
            "fetch_id": "orphanet_20240309_143005",
            "fetched_at": "2024-03-09T14:30:05Z",
            "schema_version": "1.0"
        },
        "data": {
            "HPODisorderSetStatusList": {
                "HPODisorderSetStatus": [
                    disorder(558, "Marfan syndrome", &[
                        ("HP:0001166", "Arachnodactyly", "Very frequent (99-80%)"),
                        ("HP:0001519", "Disproportionate tall stature", "Very frequent (99-80%)"),
                        ("HP:0001945", "Acute fever", "Occasional (29-5%)"),
                    ]),
                    disorder(773, "Example syndrome", &[
                        ("HP:0001945", "Acute fever", "Frequent (79-30%)"),
                        ("HP:0002013", "Vomiting", "Frequent (79-30%)"),
                    ]),
                ]
            }
        }
    })
}

fn triples(index: &SymptomIndex, term: &str) -> BTreeSet<(String, String, String)> {
    index.diseases_for(term)
}

#[test]
fn build_persists_and_counts() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(temp.path());
    write_dataset(&store, &sample_dataset());

    let summary = SymptomIndexBuilder::new(store.clone()).build().unwrap();

    assert_eq!(summary.disease_count, 2);
    assert_eq!(summary.symptom_count, 4);
    assert!(store.symptom_index_path().as_std_path().exists());
}

#[test]
fn build_without_dataset_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(temp.path());

    let err = SymptomIndexBuilder::new(store).build().unwrap_err();
    assert_matches!(err, MedError::DatasetNotFound(_));
}

#[test]
fn round_trip_preserves_query_results() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(temp.path());
    write_dataset(&store, &sample_dataset());
    SymptomIndexBuilder::new(store.clone()).build().unwrap();

    let index = SymptomIndex::load(&store.symptom_index_path()).unwrap();
    assert_eq!(index.symptom_count(), 4);

    let fever = triples(&index, "acute fever");
    assert_eq!(fever.len(), 2);
    assert!(fever.contains(&(
        "558".to_string(),
        "Marfan syndrome".to_string(),
        "Occasional (29-5%)".to_string()
    )));
    assert!(fever.contains(&(
        "773".to_string(),
        "Example syndrome".to_string(),
        "Frequent (79-30%)".to_string()
    )));
}

#[test]
fn missing_index_file_yields_empty_index() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(temp.path());

    let index = SymptomIndex::load(&store.symptom_index_path()).unwrap();
    assert!(index.is_empty());
    assert!(index.query(&["fever".to_string()], true).is_empty());
}

#[test]
fn query_intersection_law() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(temp.path());
    write_dataset(&store, &sample_dataset());
    SymptomIndexBuilder::new(store.clone()).build().unwrap();
    let index = SymptomIndex::load(&store.symptom_index_path()).unwrap();

    let a = "acute fever".to_string();
    let b = "vomiting".to_string();

    let combined: BTreeSet<(String, String, String)> = index
        .query(&[a.clone(), b.clone()], true)
        .into_iter()
        .map(|m| (m.disease_code, m.disease_name, m.frequency))
        .collect();

    let lhs: BTreeSet<(String, String, String)> = index
        .query(std::slice::from_ref(&a), true)
        .into_iter()
        .map(|m| (m.disease_code, m.disease_name, m.frequency))
        .collect();
    let rhs: BTreeSet<(String, String, String)> = index
        .query(std::slice::from_ref(&b), true)
        .into_iter()
        .map(|m| (m.disease_code, m.disease_name, m.frequency))
        .collect();

    let expected: BTreeSet<_> = lhs.intersection(&rhs).cloned().collect();
    assert_eq!(combined, expected);
    assert_eq!(combined.len(), 1);
    assert_eq!(combined.iter().next().unwrap().0, "773");
}

#[test]
fn union_mode_merges_result_sets() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(temp.path());
    write_dataset(&store, &sample_dataset());
    SymptomIndexBuilder::new(store.clone()).build().unwrap();
    let index = SymptomIndex::load(&store.symptom_index_path()).unwrap();

    let matches = index.query(
        &["arachnodactyly".to_string(), "vomiting".to_string()],
        false,
    );
    let codes: BTreeSet<&str> = matches.iter().map(|m| m.disease_code.as_str()).collect();
    assert_eq!(codes, BTreeSet::from(["558", "773"]));
}

#[test]
fn substring_fallback_finds_partial_terms() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(temp.path());
    write_dataset(&store, &sample_dataset());
    SymptomIndexBuilder::new(store.clone()).build().unwrap();
    let index = SymptomIndex::load(&store.symptom_index_path()).unwrap();

    // No exact "fever" bucket exists; "acute fever" matches by substring.
    let fever = triples(&index, "fever");
    assert_eq!(fever.len(), 2);

    // The reverse direction works too: the query contains an indexed key.
    let verbose = triples(&index, "severe vomiting");
    assert_eq!(verbose.len(), 1);
}

#[test]
fn all_empty_terms_return_no_matches() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(temp.path());
    write_dataset(&store, &sample_dataset());
    SymptomIndexBuilder::new(store.clone()).build().unwrap();
    let index = SymptomIndex::load(&store.symptom_index_path()).unwrap();

    for match_all in [true, false] {
        assert!(
            index
                .query(&["zzz".to_string(), "qqq".to_string()], match_all)
                .is_empty()
        );
    }
}

#[test]
fn query_results_carry_reference_urls() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(temp.path());
    write_dataset(&store, &sample_dataset());
    SymptomIndexBuilder::new(store.clone()).build().unwrap();
    let index = SymptomIndex::load(&store.symptom_index_path()).unwrap();

    let matches = index.query(&["arachnodactyly".to_string()], true);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].disease_code, "558");
    assert!(matches[0].reference_url.contains("Expert=558"));
    assert_eq!(matches[0].matched_symptoms, vec!["arachnodactyly"]);
}
