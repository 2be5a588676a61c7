use std::fs;
use std::time::{Duration, SystemTime};

use camino::Utf8PathBuf;

use medcorpus::config::DedupTarget;
use medcorpus::dedup::Deduplicator;
use medcorpus::store::CorpusStore;

fn store_in(dir: &std::path::Path) -> CorpusStore {
    CorpusStore::new(Utf8PathBuf::from_path_buf(dir.join("data")).unwrap())
}

fn pubmed_target() -> Vec<DedupTarget> {
    vec![DedupTarget {
        source: "pubmed".parse().unwrap(),
        subdir: None,
    }]
}

fn write_candidate(store: &CorpusStore, name: &str, articles: usize, mtime: SystemTime) {
    let dir = store.source_dir(&"pubmed".parse().unwrap(), None);
    fs::create_dir_all(dir.as_std_path()).unwrap();
    let path = dir.join(name);
    let body = serde_json::json!({
        "_header": {"source": "pubmed", "fetch_id": name.trim_end_matches(".json")},
        "data": {"articles": vec![serde_json::json!({}); articles]}
    });
    fs::write(path.as_std_path(), serde_json::to_vec(&body).unwrap()).unwrap();
    let file = fs::File::options()
        .write(true)
        .open(path.as_std_path())
        .unwrap();
    file.set_modified(mtime).unwrap();
}

fn surviving_files(store: &CorpusStore) -> Vec<String> {
    let dir = store.source_dir(&"pubmed".parse().unwrap(), None);
    let mut names: Vec<String> = fs::read_dir(dir.as_std_path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn count_dominates_then_newer_mtime_wins() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(temp.path());
    let t1 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
    let t2 = t1 + Duration::from_secs(3600);

    write_candidate(&store, "pubmed_20240301_100000.json", 10, t2);
    write_candidate(&store, "pubmed_20240302_100000.json", 25, t1);
    write_candidate(&store, "pubmed_20240303_100000.json", 25, t2);

    let report = Deduplicator::new(store.clone(), pubmed_target())
        .run()
        .unwrap();

    assert_eq!(report.deleted.len(), 2);
    assert_eq!(surviving_files(&store), vec!["pubmed_20240303_100000.json"]);
}

#[test]
fn single_candidate_is_untouched() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(temp.path());
    write_candidate(
        &store,
        "pubmed_20240301_100000.json",
        5,
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000),
    );

    let report = Deduplicator::new(store.clone(), pubmed_target())
        .run()
        .unwrap();

    assert!(report.deleted.is_empty());
    assert!(report.kept.is_empty());
    assert_eq!(surviving_files(&store), vec!["pubmed_20240301_100000.json"]);
}

#[test]
fn missing_directory_is_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(temp.path());

    let report = Deduplicator::new(store, pubmed_target()).run().unwrap();

    assert!(report.kept.is_empty());
    assert!(report.deleted.is_empty());
}

#[test]
fn unparseable_candidate_ranks_worst_but_stays_eligible() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(temp.path());
    let t1 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
    let t2 = t1 + Duration::from_secs(3600);

    write_candidate(&store, "pubmed_20240301_100000.json", 3, t1);
    let dir = store.source_dir(&"pubmed".parse().unwrap(), None);
    let broken = dir.join("pubmed_20240302_100000.json");
    fs::write(broken.as_std_path(), b"{not json").unwrap();
    let file = fs::File::options()
        .write(true)
        .open(broken.as_std_path())
        .unwrap();
    file.set_modified(t2).unwrap();

    Deduplicator::new(store.clone(), pubmed_target())
        .run()
        .unwrap();

    // A parseable file with any count beats a newer unparseable one.
    assert_eq!(surviving_files(&store), vec!["pubmed_20240301_100000.json"]);
}

#[test]
fn all_unparseable_keeps_newest() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(temp.path());
    let dir = store.source_dir(&"pubmed".parse().unwrap(), None);
    fs::create_dir_all(dir.as_std_path()).unwrap();
    let t1 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
    let t2 = t1 + Duration::from_secs(3600);

    for (name, mtime) in [
        ("pubmed_20240301_100000.json", t1),
        ("pubmed_20240302_100000.json", t2),
    ] {
        let path = dir.join(name);
        fs::write(path.as_std_path(), b"{not json").unwrap();
        let file = fs::File::options()
            .write(true)
            .open(path.as_std_path())
            .unwrap();
        file.set_modified(mtime).unwrap();
    }

    Deduplicator::new(store.clone(), pubmed_target())
        .run()
        .unwrap();

    assert_eq!(surviving_files(&store), vec!["pubmed_20240302_100000.json"]);
}

#[test]
fn rerun_is_idempotent() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(temp.path());
    let t1 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);

    write_candidate(&store, "pubmed_20240301_100000.json", 10, t1);
    write_candidate(
        &store,
        "pubmed_20240302_100000.json",
        20,
        t1 + Duration::from_secs(60),
    );

    let dedup = Deduplicator::new(store.clone(), pubmed_target());
    let first = dedup.run().unwrap();
    assert_eq!(first.deleted.len(), 1);

    let second = dedup.run().unwrap();
    assert!(second.deleted.is_empty());
    assert_eq!(surviving_files(&store), vec!["pubmed_20240302_100000.json"]);
}
