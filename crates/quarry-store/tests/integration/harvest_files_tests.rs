use std::fs;
use std::sync::Arc;

use quarry_core::dedup::{DedupLedger, DedupSnapshot, HistorySource};
use quarry_core::models::HarvestBatch;
use quarry_core::traits::{HarvestArchive, HarvestSink, SnapshotStore};
use quarry_core::util::parse_run_id;
use quarry_store::{HarvestFiles, JsonSnapshotStore};

use crate::common::{resource_batch, resource_batch_for, run, temp_store};

#[test]
fn rewriting_a_batch_does_not_duplicate_items() {
    let (config, _dir) = temp_store();
    let files = HarvestFiles::new(config.raw_dir());
    let stamp = run("20250301_080000");

    let first = files.write_resource(&resource_batch(&["a", "b"]), &stamp).unwrap();
    let second = files.write_resource(&resource_batch(&["a", "b", "c"]), &stamp).unwrap();
    assert_eq!(first, second);

    let harvests = files.scan().unwrap();
    assert_eq!(harvests.len(), 1);
    let ids: Vec<_> = harvests[0].items.iter().map(|i| i.item_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(harvests[0].run_id, "20250301_080000");
}

#[test]
fn lookalike_channel_names_get_separate_files() {
    let (config, _dir) = temp_store();
    let files = HarvestFiles::new(config.raw_dir());
    let stamp = run("20250301_080000");

    let a = files
        .write_resource(&resource_batch_for("UC_A", "PW NEET", &["a1"]), &stamp)
        .unwrap();
    let b = files
        .write_resource(&resource_batch_for("UC_B", "PW/NEET", &["b1"]), &stamp)
        .unwrap();
    assert_ne!(a, b);

    let harvests = files.scan().unwrap();
    assert_eq!(harvests.len(), 2);
    for harvest in &harvests {
        let ids: Vec<_> = harvest.items.iter().map(|i| i.item_id.as_str()).collect();
        if harvest.source.contains("UC_A") {
            assert_eq!(ids, vec!["a1"]);
        } else {
            assert_eq!(ids, vec!["b1"]);
        }
    }
}

#[test]
fn ledger_rebuilds_from_harvest_files() {
    let (config, _dir) = temp_store();
    let files = HarvestFiles::new(config.raw_dir());
    let early = run("20250301_080000");
    let late = run("20250302_080000");

    files.write_resource(&resource_batch(&["B", "C"]), &late).unwrap();
    files.write_resource(&resource_batch(&["A", "B"]), &early).unwrap();

    let store: Arc<dyn SnapshotStore<DedupSnapshot>> =
        Arc::new(JsonSnapshotStore::new(config.history_path()));
    let ledger = DedupLedger::load(store.clone(), &files);

    assert_eq!(ledger.history_source(), HistorySource::Rebuilt { harvests: 2 });
    assert_eq!(ledger.len(), 3);

    let b = ledger.record("B").unwrap();
    assert_eq!(b.first_seen, early.started_at);
    assert_eq!(b.last_seen, late.started_at);
    assert_eq!(b.occurrence_runs, vec![early.run_id.clone(), late.run_id.clone()]);
    assert_eq!(ledger.record("A").unwrap().last_seen, early.started_at);
    assert_eq!(ledger.record("C").unwrap().first_seen, late.started_at);

    let saved = store.load().unwrap().unwrap();
    assert_eq!(saved.records.len(), 3);
}

#[test]
fn scan_falls_back_to_filename_timestamp() {
    let (config, _dir) = temp_store();
    fs::create_dir_all(config.raw_dir()).unwrap();
    let legacy = serde_json::json!({
        "resource": {"id": "c1", "display_name": "Old"},
        "children": {
            "v9": {
                "child": {
                    "id": "v9",
                    "parent_id": "c1",
                    "title": "Old video",
                    "comment_count_estimate": 3
                },
                "items": [{
                    "item_id": "x1",
                    "resource_id": "v9",
                    "is_reply": false,
                    "raw_text": "hello"
                }]
            }
        }
    });
    fs::write(
        config.raw_dir().join("comments_Old_20240105_120000.json"),
        serde_json::to_string(&legacy).unwrap(),
    )
    .unwrap();
    fs::write(config.raw_dir().join("comments_broken_20240106_120000.json"), "nope").unwrap();
    fs::write(config.raw_dir().join("comments_undated.json"), serde_json::to_string(&legacy).unwrap())
        .unwrap();

    let harvests = HarvestFiles::new(config.raw_dir()).scan().unwrap();
    assert_eq!(harvests.len(), 1);
    assert_eq!(harvests[0].run_id, "20240105_120000");
    assert_eq!(
        harvests[0].collected_at,
        parse_run_id("20240105_120000").unwrap()
    );
    assert_eq!(harvests[0].items[0].item_id, "x1");
}

#[test]
fn emergency_dump_is_not_part_of_the_archive() {
    let (config, _dir) = temp_store();
    let files = HarvestFiles::new(config.raw_dir());
    let stamp = run("20250301_080000");

    let mut batch = HarvestBatch::new();
    batch
        .resources
        .insert("c1".into(), resource_batch(&["a", "b"]));

    let path = files.dump(&batch, "interrupted", &stamp).unwrap();
    assert!(path.ends_with("backup_interrupted_20250301_080000.json"));

    let dumped: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(dumped["item_count"], 2);
    assert!(files.scan().unwrap().is_empty());
}

#[test]
fn scan_of_missing_directory_is_empty() {
    let (config, _dir) = temp_store();
    let files = HarvestFiles::new(config.raw_dir().join("nowhere"));
    assert!(files.scan().unwrap().is_empty());
}
