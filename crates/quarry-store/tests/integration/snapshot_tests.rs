use std::fs;
use std::sync::Arc;

use quarry_core::dedup::{DedupLedger, DedupSnapshot, HistorySource, ItemMeta};
use quarry_core::quota::{BudgetSnapshot, OperationKind, QuotaConfig, QuotaLedger};
use quarry_core::resume::ResumeBook;
use quarry_core::traits::{NullStore, SnapshotStore};
use quarry_core::AppError;
use quarry_store::JsonSnapshotStore;

use crate::common::{day, run, temp_store};

fn no_delay(capacity: u64) -> QuotaConfig {
    QuotaConfig::new(capacity).with_call_delay(std::time::Duration::ZERO)
}

#[tokio::test]
async fn budget_survives_restart() {
    let (config, _dir) = temp_store();
    let store: Arc<dyn SnapshotStore<BudgetSnapshot>> =
        Arc::new(JsonSnapshotStore::new(config.quota_path()));

    let ledger = QuotaLedger::load(store.clone(), no_delay(1_000), day(2025, 3, 1)).unwrap();
    ledger.charge(OperationKind::Search, "search").await.unwrap();
    ledger
        .charge(OperationKind::ThreadListing, "threads")
        .await
        .unwrap();

    let reloaded = QuotaLedger::load(store, no_delay(1_000), day(2025, 3, 1)).unwrap();
    assert_eq!(reloaded.used(), 101);
    assert_eq!(reloaded.remaining(), 899);

    let raw = fs::read_to_string(config.quota_path()).unwrap();
    assert!(raw.contains("\n"), "snapshot is pretty-printed");
}

#[tokio::test]
async fn budget_resets_on_new_day() {
    let (config, _dir) = temp_store();
    let store: Arc<dyn SnapshotStore<BudgetSnapshot>> =
        Arc::new(JsonSnapshotStore::new(config.quota_path()));

    let ledger = QuotaLedger::load(store.clone(), no_delay(500), day(2025, 3, 1)).unwrap();
    ledger.charge(OperationKind::Search, "search").await.unwrap();

    let next_day = QuotaLedger::load(store.clone(), no_delay(500), day(2025, 3, 2)).unwrap();
    assert_eq!(next_day.used(), 0);
    assert_eq!(store.load().unwrap().unwrap().reset_date, day(2025, 3, 2));
}

#[test]
fn corrupt_budget_refuses_to_load() {
    let (config, _dir) = temp_store();
    fs::create_dir_all(config.data_dir()).unwrap();
    fs::write(config.quota_path(), "{ not json").unwrap();

    let store: Arc<dyn SnapshotStore<BudgetSnapshot>> =
        Arc::new(JsonSnapshotStore::new(config.quota_path()));
    let result = QuotaLedger::load(store, no_delay(500), day(2025, 3, 1));
    assert!(matches!(result, Err(AppError::LedgerIo(_))));
}

#[test]
fn dedup_ledger_round_trips() {
    let (config, _dir) = temp_store();
    let store: Arc<dyn SnapshotStore<DedupSnapshot>> =
        Arc::new(JsonSnapshotStore::new(config.history_path()));

    let mut ledger = DedupLedger::load(store.clone(), &NullStore);
    assert_eq!(ledger.history_source(), HistorySource::Empty);
    assert!(ledger.record_observation("a", ItemMeta::default(), &run("20250301_080000")));
    ledger.save().unwrap();

    let reloaded = DedupLedger::load(store, &NullStore);
    assert_eq!(reloaded.history_source(), HistorySource::Existing);
    assert!(reloaded.is_known("a"));
    assert_eq!(reloaded.status("a").collection_count, 1);
}

#[test]
fn resume_book_kept_for_same_day_only() {
    let (config, _dir) = temp_store();
    let store = JsonSnapshotStore::<ResumeBook>::new(config.resume_path());

    let mut book = ResumeBook::new(day(2025, 3, 1));
    let state = book.state_mut("v1");
    state.pages_processed = 3;
    state.page_cursor = Some("next".into());
    store.save(&book).unwrap();

    let same_day = ResumeBook::load(&store, day(2025, 3, 1));
    assert_eq!(same_day.get("v1").unwrap().pages_processed, 3);

    let next_day = ResumeBook::load(&store, day(2025, 3, 2));
    assert!(next_day.is_empty());
}
