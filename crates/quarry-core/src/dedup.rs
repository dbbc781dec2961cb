//! Cross-run record of harvested item ids.
//!
//! The ledger only grows: records are created on first observation and
//! updated afterwards, never removed. When no readable ledger exists it is
//! rebuilt from the harvests already on disk.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{HarvestBatch, HarvestItem, RunStamp};
use crate::traits::{HarvestArchive, SnapshotStore};

/// History of one item id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Runs that observed the item, in observation order, without repeats.
    pub occurrence_runs: Vec<String>,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub resource_id: String,
}

/// Item metadata kept alongside its id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemMeta {
    pub author_id: String,
    pub resource_id: String,
}

impl From<&HarvestItem> for ItemMeta {
    fn from(item: &HarvestItem) -> Self {
        Self {
            author_id: item.author_id.clone(),
            resource_id: item.resource_id.clone(),
        }
    }
}

/// Persisted form of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupSnapshot {
    #[serde(default)]
    pub records: BTreeMap<String, DedupRecord>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Where the in-memory history came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySource {
    /// Loaded from a persisted ledger.
    Existing,
    /// Reconstructed from this many archived harvests.
    Rebuilt { harvests: usize },
    /// Nothing to load or rebuild from.
    Empty,
}

/// Counts from one [`DedupLedger::filter_new`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub total_processed: usize,
    pub new_count: usize,
    pub duplicate_count: usize,
}

/// Dedup status of a single item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemStatus {
    pub is_duplicate: bool,
    pub first_seen: Option<DateTime<Utc>>,
    pub collection_count: usize,
}

/// Re-observation statistics over the whole ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OccurrenceStats {
    pub total_items: usize,
    /// Items observed in more than one run.
    pub repeated_items: usize,
    /// Number of runs → number of items observed in that many runs.
    pub distribution: BTreeMap<usize, usize>,
    /// Most frequently re-observed ids with their run counts.
    pub most_repeated: Vec<(String, usize)>,
}

/// Durable set of item ids seen by previous runs.
pub struct DedupLedger {
    records: HashMap<String, DedupRecord>,
    source: HistorySource,
    store: Arc<dyn SnapshotStore<DedupSnapshot>>,
}

impl DedupLedger {
    /// Load the ledger, rebuilding it from `archive` when the stored ledger is
    /// missing or unreadable. Never fails: an empty ledger is a valid start.
    pub fn load(store: Arc<dyn SnapshotStore<DedupSnapshot>>, archive: &dyn HarvestArchive) -> Self {
        match store.load() {
            Ok(Some(snapshot)) => {
                tracing::info!(items = snapshot.records.len(), "Loaded dedup ledger");
                return Self {
                    records: snapshot.records.into_iter().collect(),
                    source: HistorySource::Existing,
                    store,
                };
            }
            Ok(None) => {
                tracing::info!("No dedup ledger found, rebuilding from archived harvests");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dedup ledger unreadable, rebuilding from archived harvests");
            }
        }

        let mut ledger = Self {
            records: HashMap::new(),
            source: HistorySource::Empty,
            store,
        };
        ledger.rebuild(archive);
        ledger
    }

    fn rebuild(&mut self, archive: &dyn HarvestArchive) {
        let mut harvests = match archive.scan() {
            Ok(harvests) => harvests,
            Err(e) => {
                tracing::warn!(error = %e, "Archive scan failed, starting with an empty ledger");
                return;
            }
        };
        harvests.sort_by_key(|h| h.collected_at);

        for harvest in &harvests {
            for item in &harvest.items {
                self.observe(
                    &item.item_id,
                    ItemMeta::from(item),
                    &harvest.run_id,
                    harvest.collected_at,
                );
            }
            tracing::debug!(source = %harvest.source, items = harvest.items.len(), "Replayed archived harvest");
        }

        if self.records.is_empty() {
            return;
        }
        self.source = HistorySource::Rebuilt {
            harvests: harvests.len(),
        };
        tracing::info!(
            items = self.records.len(),
            harvests = harvests.len(),
            "Dedup ledger rebuilt"
        );
        if let Err(e) = self.save() {
            tracing::warn!(error = %e, "Failed to persist rebuilt dedup ledger");
        }
    }

    pub fn history_source(&self) -> HistorySource {
        self.source
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_known(&self, item_id: &str) -> bool {
        self.records.contains_key(item_id)
    }

    pub fn record(&self, item_id: &str) -> Option<&DedupRecord> {
        self.records.get(item_id)
    }

    /// Record that `run` observed `item_id`. Returns true if the id was new.
    pub fn record_observation(&mut self, item_id: &str, meta: ItemMeta, run: &RunStamp) -> bool {
        self.observe(item_id, meta, &run.run_id, run.started_at)
    }

    fn observe(&mut self, item_id: &str, meta: ItemMeta, run_id: &str, at: DateTime<Utc>) -> bool {
        match self.records.get_mut(item_id) {
            Some(record) => {
                if !record.occurrence_runs.iter().any(|r| r == run_id) {
                    record.occurrence_runs.push(run_id.to_string());
                }
                if at > record.last_seen {
                    record.last_seen = at;
                }
                false
            }
            None => {
                self.records.insert(
                    item_id.to_string(),
                    DedupRecord {
                        first_seen: at,
                        last_seen: at,
                        occurrence_runs: vec![run_id.to_string()],
                        author_id: meta.author_id,
                        resource_id: meta.resource_id,
                    },
                );
                true
            }
        }
    }

    /// Keep only items no earlier run has seen, recording every item.
    ///
    /// Resources and children left without items are dropped from the result.
    pub fn filter_new(&mut self, batch: &HarvestBatch, run: &RunStamp) -> (HarvestBatch, FilterStats) {
        let mut fresh = HarvestBatch::new();
        let mut stats = FilterStats::default();

        for resource_batch in batch.resources.values() {
            for child_batch in resource_batch.children.values() {
                let mut new_items = Vec::new();
                for item in &child_batch.items {
                    stats.total_processed += 1;
                    if self.record_observation(&item.item_id, ItemMeta::from(item), run) {
                        stats.new_count += 1;
                        new_items.push(item.clone());
                    } else {
                        stats.duplicate_count += 1;
                    }
                }
                if !new_items.is_empty() {
                    fresh.merge_items(&resource_batch.resource, &child_batch.child, new_items);
                }
            }
        }

        tracing::info!(
            total = stats.total_processed,
            new = stats.new_count,
            duplicates = stats.duplicate_count,
            "Deduplication complete"
        );
        (fresh, stats)
    }

    pub fn save(&self) -> Result<(), AppError> {
        let snapshot = DedupSnapshot {
            records: self
                .records
                .iter()
                .map(|(id, record)| (id.clone(), record.clone()))
                .collect(),
            updated_at: Some(Utc::now()),
        };
        self.store.save(&snapshot)
    }

    pub fn status(&self, item_id: &str) -> ItemStatus {
        match self.records.get(item_id) {
            Some(record) => ItemStatus {
                is_duplicate: true,
                first_seen: Some(record.first_seen),
                collection_count: record.occurrence_runs.len(),
            },
            None => ItemStatus {
                is_duplicate: false,
                first_seen: None,
                collection_count: 0,
            },
        }
    }

    /// Run-count distribution plus the `top_n` most re-observed ids.
    pub fn occurrence_stats(&self, top_n: usize) -> OccurrenceStats {
        let mut stats = OccurrenceStats {
            total_items: self.records.len(),
            ..OccurrenceStats::default()
        };

        let mut repeated = Vec::new();
        for (id, record) in &self.records {
            let runs = record.occurrence_runs.len();
            *stats.distribution.entry(runs).or_default() += 1;
            if runs > 1 {
                repeated.push((id.clone(), runs));
            }
        }
        stats.repeated_items = repeated.len();

        repeated.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        repeated.truncate(top_n);
        stats.most_repeated = repeated;
        stats
    }
}
