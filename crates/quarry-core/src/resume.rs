use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::traits::SnapshotStore;

/// Pagination progress for one child resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeState {
    pub pages_processed: u32,
    /// Cursor of the next page to fetch; `None` before the first page and after the last.
    pub page_cursor: Option<String>,
    pub is_complete: bool,
    #[serde(default)]
    pub seen_item_ids: HashSet<String>,
}

impl ResumeState {
    pub fn is_started(&self) -> bool {
        self.pages_processed > 0
    }
}

/// Resume states for one day, keyed by child id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeBook {
    pub day: NaiveDate,
    #[serde(default)]
    pub states: BTreeMap<String, ResumeState>,
}

impl ResumeBook {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day,
            states: BTreeMap::new(),
        }
    }

    /// Load the book for `today`. A book from another day, a missing book
    /// and an unreadable book all yield an empty one.
    pub fn load(store: &dyn SnapshotStore<ResumeBook>, today: NaiveDate) -> Self {
        match store.load() {
            Ok(Some(book)) if book.day == today => {
                tracing::info!(children = book.states.len(), "Resuming from saved progress");
                book
            }
            Ok(Some(book)) => {
                tracing::info!(stale_day = %book.day, "Discarding resume state from another day");
                Self::new(today)
            }
            Ok(None) => Self::new(today),
            Err(e) => {
                tracing::warn!(error = %e, "Resume state unreadable, starting fresh");
                Self::new(today)
            }
        }
    }

    pub fn get(&self, child_id: &str) -> Option<&ResumeState> {
        self.states.get(child_id)
    }

    pub fn state_mut(&mut self, child_id: &str) -> &mut ResumeState {
        self.states.entry(child_id.to_string()).or_default()
    }

    pub fn is_complete(&self, child_id: &str) -> bool {
        self.get(child_id).is_some_and(|s| s.is_complete)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
