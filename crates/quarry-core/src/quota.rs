//! Daily operation budget for the remote API.
//!
//! Every remote call is charged against a fixed daily capacity. The ledger is a
//! cheap-to-clone handle over a single critical section: the affordability
//! re-check, the increment, the log append and the snapshot write all happen
//! under one lock, so interleaved callers can never push `used` past
//! `capacity`. The rate-limit pause after a charge happens outside the lock.
//!
//! ```text
//! load ──> [reset if resetDate < today] ──> check_affordable / charge* ──> persist
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::traits::SnapshotStore;

/// Kinds of remote operation, each with a fixed cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Keyword search listing.
    Search,
    /// Resource (channel) details lookup.
    ResourceDetails,
    /// Child (video) listing or details page.
    ChildListing,
    /// Comment thread page.
    ThreadListing,
    /// Reply listing for one thread.
    ReplyListing,
}

impl OperationKind {
    pub const fn cost(self) -> u64 {
        match self {
            OperationKind::Search => 100,
            OperationKind::ResourceDetails => 1,
            OperationKind::ChildListing => 1,
            OperationKind::ThreadListing => 1,
            OperationKind::ReplyListing => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Search => "search",
            OperationKind::ResourceDetails => "resource_details",
            OperationKind::ChildListing => "child_listing",
            OperationKind::ThreadListing => "thread_listing",
            OperationKind::ReplyListing => "reply_listing",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One committed charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: OperationKind,
    pub cost: u64,
    #[serde(default)]
    pub note: String,
    pub total_used: u64,
}

/// Persisted budget state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub used: u64,
    pub capacity: u64,
    pub reset_date: NaiveDate,
    #[serde(default)]
    pub operation_log: Vec<OperationRecord>,
}

impl BudgetSnapshot {
    pub fn fresh(capacity: u64, today: NaiveDate) -> Self {
        Self {
            used: 0,
            capacity,
            reset_date: today,
            operation_log: Vec::new(),
        }
    }

    fn remaining(&self) -> u64 {
        self.capacity.saturating_sub(self.used)
    }

    fn affordable(&self, cost: u64) -> bool {
        self.used + cost <= self.capacity
    }

    /// Copy with the log trimmed to its most recent `keep` entries.
    fn trimmed(&self, keep: usize) -> Self {
        let skip = self.operation_log.len().saturating_sub(keep);
        Self {
            operation_log: self.operation_log[skip..].to_vec(),
            ..self.clone()
        }
    }
}

/// Budget configuration.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Daily capacity in cost units.
    pub capacity: u64,
    /// Pause applied after every successful charge.
    pub call_delay: Duration,
    /// Number of log entries kept in the persisted snapshot.
    pub log_retention: usize,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            call_delay: Duration::from_millis(100),
            log_retention: 100,
        }
    }
}

impl QuotaConfig {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }
}

/// Per-kind usage totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindUsage {
    pub count: u64,
    pub total_cost: u64,
}

/// Budget status for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaSummary {
    pub used: u64,
    pub capacity: u64,
    pub remaining: u64,
    pub percentage_used: f64,
    pub reset_date: NaiveDate,
    pub operations: BTreeMap<OperationKind, KindUsage>,
}

/// Shared handle to the daily budget.
#[derive(Clone)]
pub struct QuotaLedger {
    config: QuotaConfig,
    state: Arc<Mutex<BudgetSnapshot>>,
    store: Arc<dyn SnapshotStore<BudgetSnapshot>>,
}

impl QuotaLedger {
    /// Load the budget for `today`, resetting it if the stored day is older.
    ///
    /// A missing snapshot starts a fresh day. An unreadable one is an error:
    /// operating with unknown spend is not allowed.
    pub fn load(
        store: Arc<dyn SnapshotStore<BudgetSnapshot>>,
        config: QuotaConfig,
        today: NaiveDate,
    ) -> Result<Self, AppError> {
        let (mut snapshot, dirty) = match store.load()? {
            Some(snapshot) if snapshot.reset_date < today => {
                tracing::info!(
                    previous_day = %snapshot.reset_date,
                    previous_used = snapshot.used,
                    "New quota day, resetting budget"
                );
                (BudgetSnapshot::fresh(config.capacity, today), true)
            }
            Some(snapshot) => (snapshot, false),
            None => (BudgetSnapshot::fresh(config.capacity, today), true),
        };

        let dirty = dirty || snapshot.capacity != config.capacity;
        snapshot.capacity = config.capacity;

        if dirty {
            store.save(&snapshot.trimmed(config.log_retention))?;
        }

        tracing::debug!(
            used = snapshot.used,
            capacity = snapshot.capacity,
            "Quota ledger loaded"
        );

        Ok(Self {
            config,
            state: Arc::new(Mutex::new(snapshot)),
            store,
        })
    }

    /// [`load`](Self::load) using the local calendar day.
    pub fn load_today(
        store: Arc<dyn SnapshotStore<BudgetSnapshot>>,
        config: QuotaConfig,
    ) -> Result<Self, AppError> {
        Self::load(store, config, Local::now().date_naive())
    }

    fn lock_state(&self) -> MutexGuard<'_, BudgetSnapshot> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned quota mutex");
            poisoned.into_inner()
        })
    }

    /// True iff an operation of `kind` fits in the remaining budget.
    pub fn check_affordable(&self, kind: OperationKind) -> bool {
        self.lock_state().affordable(kind.cost())
    }

    /// Commit the cost of one operation.
    ///
    /// Affordability is re-checked here; this check is authoritative over any
    /// earlier [`check_affordable`](Self::check_affordable). The snapshot is
    /// persisted before the lock is released, then the configured rate-limit
    /// pause is applied.
    pub async fn charge(&self, kind: OperationKind, note: &str) -> Result<(), AppError> {
        let cost = kind.cost();
        {
            let mut state = self.lock_state();
            if !state.affordable(cost) {
                return Err(AppError::QuotaExceeded {
                    used: state.used,
                    capacity: state.capacity,
                    requested: cost,
                });
            }

            state.used += cost;
            let total_used = state.used;
            state.operation_log.push(OperationRecord {
                timestamp: Utc::now(),
                kind,
                cost,
                note: note.to_string(),
                total_used,
            });
            self.store
                .save(&state.trimmed(self.config.log_retention))?;

            tracing::trace!(%kind, cost, total_used, note, "Quota charged");
        }

        if !self.config.call_delay.is_zero() {
            tokio::time::sleep(self.config.call_delay).await;
        }
        Ok(())
    }

    pub fn remaining(&self) -> u64 {
        self.lock_state().remaining()
    }

    pub fn used(&self) -> u64 {
        self.lock_state().used
    }

    pub fn capacity(&self) -> u64 {
        self.lock_state().capacity
    }

    /// Current in-memory state, including the full log for the day.
    pub fn snapshot(&self) -> BudgetSnapshot {
        self.lock_state().clone()
    }

    /// Write the current state to the store.
    pub fn persist(&self) -> Result<(), AppError> {
        let state = self.lock_state();
        self.store.save(&state.trimmed(self.config.log_retention))
    }

    pub fn summary(&self) -> QuotaSummary {
        let state = self.lock_state();
        let mut operations: BTreeMap<OperationKind, KindUsage> = BTreeMap::new();
        for record in &state.operation_log {
            let usage = operations.entry(record.kind).or_default();
            usage.count += 1;
            usage.total_cost += record.cost;
        }
        let percentage_used = if state.capacity == 0 {
            100.0
        } else {
            state.used as f64 * 100.0 / state.capacity as f64
        };

        QuotaSummary {
            used: state.used,
            capacity: state.capacity,
            remaining: state.remaining(),
            percentage_used,
            reset_date: state.reset_date,
            operations,
        }
    }

    /// How many more resources of the given shape today's budget can cover.
    pub fn resources_remaining(&self, children: u64, reply_expansions: u64) -> u64 {
        let per_resource = estimate_resource_cost(children, reply_expansions);
        self.remaining() / per_resource.max(1)
    }
}

/// Rough cost of harvesting one resource with `children` children, assuming one
/// thread page per child and `reply_expansions` extra reply listings.
pub fn estimate_resource_cost(children: u64, reply_expansions: u64) -> u64 {
    let listing_pages = children / 50 + 1;
    OperationKind::ResourceDetails.cost()
        + 2 * OperationKind::ChildListing.cost() * listing_pages
        + OperationKind::ThreadListing.cost() * children
        + OperationKind::ReplyListing.cost() * reply_expansions
}
