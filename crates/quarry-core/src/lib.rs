pub mod config;
pub mod dedup;
pub mod enumerate;
pub mod error;
pub mod harvest;
pub mod models;
pub mod orchestrator;
pub mod quota;
pub mod resume;
pub mod retry;
pub mod traits;
pub mod util;
pub mod views;

#[cfg(test)]
mod testutil;

pub use config::{ClassPolicy, HarvestConfig, PriorityAllowList};
pub use dedup::{DedupLedger, DedupSnapshot, FilterStats, HistorySource};
pub use enumerate::ResourceEnumerator;
pub use error::AppError;
pub use harvest::{HarvestOutcome, HarvestState, ThreadHarvester};
pub use models::{
    Annotation, ArchivedHarvest, ChildResource, HarvestBatch, HarvestItem, Resource,
    ResourceBatch, ResourceClass, RunStamp, Sentiment,
};
pub use orchestrator::{
    CollectionOrchestrator, CollectionReport, HarvestEvent, HarvestReporter,
    TracingHarvestReporter,
};
pub use quota::{BudgetSnapshot, OperationKind, QuotaConfig, QuotaLedger};
pub use resume::{ResumeBook, ResumeState};
pub use retry::{RetryPolicy, RetryingCaller};
pub use traits::{
    ContentApi, HarvestArchive, HarvestSink, IdentityResolver, NullStore, ResourceClassifier,
    SnapshotStore, TextAnnotator,
};
