use std::future::Future;

use crate::error::AppError;
use crate::models::{
    Annotation, ArchivedHarvest, ChildResource, CommentThread, HarvestBatch, HarvestItem, Page,
    Resource, ResourceBatch, ResourceClass, RunStamp,
};

/// The remote content API. Only listing shapes and failure classes matter here;
/// costs are charged by the caller through the quota ledger.
pub trait ContentApi: Send + Sync + Clone {
    /// Id of the chronological uploads listing for a resource, if it has one.
    fn uploads_listing_id(
        &self,
        resource_id: &str,
    ) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    /// One page of child ids from the uploads listing.
    fn list_uploads(
        &self,
        listing_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> impl Future<Output = Result<Page<String>, AppError>> + Send;

    /// One page of child ids from keyword search, newest first.
    fn search_children(
        &self,
        resource_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> impl Future<Output = Result<Page<String>, AppError>> + Send;

    /// Details for a set of child ids. Unknown or private ids are omitted.
    fn child_details(
        &self,
        resource_id: &str,
        child_ids: &[String],
    ) -> impl Future<Output = Result<Vec<ChildResource>, AppError>> + Send;

    /// One page of comment threads for a child resource.
    fn comment_threads(
        &self,
        child_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> impl Future<Output = Result<Page<CommentThread>, AppError>> + Send;

    /// Full reply listing for one thread.
    fn replies(
        &self,
        thread_id: &str,
        child_id: &str,
    ) -> impl Future<Output = Result<Vec<HarvestItem>, AppError>> + Send;
}

/// Maps a channel name, handle or URL to a canonical [`Resource`].
pub trait IdentityResolver: Send + Sync + Clone {
    fn resolve(
        &self,
        name_or_url: &str,
    ) -> impl Future<Output = Result<Option<Resource>, AppError>> + Send;
}

/// Normalizes raw text and tags it.
pub trait TextAnnotator: Send + Sync {
    fn annotate(&self, raw_text: &str) -> Annotation;
}

/// Decides which collection tier a resource belongs to.
pub trait ResourceClassifier: Send + Sync {
    fn classify(&self, resource: &Resource) -> ResourceClass;
}

/// Loads and saves one snapshot document (budget, dedup ledger, resume book).
pub trait SnapshotStore<T>: Send + Sync {
    /// Returns `Ok(None)` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<T>, AppError>;

    fn save(&self, snapshot: &T) -> Result<(), AppError>;
}

/// Accepts harvested batches for durable storage.
pub trait HarvestSink: Send + Sync {
    /// Merge one resource's new items into its stored harvest. Redelivering
    /// the same batch must not duplicate items. Returns the storage location.
    fn write_resource(&self, batch: &ResourceBatch, run: &RunStamp) -> Result<String, AppError>;

    /// Best-effort dump of an in-memory batch, used on interrupt or failure.
    fn dump(&self, batch: &HarvestBatch, label: &str, run: &RunStamp)
    -> Result<String, AppError>;
}

/// Read access to previously persisted harvests.
pub trait HarvestArchive: Send + Sync {
    fn scan(&self) -> Result<Vec<ArchivedHarvest>, AppError>;
}

/// A snapshot store that never persists anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl<T> SnapshotStore<T> for NullStore {
    fn load(&self) -> Result<Option<T>, AppError> {
        Ok(None)
    }

    fn save(&self, _snapshot: &T) -> Result<(), AppError> {
        Ok(())
    }
}

impl HarvestArchive for NullStore {
    fn scan(&self) -> Result<Vec<ArchivedHarvest>, AppError> {
        Ok(vec![])
    }
}
