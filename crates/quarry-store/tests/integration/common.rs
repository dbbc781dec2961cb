use chrono::NaiveDate;
use quarry_core::models::{ChildResource, HarvestItem, Resource, ResourceBatch, RunStamp};
use quarry_core::util::parse_run_id;
use quarry_store::StoreConfig;
use tempfile::TempDir;

/// A store config rooted in a fresh temp directory.
///
/// The `TempDir` must be kept in scope for the test duration.
pub fn temp_store() -> (StoreConfig, TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    (StoreConfig::new(dir.path()), dir)
}

pub fn run(run_id: &str) -> RunStamp {
    RunStamp::at(parse_run_id(run_id).expect("valid run id"))
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn item(id: &str, child: &str) -> HarvestItem {
    HarvestItem {
        item_id: id.to_string(),
        parent_thread_id: None,
        resource_id: child.to_string(),
        is_reply: false,
        author_id: format!("author-{id}"),
        author_name: "Someone".to_string(),
        raw_text: format!("comment {id}"),
        like_count: 1,
        published_at: None,
        reply_count: 0,
        annotation: None,
    }
}

/// A single-child batch for resource `c1` holding `ids`.
pub fn resource_batch(ids: &[&str]) -> ResourceBatch {
    resource_batch_for("c1", "Physics Channel", ids)
}

/// A single-child batch for an arbitrary resource.
pub fn resource_batch_for(resource_id: &str, name: &str, ids: &[&str]) -> ResourceBatch {
    let resource = Resource::new(resource_id, name);
    let child = ChildResource::new(format!("{resource_id}-v1"), resource_id, "Lecture 1", 10);
    let mut batch = quarry_core::models::HarvestBatch::new();
    batch.merge_items(
        &resource,
        &child,
        ids.iter().map(|id| item(id, &child.id)).collect(),
    );
    batch
        .resources
        .remove(resource_id)
        .expect("batch contains the resource")
}
