use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A parent resource (a channel) produced by identity resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default)]
    pub subscriber_count: u64,
    #[serde(default)]
    pub video_count: u64,
}

impl Resource {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            handle: None,
            subscriber_count: 0,
            video_count: 0,
        }
    }
}

/// A child resource (a video) discovered under a [`Resource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildResource {
    pub id: String,
    pub parent_id: String,
    pub title: String,
    /// Comment count as reported by the listing; only an estimate.
    pub comment_count_estimate: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub like_count: u64,
}

impl ChildResource {
    pub fn new(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        title: impl Into<String>,
        comment_count_estimate: u64,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            title: title.into(),
            comment_count_estimate,
            published_at: None,
            view_count: 0,
            like_count: 0,
        }
    }
}

/// Coarse sentiment assigned by a [`TextAnnotator`](crate::traits::TextAnnotator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Mixed,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Mixed => "mixed",
            Sentiment::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized text plus tags produced for one harvested item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub cleaned_text: String,
    pub tags: BTreeSet<String>,
    pub sentiment: Sentiment,
}

/// Collection tier a resource is harvested under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    Priority,
    Balanced,
}

impl ResourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::Priority => "priority",
            ResourceClass::Balanced => "balanced",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity and start time of one harvester run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStamp {
    /// `YYYYMMDD_HHMMSS` label of the run start.
    pub run_id: String,
    pub started_at: DateTime<Utc>,
}

impl RunStamp {
    pub fn at(started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: started_at.format(crate::util::RUN_ID_FORMAT).to_string(),
            started_at,
        }
    }

    pub fn now() -> Self {
        Self::at(Utc::now())
    }
}

/// A previously persisted harvest, as seen when rebuilding the dedup ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedHarvest {
    /// Where the harvest was read from (usually a file name).
    pub source: String,
    pub run_id: String,
    pub collected_at: DateTime<Utc>,
    pub items: Vec<HarvestItem>,
}

/// A single harvested comment or reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestItem {
    /// Globally unique item key.
    pub item_id: String,
    /// Thread id of the top-level comment this item replies to.
    #[serde(default)]
    pub parent_thread_id: Option<String>,
    /// Id of the child resource the item was posted under.
    pub resource_id: String,
    pub is_reply: bool,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub author_name: String,
    pub raw_text: String,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Reported reply count; always zero for replies.
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Annotation>,
}

/// A top-level comment with the replies that came inline with it.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentThread {
    pub top_level: HarvestItem,
    pub replies: Vec<HarvestItem>,
    /// Reply count reported by the API, which may exceed `replies.len()`.
    pub total_reply_count: u64,
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}

/// Items collected for one child resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildBatch {
    pub child: ChildResource,
    #[serde(default)]
    pub items: Vec<HarvestItem>,
}

impl ChildBatch {
    pub fn new(child: ChildResource) -> Self {
        Self {
            child,
            items: Vec::new(),
        }
    }

    /// Union `items` into this batch by item id. Returns how many were added.
    pub fn merge(&mut self, items: impl IntoIterator<Item = HarvestItem>) -> usize {
        let mut known: HashSet<String> = self.items.iter().map(|i| i.item_id.clone()).collect();
        let before = self.items.len();
        for item in items {
            if known.insert(item.item_id.clone()) {
                self.items.push(item);
            }
        }
        self.items.len() - before
    }
}

/// Children collected for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceBatch {
    pub resource: Resource,
    #[serde(default)]
    pub children: BTreeMap<String, ChildBatch>,
}

impl ResourceBatch {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            children: BTreeMap::new(),
        }
    }

    pub fn item_count(&self) -> usize {
        self.children.values().map(|c| c.items.len()).sum()
    }
}

/// Nested resource → child → items tree from one orchestration pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestBatch {
    pub resources: BTreeMap<String, ResourceBatch>,
}

impl HarvestBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge items for `child` under `resource`, creating entries as needed.
    /// Returns the number of items that were not already present.
    pub fn merge_items(
        &mut self,
        resource: &Resource,
        child: &ChildResource,
        items: Vec<HarvestItem>,
    ) -> usize {
        self.resources
            .entry(resource.id.clone())
            .or_insert_with(|| ResourceBatch::new(resource.clone()))
            .children
            .entry(child.id.clone())
            .or_insert_with(|| ChildBatch::new(child.clone()))
            .merge(items)
    }

    pub fn item_count(&self) -> usize {
        self.resources.values().map(ResourceBatch::item_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }

    /// Iterate over every item in resource/child order.
    pub fn items(&self) -> impl Iterator<Item = &HarvestItem> {
        self.resources
            .values()
            .flat_map(|r| r.children.values())
            .flat_map(|c| c.items.iter())
    }
}
