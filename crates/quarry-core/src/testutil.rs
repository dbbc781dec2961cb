//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use crate::error::AppError;
use crate::models::{
    Annotation, ArchivedHarvest, ChildResource, CommentThread, HarvestItem, Page, Sentiment,
};
use crate::orchestrator::{HarvestEvent, HarvestReporter};
use crate::traits::{ContentApi, HarvestArchive, SnapshotStore, TextAnnotator};

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Top-level item posted under child `v1`.
pub fn item(id: &str, likes: u64) -> HarvestItem {
    HarvestItem {
        item_id: id.to_string(),
        parent_thread_id: None,
        resource_id: "v1".to_string(),
        is_reply: false,
        author_id: format!("author-{id}"),
        author_name: format!("Author {id}"),
        raw_text: format!("comment {id}"),
        like_count: likes,
        published_at: None,
        reply_count: 0,
        annotation: None,
    }
}

/// Reply to `thread_id`.
pub fn reply(id: &str, thread_id: &str, likes: u64) -> HarvestItem {
    HarvestItem {
        parent_thread_id: Some(thread_id.to_string()),
        is_reply: true,
        ..item(id, likes)
    }
}

pub fn thread(top_level: HarvestItem, replies: Vec<HarvestItem>, total_reply_count: u64) -> CommentThread {
    CommentThread {
        top_level,
        replies,
        total_reply_count,
    }
}

pub fn child(id: &str, parent_id: &str, estimate: u64) -> ChildResource {
    ChildResource::new(id, parent_id, format!("Video {id}"), estimate)
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory snapshot store that counts saves and can be made to fail.
#[derive(Clone)]
pub struct MemoryStore<T> {
    value: Arc<Mutex<Option<T>>>,
    saves: Arc<Mutex<usize>>,
    fail_loads: Arc<Mutex<bool>>,
    fail_saves: Arc<Mutex<bool>>,
}

impl<T: Clone> MemoryStore<T> {
    pub fn empty() -> Self {
        Self {
            value: Arc::new(Mutex::new(None)),
            saves: Arc::new(Mutex::new(0)),
            fail_loads: Arc::new(Mutex::new(false)),
            fail_saves: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with(value: T) -> Self {
        let store = Self::empty();
        *store.value.lock().unwrap() = Some(value);
        store
    }

    pub fn current(&self) -> Option<T> {
        self.value.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }

    pub fn fail_loads(&self, fail: bool) {
        *self.fail_loads.lock().unwrap() = fail;
    }

    pub fn fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().unwrap() = fail;
    }
}

impl<T: Clone + Send> SnapshotStore<T> for MemoryStore<T> {
    fn load(&self) -> Result<Option<T>, AppError> {
        if *self.fail_loads.lock().unwrap() {
            return Err(AppError::LedgerIo("mock load failure".into()));
        }
        Ok(self.current())
    }

    fn save(&self, snapshot: &T) -> Result<(), AppError> {
        if *self.fail_saves.lock().unwrap() {
            return Err(AppError::LedgerIo("mock save failure".into()));
        }
        *self.value.lock().unwrap() = Some(snapshot.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryArchive
// ---------------------------------------------------------------------------

/// Archive returning a fixed set of harvests.
#[derive(Clone, Default)]
pub struct MemoryArchive {
    harvests: Vec<ArchivedHarvest>,
    scans: Arc<Mutex<usize>>,
}

impl MemoryArchive {
    pub fn new(harvests: Vec<ArchivedHarvest>) -> Self {
        Self {
            harvests,
            scans: Arc::new(Mutex::new(0)),
        }
    }

    pub fn scan_count(&self) -> usize {
        *self.scans.lock().unwrap()
    }
}

impl HarvestArchive for MemoryArchive {
    fn scan(&self) -> Result<Vec<ArchivedHarvest>, AppError> {
        *self.scans.lock().unwrap() += 1;
        Ok(self.harvests.clone())
    }
}

// ---------------------------------------------------------------------------
// MockApi
// ---------------------------------------------------------------------------

/// Scripted failure returned by [`MockApi`].
#[derive(Debug, Clone, Copy)]
pub enum MockFailure {
    CommentsDisabled,
    Http(u16),
    NotFound,
}

impl MockFailure {
    fn to_error(self) -> AppError {
        match self {
            MockFailure::CommentsDisabled => AppError::CommentsDisabled,
            MockFailure::Http(status) => AppError::HttpError {
                status,
                message: "mock failure".into(),
            },
            MockFailure::NotFound => AppError::NotFound("mock".into()),
        }
    }
}

#[derive(Default)]
struct ApiScript {
    uploads_ids: HashMap<String, String>,
    uploads_pages: HashMap<String, Vec<Vec<String>>>,
    uploads_failures: HashMap<String, MockFailure>,
    search_pages: HashMap<String, Vec<Vec<String>>>,
    search_failures: HashMap<String, MockFailure>,
    children: HashMap<String, ChildResource>,
    details_failures: HashMap<(String, usize), MockFailure>,
    thread_pages: HashMap<String, Vec<Vec<CommentThread>>>,
    thread_failures: HashMap<(String, usize), MockFailure>,
    replies: HashMap<String, Vec<HarvestItem>>,
}

/// Scripted content API. Listing cursors have the form `<key>-p<index>`.
///
/// Every call is recorded as `kind:arg[:cursor]`, with `-` for no cursor.
#[derive(Clone, Default)]
pub struct MockApi {
    script: Arc<Mutex<ApiScript>>,
    calls: Arc<Mutex<Vec<String>>>,
}

fn pages<S: AsRef<str>>(pages: Vec<Vec<S>>) -> Vec<Vec<String>> {
    pages
        .into_iter()
        .map(|p| p.iter().map(|s| s.as_ref().to_string()).collect())
        .collect()
}

fn page_index(cursor: Option<&str>) -> usize {
    cursor
        .and_then(|c| c.rsplit_once("-p"))
        .and_then(|(_, n)| n.parse().ok())
        .unwrap_or(0)
}

fn page_at<T: Clone>(key: &str, pages: Option<&Vec<Vec<T>>>, index: usize) -> Page<T> {
    let Some(pages) = pages else {
        return Page::last(vec![]);
    };
    let items = pages.get(index).cloned().unwrap_or_default();
    let next = (index + 1 < pages.len()).then(|| format!("{key}-p{}", index + 1));
    Page::new(items, next)
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_uploads<S: AsRef<str>>(self, resource_id: &str, listing_id: &str, ids: Vec<Vec<S>>) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            script
                .uploads_ids
                .insert(resource_id.to_string(), listing_id.to_string());
            script.uploads_pages.insert(listing_id.to_string(), pages(ids));
        }
        self
    }

    pub fn fail_uploads_lookup(self, resource_id: &str, failure: MockFailure) -> Self {
        self.script
            .lock()
            .unwrap()
            .uploads_failures
            .insert(resource_id.to_string(), failure);
        self
    }

    pub fn with_search<S: AsRef<str>>(self, resource_id: &str, ids: Vec<Vec<S>>) -> Self {
        self.script
            .lock()
            .unwrap()
            .search_pages
            .insert(resource_id.to_string(), pages(ids));
        self
    }

    pub fn fail_search(self, resource_id: &str, failure: MockFailure) -> Self {
        self.script
            .lock()
            .unwrap()
            .search_failures
            .insert(resource_id.to_string(), failure);
        self
    }

    pub fn with_children(self, children: Vec<ChildResource>) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            for c in children {
                script.children.insert(c.id.clone(), c);
            }
        }
        self
    }

    /// Fail the `index`-th details request for `resource_id`.
    pub fn fail_details_at(self, resource_id: &str, index: usize, failure: MockFailure) -> Self {
        self.script
            .lock()
            .unwrap()
            .details_failures
            .insert((resource_id.to_string(), index), failure);
        self
    }

    pub fn with_thread_pages(self, child_id: &str, pages: Vec<Vec<CommentThread>>) -> Self {
        self.script
            .lock()
            .unwrap()
            .thread_pages
            .insert(child_id.to_string(), pages);
        self
    }

    /// Fail every request for page `index` of `child_id`.
    pub fn fail_threads_at(self, child_id: &str, index: usize, failure: MockFailure) -> Self {
        self.script
            .lock()
            .unwrap()
            .thread_failures
            .insert((child_id.to_string(), index), failure);
        self
    }

    pub fn with_replies(self, thread_id: &str, replies: Vec<HarvestItem>) -> Self {
        self.script
            .lock()
            .unwrap()
            .replies
            .insert(thread_id.to_string(), replies);
        self
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, kind: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split(':').next() == Some(kind))
            .collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.calls_of(kind).len()
    }
}

impl ContentApi for MockApi {
    async fn uploads_listing_id(&self, resource_id: &str) -> Result<Option<String>, AppError> {
        self.record(format!("uploads_id:{resource_id}"));
        let script = self.script.lock().unwrap();
        if let Some(failure) = script.uploads_failures.get(resource_id) {
            return Err(failure.to_error());
        }
        Ok(script.uploads_ids.get(resource_id).cloned())
    }

    async fn list_uploads(
        &self,
        listing_id: &str,
        cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<Page<String>, AppError> {
        self.record(format!("uploads_page:{listing_id}:{}", cursor.unwrap_or("-")));
        let script = self.script.lock().unwrap();
        Ok(page_at(
            listing_id,
            script.uploads_pages.get(listing_id),
            page_index(cursor),
        ))
    }

    async fn search_children(
        &self,
        resource_id: &str,
        cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<Page<String>, AppError> {
        self.record(format!("search:{resource_id}:{}", cursor.unwrap_or("-")));
        let script = self.script.lock().unwrap();
        if let Some(failure) = script.search_failures.get(resource_id) {
            return Err(failure.to_error());
        }
        Ok(page_at(
            resource_id,
            script.search_pages.get(resource_id),
            page_index(cursor),
        ))
    }

    async fn child_details(
        &self,
        resource_id: &str,
        child_ids: &[String],
    ) -> Result<Vec<ChildResource>, AppError> {
        let prefix = format!("details:{resource_id}:");
        let index = self.calls().iter().filter(|c| c.starts_with(&prefix)).count();
        self.record(format!("{prefix}{}", child_ids.len()));
        let script = self.script.lock().unwrap();
        if let Some(failure) = script.details_failures.get(&(resource_id.to_string(), index)) {
            return Err(failure.to_error());
        }
        Ok(child_ids
            .iter()
            .filter_map(|id| script.children.get(id).cloned())
            .collect())
    }

    async fn comment_threads(
        &self,
        child_id: &str,
        cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<Page<CommentThread>, AppError> {
        self.record(format!("threads:{child_id}:{}", cursor.unwrap_or("-")));
        let index = page_index(cursor);
        let script = self.script.lock().unwrap();
        if let Some(failure) = script.thread_failures.get(&(child_id.to_string(), index)) {
            return Err(failure.to_error());
        }
        Ok(page_at(child_id, script.thread_pages.get(child_id), index))
    }

    async fn replies(&self, thread_id: &str, _child_id: &str) -> Result<Vec<HarvestItem>, AppError> {
        self.record(format!("replies:{thread_id}"));
        let script = self.script.lock().unwrap();
        Ok(script.replies.get(thread_id).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockAnnotator
// ---------------------------------------------------------------------------

/// Annotator that tags everything `mock`.
pub struct MockAnnotator;

impl TextAnnotator for MockAnnotator {
    fn annotate(&self, raw_text: &str) -> Annotation {
        Annotation {
            cleaned_text: raw_text.trim().to_string(),
            tags: BTreeSet::from(["mock".to_string()]),
            sentiment: Sentiment::Neutral,
        }
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Reporter that records the debug form of every event.
#[derive(Clone, Default)]
pub struct MockReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// True if an event of the given variant name was reported.
    pub fn has_event(&self, variant: &str) -> bool {
        self.events().iter().any(|e| {
            e.split([' ', '{'])
                .next()
                .is_some_and(|name| name == variant)
        })
    }
}

impl HarvestReporter for MockReporter {
    fn report(&self, event: HarvestEvent<'_>) {
        self.events.lock().unwrap().push(format!("{event:?}"));
    }
}
