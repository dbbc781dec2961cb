//! Per-child thread pagination under a class page budget.
//!
//! ```text
//! NotStarted ──first page──> InProgress ──no cursor / empty page / disabled──> Complete
//!                                │
//!                                └──unaffordable / call failure / cancel──> Aborted
//! ```
//!
//! A visit may also stop while still `InProgress` (per-visit page limit or the
//! budget reserve floor); the [`ResumeState`] then carries the cursor to the
//! next visit.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{ClassPolicy, HarvestConfig};
use crate::error::AppError;
use crate::models::{ChildResource, CommentThread, HarvestItem, ResourceClass};
use crate::quota::{OperationKind, QuotaLedger};
use crate::resume::ResumeState;
use crate::retry::RetryingCaller;
use crate::traits::{ContentApi, TextAnnotator};

/// Abort reason used when the budget cannot cover the next thread page.
pub const QUOTA_EXHAUSTED: &str = "Quota exhausted";

/// Abort reason used when the visit was cancelled.
pub const INTERRUPTED: &str = "Interrupted";

/// Lifecycle of one child within a visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestState {
    NotStarted,
    InProgress,
    Complete,
    Aborted(String),
}

impl fmt::Display for HarvestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarvestState::NotStarted => write!(f, "not_started"),
            HarvestState::InProgress => write!(f, "in_progress"),
            HarvestState::Complete => write!(f, "complete"),
            HarvestState::Aborted(reason) => write!(f, "aborted: {reason}"),
        }
    }
}

/// Result of one visit to a child.
#[derive(Debug)]
pub struct HarvestOutcome {
    /// Items not previously seen for this child.
    pub items: Vec<HarvestItem>,
    /// Thread pages fetched during this visit.
    pub pages_fetched: u32,
    pub state: HarvestState,
    /// Why the visit ended without fetching, or why it stopped early.
    pub skip_reason: Option<String>,
    /// Remote failure that aborted the visit after retries.
    pub failure: Option<AppError>,
}

impl HarvestOutcome {
    fn new(state: HarvestState) -> Self {
        Self {
            items: Vec::new(),
            pages_fetched: 0,
            state,
            skip_reason: None,
            failure: None,
        }
    }

    fn skipped(state: HarvestState, reason: &str) -> Self {
        Self {
            skip_reason: Some(reason.to_string()),
            ..Self::new(state)
        }
    }

    pub fn is_productive(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn budget_exhausted(&self) -> bool {
        matches!(&self.state, HarvestState::Aborted(reason) if reason == QUOTA_EXHAUSTED)
    }

    pub fn was_interrupted(&self) -> bool {
        matches!(&self.state, HarvestState::Aborted(reason) if reason == INTERRUPTED)
    }
}

/// Keep the `k` most-liked replies. Ties keep their original order.
pub fn top_replies(mut pool: Vec<HarvestItem>, k: usize) -> Vec<HarvestItem> {
    pool.sort_by(|a, b| b.like_count.cmp(&a.like_count));
    pool.truncate(k);
    pool
}

/// Walks the thread listing of one child at a time.
pub struct ThreadHarvester<A: ContentApi> {
    api: A,
    quota: QuotaLedger,
    caller: RetryingCaller,
    config: HarvestConfig,
    annotator: Option<Arc<dyn TextAnnotator>>,
}

impl<A: ContentApi> ThreadHarvester<A> {
    pub fn new(api: A, quota: QuotaLedger, caller: RetryingCaller, config: HarvestConfig) -> Self {
        Self {
            api,
            quota,
            caller,
            config,
            annotator: None,
        }
    }

    pub fn with_annotator(mut self, annotator: Arc<dyn TextAnnotator>) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn quota(&self) -> &QuotaLedger {
        &self.quota
    }

    /// Harvest `child` under `class` limits, continuing from `resume`.
    ///
    /// Remote failures end the visit as [`HarvestState::Aborted`] with the
    /// items gathered so far; only budget persistence failures return `Err`.
    pub async fn harvest(
        &self,
        child: &ChildResource,
        class: ResourceClass,
        resume: &mut ResumeState,
        cancel: &CancellationToken,
    ) -> Result<HarvestOutcome, AppError> {
        let policy = self.config.policy(class);

        if resume.is_complete {
            return Ok(HarvestOutcome::skipped(
                HarvestState::Complete,
                "Child already complete",
            ));
        }
        if child.comment_count_estimate < policy.min_comment_estimate {
            resume.is_complete = true;
            return Ok(HarvestOutcome::skipped(
                HarvestState::Complete,
                policy.skip_reason,
            ));
        }

        let initial = if resume.is_started() {
            HarvestState::InProgress
        } else {
            HarvestState::NotStarted
        };
        let mut outcome = HarvestOutcome::new(initial);

        loop {
            if cancel.is_cancelled() {
                outcome.state = HarvestState::Aborted(INTERRUPTED.into());
                break;
            }
            if resume.pages_processed >= policy.page_ceiling {
                resume.is_complete = true;
                outcome.state = HarvestState::Complete;
                outcome.skip_reason = Some("Page limit reached".into());
                break;
            }
            if policy
                .pages_per_visit
                .is_some_and(|limit| outcome.pages_fetched >= limit)
            {
                break;
            }
            if self.quota.remaining() < self.config.reserve_floor {
                outcome.skip_reason = Some("Budget reserve reached".into());
                break;
            }
            if !self.quota.check_affordable(OperationKind::ThreadListing) {
                outcome.state = HarvestState::Aborted(QUOTA_EXHAUSTED.into());
                break;
            }

            let note = format!("threads {} page {}", child.id, resume.pages_processed + 1);
            match self.quota.charge(OperationKind::ThreadListing, &note).await {
                Ok(()) => {}
                Err(e) if e.is_quota_exceeded() => {
                    outcome.state = HarvestState::Aborted(QUOTA_EXHAUSTED.into());
                    break;
                }
                Err(e) => return Err(e),
            }

            let cursor = resume.page_cursor.clone();
            let result = self
                .caller
                .call("comment_threads", || {
                    self.api
                        .comment_threads(&child.id, cursor.as_deref(), self.config.page_size)
                })
                .await;

            let page = match result {
                Ok(page) => page,
                Err(e) if e.is_terminal_empty() => {
                    tracing::info!(child = %child.id, "Comments disabled");
                    resume.is_complete = true;
                    resume.page_cursor = None;
                    outcome.state = HarvestState::Complete;
                    outcome.skip_reason = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    tracing::warn!(child = %child.id, error = %e, "Thread page failed");
                    outcome.state = HarvestState::Aborted(e.to_string());
                    outcome.failure = Some(e);
                    break;
                }
            };

            outcome.state = HarvestState::InProgress;
            resume.pages_processed += 1;
            outcome.pages_fetched += 1;

            if page.items.is_empty() {
                resume.is_complete = true;
                resume.page_cursor = None;
                outcome.state = HarvestState::Complete;
                break;
            }

            for thread in page.items {
                for item in self.select_thread(thread, policy, &child.id).await? {
                    if resume.seen_item_ids.insert(item.item_id.clone()) {
                        outcome.items.push(self.annotate(item));
                    }
                }
            }

            tracing::debug!(
                child = %child.id,
                pages = resume.pages_processed,
                items = outcome.items.len(),
                "Thread page processed"
            );

            match page.next_cursor {
                Some(next) => resume.page_cursor = Some(next),
                None => {
                    resume.page_cursor = None;
                    resume.is_complete = true;
                    outcome.state = HarvestState::Complete;
                    break;
                }
            }
        }

        Ok(outcome)
    }

    /// Keep the top-level item and the best replies of one thread, enlarging
    /// the reply pool with one extra listing when the class allows it.
    async fn select_thread(
        &self,
        thread: CommentThread,
        policy: &ClassPolicy,
        child_id: &str,
    ) -> Result<Vec<HarvestItem>, AppError> {
        let CommentThread {
            top_level,
            mut replies,
            total_reply_count,
        } = thread;

        let wants_more = policy.expand_replies && (replies.len() as u64) < total_reply_count;
        if wants_more
            && self.quota.remaining() > self.config.reply_expansion_margin
            && self.quota.check_affordable(OperationKind::ReplyListing)
        {
            let note = format!("replies {}", top_level.item_id);
            match self.quota.charge(OperationKind::ReplyListing, &note).await {
                Ok(()) => {
                    let thread_id = top_level.item_id.as_str();
                    match self
                        .caller
                        .call("replies", || self.api.replies(thread_id, child_id))
                        .await
                    {
                        Ok(extra) => {
                            let mut known: HashSet<String> =
                                replies.iter().map(|r| r.item_id.clone()).collect();
                            replies.extend(extra.into_iter().filter(|r| known.insert(r.item_id.clone())));
                        }
                        Err(e) => {
                            tracing::warn!(thread = %thread_id, error = %e, "Reply listing failed, using inline replies");
                        }
                    }
                }
                Err(e) if e.is_quota_exceeded() => {}
                Err(e) => return Err(e),
            }
        }

        let mut kept = Vec::with_capacity(1 + policy.top_replies);
        kept.push(top_level);
        kept.extend(top_replies(replies, policy.top_replies));
        Ok(kept)
    }

    fn annotate(&self, mut item: HarvestItem) -> HarvestItem {
        if let Some(annotator) = &self.annotator {
            item.annotation = Some(annotator.annotate(&item.raw_text));
        }
        item
    }
}
