use std::collections::HashSet;

use crate::models::{Resource, ResourceClass};
use crate::traits::ResourceClassifier;

/// Page and reply limits for one [`ResourceClass`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPolicy {
    /// Maximum thread pages per child over its lifetime.
    pub page_ceiling: u32,
    /// Maximum thread pages per child in one visit; `None` means one pass to completion.
    pub pages_per_visit: Option<u32>,
    /// Replies kept per thread, ranked by like count.
    pub top_replies: usize,
    /// Whether a thread may get one extra reply-listing call.
    pub expand_replies: bool,
    /// Children whose comment estimate is below this are skipped.
    pub min_comment_estimate: u64,
    /// Skip reason reported for children below `min_comment_estimate`.
    pub skip_reason: &'static str,
}

impl ClassPolicy {
    pub fn priority() -> Self {
        Self {
            page_ceiling: 200,
            pages_per_visit: None,
            top_replies: 5,
            expand_replies: true,
            min_comment_estimate: 1,
            skip_reason: "No comments",
        }
    }

    pub fn balanced() -> Self {
        Self {
            page_ceiling: 100,
            pages_per_visit: Some(80),
            top_replies: 2,
            expand_replies: false,
            min_comment_estimate: 5,
            skip_reason: "Too few comments",
        }
    }
}

/// Harvest and orchestration limits.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Threads requested per page.
    pub page_size: u32,
    /// Child ids requested per listing page.
    pub listing_page_size: u32,
    /// Children enumerated per resource.
    pub max_children_per_resource: usize,
    /// Budget kept back from thread paging.
    pub reserve_floor: u64,
    /// Remaining budget required before an extra reply-listing call.
    pub reply_expansion_margin: u64,
    pub priority: ClassPolicy,
    pub balanced: ClassPolicy,
    /// Priority phase stops below this remaining budget.
    pub priority_phase_floor: u64,
    /// Balanced phase runs only above this remaining budget.
    pub balanced_phase_threshold: u64,
    /// Balanced rounds continue only above this remaining budget.
    pub round_floor: u64,
    /// A child is not started below this remaining budget.
    pub child_start_floor: u64,
    pub max_rounds: u32,
    /// Productive children per balanced round.
    pub children_per_round: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            listing_page_size: 50,
            max_children_per_resource: 150,
            reserve_floor: 10,
            reply_expansion_margin: 30,
            priority: ClassPolicy::priority(),
            balanced: ClassPolicy::balanced(),
            priority_phase_floor: 30,
            balanced_phase_threshold: 100,
            round_floor: 30,
            child_start_floor: 15,
            max_rounds: 10,
            children_per_round: 10,
        }
    }
}

impl HarvestConfig {
    pub fn with_max_children(mut self, max: usize) -> Self {
        self.max_children_per_resource = max;
        self
    }

    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }

    pub fn with_children_per_round(mut self, count: usize) -> Self {
        self.children_per_round = count;
        self
    }

    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    pub fn policy(&self, class: ResourceClass) -> &ClassPolicy {
        match class {
            ResourceClass::Priority => &self.priority,
            ResourceClass::Balanced => &self.balanced,
        }
    }
}

/// Classifies resources named in an explicit allow list as priority.
///
/// Entries match a resource id, its handle (with or without `@`) or its display
/// name, case-insensitively and in full.
#[derive(Debug, Clone, Default)]
pub struct PriorityAllowList {
    entries: HashSet<String>,
}

impl PriorityAllowList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|e| normalize(e.as_ref()))
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize(value: &str) -> String {
    value.trim().trim_start_matches('@').to_lowercase()
}

impl ResourceClassifier for PriorityAllowList {
    fn classify(&self, resource: &Resource) -> ResourceClass {
        let candidates = [
            Some(resource.id.as_str()),
            resource.handle.as_deref(),
            Some(resource.display_name.as_str()),
        ];
        let listed = candidates
            .into_iter()
            .flatten()
            .any(|c| self.entries.contains(&normalize(c)));

        if listed {
            ResourceClass::Priority
        } else {
            ResourceClass::Balanced
        }
    }
}
