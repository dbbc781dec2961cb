use crate::error::AppError;
use crate::models::{ChildResource, Resource};
use crate::quota::{OperationKind, QuotaLedger};
use crate::retry::RetryingCaller;
use crate::traits::ContentApi;

/// Maximum child ids per listing page accepted by the remote API.
pub const MAX_LISTING_PAGE: u32 = 50;

/// Discovers the children of a resource, newest first.
pub struct ResourceEnumerator<A: ContentApi> {
    api: A,
    quota: QuotaLedger,
    caller: RetryingCaller,
    page_size: u32,
}

impl<A: ContentApi> ResourceEnumerator<A> {
    pub fn new(api: A, quota: QuotaLedger, caller: RetryingCaller) -> Self {
        Self {
            api,
            quota,
            caller,
            page_size: MAX_LISTING_PAGE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_LISTING_PAGE);
        self
    }

    /// Charge for one operation. `Ok(false)` means the budget cannot cover it.
    async fn spend(&self, kind: OperationKind, note: &str) -> Result<bool, AppError> {
        if !self.quota.check_affordable(kind) {
            tracing::debug!(%kind, note, "Listing stopped, operation unaffordable");
            return Ok(false);
        }
        match self.quota.charge(kind, note).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_quota_exceeded() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn next_page_size(&self, have: usize, limit: usize) -> u32 {
        let wanted = u32::try_from(limit.saturating_sub(have)).unwrap_or(u32::MAX);
        wanted.min(self.page_size)
    }

    /// List up to `limit` children of `resource`.
    ///
    /// The uploads listing is preferred; keyword search is used only when it
    /// is unavailable or yields nothing. Running out of budget returns what
    /// was found so far.
    pub async fn list_children(
        &self,
        resource: &Resource,
        limit: usize,
    ) -> Result<Vec<ChildResource>, AppError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut children = match self.list_from_uploads(resource, limit).await {
            Ok(children) => children,
            Err(e @ AppError::LedgerIo(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(resource = %resource.id, error = %e, "Uploads listing failed");
                Vec::new()
            }
        };

        if children.is_empty() {
            tracing::info!(resource = %resource.id, "Falling back to search listing");
            children = self.list_from_search(resource, limit).await?;
        }

        children.truncate(limit);
        tracing::info!(
            resource = %resource.id,
            children = children.len(),
            "Children enumerated"
        );
        Ok(children)
    }

    async fn list_from_uploads(
        &self,
        resource: &Resource,
        limit: usize,
    ) -> Result<Vec<ChildResource>, AppError> {
        let mut children = Vec::new();

        if !self
            .spend(OperationKind::ResourceDetails, &format!("details {}", resource.id))
            .await?
        {
            return Ok(children);
        }
        let listing_id = self
            .caller
            .call("uploads_listing_id", || self.api.uploads_listing_id(&resource.id))
            .await?;
        let Some(listing_id) = listing_id else {
            return Ok(children);
        };

        let mut cursor: Option<String> = None;
        while children.len() < limit {
            if !self
                .spend(OperationKind::ChildListing, &format!("uploads {listing_id}"))
                .await?
            {
                break;
            }
            let page_size = self.next_page_size(children.len(), limit);
            let page = match self
                .caller
                .call("list_uploads", || {
                    self.api.list_uploads(&listing_id, cursor.as_deref(), page_size)
                })
                .await
            {
                Ok(page) => page,
                Err(e) if !children.is_empty() => {
                    tracing::warn!(resource = %resource.id, error = %e, "Uploads page failed, keeping partial listing");
                    break;
                }
                Err(e) => return Err(e),
            };

            if !page.items.is_empty() {
                if !self
                    .spend(OperationKind::ChildListing, &format!("child details {}", resource.id))
                    .await?
                {
                    break;
                }
                match self
                    .caller
                    .call("child_details", || self.api.child_details(&resource.id, &page.items))
                    .await
                {
                    Ok(details) => children.extend(details),
                    Err(e) if !children.is_empty() => {
                        tracing::warn!(resource = %resource.id, error = %e, "Uploads details failed, keeping partial listing");
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(children)
    }

    async fn list_from_search(
        &self,
        resource: &Resource,
        limit: usize,
    ) -> Result<Vec<ChildResource>, AppError> {
        let mut children = Vec::new();
        let mut cursor: Option<String> = None;

        while children.len() < limit {
            if !self
                .spend(OperationKind::Search, &format!("search {}", resource.id))
                .await?
            {
                break;
            }
            let page_size = self.next_page_size(children.len(), limit);
            let page = match self
                .caller
                .call("search_children", || {
                    self.api.search_children(&resource.id, cursor.as_deref(), page_size)
                })
                .await
            {
                Ok(page) => page,
                Err(e) if !children.is_empty() => {
                    tracing::warn!(resource = %resource.id, error = %e, "Search page failed, keeping partial listing");
                    break;
                }
                Err(e) => return Err(e),
            };

            if page.items.is_empty() {
                break;
            }
            if !self
                .spend(OperationKind::ChildListing, &format!("child details {}", resource.id))
                .await?
            {
                break;
            }
            match self
                .caller
                .call("child_details", || self.api.child_details(&resource.id, &page.items))
                .await
            {
                Ok(details) => children.extend(details),
                Err(e) if !children.is_empty() => {
                    tracing::warn!(resource = %resource.id, error = %e, "Search details failed, keeping partial listing");
                    break;
                }
                Err(e) => return Err(e),
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(children)
    }

    /// Enumerate every resource, skipping the ones whose listing fails.
    pub async fn list_all(
        &self,
        resources: &[Resource],
        limit: usize,
    ) -> Result<Vec<(Resource, Vec<ChildResource>)>, AppError> {
        let mut listed = Vec::with_capacity(resources.len());
        for resource in resources {
            match self.list_children(resource, limit).await {
                Ok(children) => listed.push((resource.clone(), children)),
                Err(e @ AppError::LedgerIo(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        resource = %resource.id,
                        name = %resource.display_name,
                        error = %e,
                        "Skipping resource, listing failed"
                    );
                }
            }
        }
        Ok(listed)
    }
}
