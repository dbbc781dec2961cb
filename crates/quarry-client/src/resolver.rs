use std::time::Duration;

use moka::future::Cache;
use quarry_core::error::AppError;
use quarry_core::models::Resource;
use quarry_core::quota::{OperationKind, QuotaLedger};
use quarry_core::retry::RetryingCaller;
use quarry_core::traits::IdentityResolver;
use url::Url;

use crate::client::ApiClient;

const CACHE_CAPACITY: u64 = 1_000;
const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// What a user-supplied channel reference points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    /// Canonical `UC…` channel id.
    Id(String),
    /// `@handle`, stored without the `@`.
    Handle(String),
    /// Legacy custom name, username or free text.
    Name(String),
}

impl ChannelRef {
    /// Parse a channel id, `@handle`, channel URL or display name.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();

        if let Ok(url) = Url::parse(input)
            && url.host_str().is_some_and(|h| h.ends_with("youtube.com"))
        {
            let segments: Vec<&str> = url
                .path_segments()
                .map(|s| s.filter(|seg| !seg.is_empty()).collect())
                .unwrap_or_default();
            match segments.as_slice() {
                ["channel", id, ..] => return ChannelRef::Id((*id).to_string()),
                ["c" | "user", name, ..] => return ChannelRef::Name((*name).to_string()),
                [handle, ..] if handle.starts_with('@') => {
                    return ChannelRef::Handle(handle.trim_start_matches('@').to_string());
                }
                _ => {}
            }
        }

        if let Some(handle) = input.strip_prefix('@') {
            return ChannelRef::Handle(handle.to_string());
        }
        if is_channel_id(input) {
            return ChannelRef::Id(input.to_string());
        }
        ChannelRef::Name(input.to_string())
    }
}

fn is_channel_id(value: &str) -> bool {
    value.len() == 24
        && value.starts_with("UC")
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Resolves channel references through the API, charging the shared budget.
///
/// Results, including misses, are cached for an hour.
#[derive(Clone)]
pub struct ApiResolver {
    client: ApiClient,
    quota: QuotaLedger,
    caller: RetryingCaller,
    cache: Cache<String, Option<Resource>>,
}

impl ApiResolver {
    pub fn new(client: ApiClient, quota: QuotaLedger, caller: RetryingCaller) -> Self {
        Self {
            client,
            quota,
            caller,
            cache: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(CACHE_TTL)
                .build(),
        }
    }

    async fn by_id(&self, id: &str) -> Result<Option<Resource>, AppError> {
        self.quota
            .charge(OperationKind::ResourceDetails, &format!("resolve id {id}"))
            .await?;
        self.caller
            .call("channel_by_id", || self.client.channel_by_id(id))
            .await
    }

    async fn by_handle(&self, handle: &str) -> Result<Option<Resource>, AppError> {
        self.quota
            .charge(OperationKind::ResourceDetails, &format!("resolve @{handle}"))
            .await?;
        self.caller
            .call("channel_by_handle", || self.client.channel_by_handle(handle))
            .await
    }

    async fn by_search(&self, query: &str) -> Result<Option<Resource>, AppError> {
        self.quota
            .charge(OperationKind::Search, &format!("resolve search {query}"))
            .await?;
        let channel_id = self
            .caller
            .call("search_channel", || self.client.search_channel(query))
            .await?;
        match channel_id {
            Some(id) => self.by_id(&id).await,
            None => Ok(None),
        }
    }

    async fn lookup(&self, reference: &ChannelRef) -> Result<Option<Resource>, AppError> {
        match reference {
            ChannelRef::Id(id) => self.by_id(id).await,
            ChannelRef::Handle(handle) => match self.by_handle(handle).await? {
                Some(resource) => Ok(Some(resource)),
                None => self.by_search(&format!("@{handle}")).await,
            },
            ChannelRef::Name(name) => self.by_search(name).await,
        }
    }
}

impl IdentityResolver for ApiResolver {
    async fn resolve(&self, name_or_url: &str) -> Result<Option<Resource>, AppError> {
        let key = name_or_url.trim().to_lowercase();
        if let Some(cached) = self.cache.get(&key).await {
            tracing::debug!(input = name_or_url, "Resolution cache hit");
            return Ok(cached);
        }

        let reference = ChannelRef::parse(name_or_url);
        let resolved = self.lookup(&reference).await?;
        match &resolved {
            Some(resource) => {
                tracing::info!(input = name_or_url, id = %resource.id, name = %resource.display_name, "Channel resolved");
            }
            None => {
                tracing::warn!(input = name_or_url, "Could not resolve channel");
            }
        }
        self.cache.insert(key, resolved.clone()).await;
        Ok(resolved)
    }
}
