use std::time::Duration;

use chrono::{DateTime, Utc};
use quarry_core::error::AppError;
use quarry_core::models::{ChildResource, CommentThread, HarvestItem, Page, Resource};
use quarry_core::traits::ContentApi;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for a YouTube-Data-v3-shaped content API.
///
/// Only performs requests and maps responses; quota is charged by callers.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl ApiClient {
    pub fn new(api_key: &str) -> Result<Self, AppError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self, AppError> {
        Self::build(api_key, base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, AppError> {
        Self::build(&self.api_key, &self.base_url, timeout)
    }

    fn build(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        if api_key.trim().is_empty() {
            return Err(AppError::ConfigError("API key is empty".into()));
        }
        let client = Client::builder()
            .user_agent("Quarry/0.1 (comment harvester)")
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::NetworkError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, AppError> {
        let mut url = Url::parse(&format!("{}/{endpoint}", self.base_url))
            .map_err(|e| AppError::ConfigError(format!("Invalid API URL: {e}")))?;
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
            .append_pair("key", &self.api_key);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {e}"))
                } else {
                    AppError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Generic(format!("Failed to parse {endpoint} response: {e}")))
    }

    /// Channel lookup by id.
    pub async fn channel_by_id(&self, channel_id: &str) -> Result<Option<Resource>, AppError> {
        let response: ListResponse<ApiChannel> = self
            .get_json(
                "channels",
                &[
                    ("part", "snippet,statistics".into()),
                    ("id", channel_id.to_string()),
                ],
            )
            .await?;
        Ok(response.items.into_iter().next().map(ApiChannel::into_resource))
    }

    /// Channel lookup by `@handle`.
    pub async fn channel_by_handle(&self, handle: &str) -> Result<Option<Resource>, AppError> {
        let response: ListResponse<ApiChannel> = self
            .get_json(
                "channels",
                &[
                    ("part", "snippet,statistics".into()),
                    ("forHandle", format!("@{}", handle.trim_start_matches('@'))),
                ],
            )
            .await?;
        Ok(response.items.into_iter().next().map(ApiChannel::into_resource))
    }

    /// Best channel match for a free-text query. Returns the channel id.
    pub async fn search_channel(&self, query: &str) -> Result<Option<String>, AppError> {
        let response: ListResponse<ApiSearchResult> = self
            .get_json(
                "search",
                &[
                    ("part", "snippet".into()),
                    ("type", "channel".into()),
                    ("q", query.to_string()),
                    ("maxResults", "1".into()),
                ],
            )
            .await?;
        Ok(response
            .items
            .into_iter()
            .find_map(|r| r.id.channel_id.or(r.snippet.and_then(|s| s.channel_id))))
    }
}

impl ContentApi for ApiClient {
    async fn uploads_listing_id(&self, resource_id: &str) -> Result<Option<String>, AppError> {
        let response: ListResponse<ApiChannel> = self
            .get_json(
                "channels",
                &[
                    ("part", "contentDetails".into()),
                    ("id", resource_id.to_string()),
                ],
            )
            .await?;
        Ok(response
            .items
            .into_iter()
            .next()
            .and_then(|c| c.content_details)
            .and_then(|d| d.related_playlists.uploads))
    }

    async fn list_uploads(
        &self,
        listing_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Page<String>, AppError> {
        let mut params = vec![
            ("part", "contentDetails".to_string()),
            ("playlistId", listing_id.to_string()),
            ("maxResults", page_size.to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("pageToken", cursor.to_string()));
        }
        let response: ListResponse<ApiPlaylistItem> = self.get_json("playlistItems", &params).await?;
        let ids = response
            .items
            .into_iter()
            .filter_map(|i| i.content_details.map(|d| d.video_id))
            .collect();
        Ok(Page::new(ids, response.next_page_token))
    }

    async fn search_children(
        &self,
        resource_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Page<String>, AppError> {
        let mut params = vec![
            ("part", "id".to_string()),
            ("channelId", resource_id.to_string()),
            ("type", "video".to_string()),
            ("order", "date".to_string()),
            ("maxResults", page_size.to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("pageToken", cursor.to_string()));
        }
        let response: ListResponse<ApiSearchResult> = self.get_json("search", &params).await?;
        let ids = response
            .items
            .into_iter()
            .filter_map(|r| r.id.video_id)
            .collect();
        Ok(Page::new(ids, response.next_page_token))
    }

    async fn child_details(
        &self,
        resource_id: &str,
        child_ids: &[String],
    ) -> Result<Vec<ChildResource>, AppError> {
        if child_ids.is_empty() {
            return Ok(Vec::new());
        }
        let response: ListResponse<ApiVideo> = self
            .get_json(
                "videos",
                &[
                    ("part", "snippet,statistics".into()),
                    ("id", child_ids.join(",")),
                ],
            )
            .await?;
        Ok(response
            .items
            .into_iter()
            .map(|v| v.into_child(resource_id))
            .collect())
    }

    async fn comment_threads(
        &self,
        child_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Page<CommentThread>, AppError> {
        let mut params = vec![
            ("part", "snippet,replies".to_string()),
            ("videoId", child_id.to_string()),
            ("maxResults", page_size.to_string()),
            ("order", "relevance".to_string()),
            ("textFormat", "plainText".to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("pageToken", cursor.to_string()));
        }
        let response: ListResponse<ApiThread> = self.get_json("commentThreads", &params).await?;
        let threads = response
            .items
            .into_iter()
            .map(|t| t.into_thread(child_id))
            .collect();
        Ok(Page::new(threads, response.next_page_token))
    }

    async fn replies(&self, thread_id: &str, child_id: &str) -> Result<Vec<HarvestItem>, AppError> {
        let response: ListResponse<ApiComment> = self
            .get_json(
                "comments",
                &[
                    ("part", "snippet".into()),
                    ("parentId", thread_id.to_string()),
                    ("maxResults", "100".into()),
                    ("textFormat", "plainText".into()),
                ],
            )
            .await?;
        Ok(response
            .items
            .into_iter()
            .map(|c| c.into_item(child_id, Some(thread_id)))
            .collect())
    }
}

// ---- Error mapping ----

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorReason>,
}

#[derive(Deserialize)]
struct ApiErrorReason {
    #[serde(default)]
    reason: String,
}

/// Map a non-success response to an [`AppError`].
fn classify_error(status: u16, body: &str) -> AppError {
    let detail = serde_json::from_str::<ApiErrorBody>(body).ok().map(|b| b.error);
    let reasons: Vec<&str> = detail
        .as_ref()
        .map(|d| d.errors.iter().map(|e| e.reason.as_str()).collect())
        .unwrap_or_default();
    let message = detail
        .as_ref()
        .map(|d| d.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.chars().take(200).collect());

    if reasons.contains(&"commentsDisabled") {
        return AppError::CommentsDisabled;
    }
    match status {
        404 => AppError::NotFound(message),
        429 => AppError::RateLimitExceeded,
        _ => AppError::HttpError { status, message },
    }
}

// ---- API types ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiChannel {
    id: String,
    #[serde(default)]
    snippet: Option<ApiChannelSnippet>,
    #[serde(default)]
    statistics: Option<ApiStatistics>,
    #[serde(default)]
    content_details: Option<ApiChannelContent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiChannelSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    custom_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiChannelContent {
    related_playlists: ApiRelatedPlaylists,
}

#[derive(Deserialize)]
struct ApiRelatedPlaylists {
    #[serde(default)]
    uploads: Option<String>,
}

/// Counters arrive as decimal strings.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ApiStatistics {
    #[serde(default)]
    subscriber_count: Option<String>,
    #[serde(default)]
    video_count: Option<String>,
    #[serde(default)]
    view_count: Option<String>,
    #[serde(default)]
    like_count: Option<String>,
    #[serde(default)]
    comment_count: Option<String>,
}

fn count(value: &Option<String>) -> u64 {
    value.as_deref().and_then(|v| v.parse().ok()).unwrap_or(0)
}

impl ApiChannel {
    fn into_resource(self) -> Resource {
        let stats = self.statistics.unwrap_or_default();
        let (title, handle) = match self.snippet {
            Some(s) => (s.title, s.custom_url),
            None => (String::new(), None),
        };
        Resource {
            display_name: if title.is_empty() { self.id.clone() } else { title },
            id: self.id,
            handle,
            subscriber_count: count(&stats.subscriber_count),
            video_count: count(&stats.video_count),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPlaylistItem {
    #[serde(default)]
    content_details: Option<ApiPlaylistContent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPlaylistContent {
    video_id: String,
}

#[derive(Deserialize)]
struct ApiSearchResult {
    id: ApiSearchId,
    #[serde(default)]
    snippet: Option<ApiSearchSnippet>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSearchId {
    #[serde(default)]
    video_id: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSearchSnippet {
    #[serde(default)]
    channel_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiVideo {
    id: String,
    #[serde(default)]
    snippet: Option<ApiVideoSnippet>,
    #[serde(default)]
    statistics: Option<ApiStatistics>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiVideoSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
}

impl ApiVideo {
    fn into_child(self, resource_id: &str) -> ChildResource {
        let stats = self.statistics.unwrap_or_default();
        let (title, published_at) = match self.snippet {
            Some(s) => (s.title, s.published_at),
            None => (String::new(), None),
        };
        ChildResource {
            id: self.id,
            parent_id: resource_id.to_string(),
            title,
            comment_count_estimate: count(&stats.comment_count),
            published_at,
            view_count: count(&stats.view_count),
            like_count: count(&stats.like_count),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiThread {
    snippet: ApiThreadSnippet,
    #[serde(default)]
    replies: Option<ApiThreadReplies>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiThreadSnippet {
    top_level_comment: ApiComment,
    #[serde(default)]
    total_reply_count: u64,
}

#[derive(Deserialize)]
struct ApiThreadReplies {
    #[serde(default)]
    comments: Vec<ApiComment>,
}

#[derive(Deserialize)]
struct ApiComment {
    id: String,
    snippet: ApiCommentSnippet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCommentSnippet {
    #[serde(default)]
    author_display_name: String,
    #[serde(default)]
    author_channel_id: Option<ApiAuthorChannel>,
    #[serde(default)]
    text_original: Option<String>,
    #[serde(default)]
    text_display: String,
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ApiAuthorChannel {
    value: String,
}

impl ApiComment {
    fn into_item(self, child_id: &str, parent_thread: Option<&str>) -> HarvestItem {
        let snippet = self.snippet;
        HarvestItem {
            item_id: self.id,
            parent_thread_id: parent_thread.map(str::to_string),
            resource_id: child_id.to_string(),
            is_reply: parent_thread.is_some(),
            author_id: snippet.author_channel_id.map(|a| a.value).unwrap_or_default(),
            author_name: snippet.author_display_name,
            raw_text: snippet.text_original.unwrap_or(snippet.text_display),
            like_count: snippet.like_count,
            published_at: snippet.published_at,
            reply_count: 0,
            annotation: None,
        }
    }
}

impl ApiThread {
    fn into_thread(self, child_id: &str) -> CommentThread {
        let total_reply_count = self.snippet.total_reply_count;
        let mut top_level = self.snippet.top_level_comment.into_item(child_id, None);
        top_level.reply_count = total_reply_count;

        let thread_id = top_level.item_id.clone();
        let replies = self
            .replies
            .map(|r| r.comments)
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.into_item(child_id, Some(&thread_id)))
            .collect();

        CommentThread {
            top_level,
            replies,
            total_reply_count,
        }
    }
}
