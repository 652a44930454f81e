//! Thin client for the two YouTube Data API v3 endpoints the collector needs.
//!
//! Only the fields the pipeline reads are modeled. Everything is defaulted so a
//! sparse or partially malformed item still maps to a record.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError, DisplayFromStr, PickFirst};

use crate::models::VideoRecord;

/// The API rejects larger pages and larger `id` lists.
pub const MAX_PAGE_SIZE: u32 = 50;
pub const MAX_IDS_PER_DETAILS_CALL: usize = 50;

const VIDEO_KIND: &str = "youtube#video";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchListResponse {
    #[serde(default)]
    pub items: Vec<SearchResult>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: SearchResultId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultId {
    #[serde(default)]
    pub kind: String,
    pub video_id: Option<String>,
}

impl SearchListResponse {
    /// Video ids on this page, in page order. Channels and playlists are skipped.
    pub fn video_ids(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|item| item.id.kind == VIDEO_KIND)
            .filter_map(|item| item.id.video_id.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<VideoItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub snippet: Snippet,
    #[serde(default)]
    pub statistics: Statistics,
}

#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub published_at: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub channel_title: String,
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category_id: String,
}

// Counts come back as decimal strings. Anything that doesn't parse is a zero.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    #[serde_as(as = "DefaultOnError<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub view_count: u64,
    #[serde_as(as = "DefaultOnError<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub like_count: u64,
    #[serde_as(as = "DefaultOnError<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub comment_count: u64,
}

/// Parameters of one `search.list` call.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub max_results: u32,
    pub order: &'a str,
    pub published_after: Option<&'a str>,
    pub language: &'a str,
    pub page_token: Option<&'a str>,
}

impl SearchRequest<'_> {
    fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("part", "snippet".to_string()),
            ("q", self.query.to_string()),
            ("type", "video".to_string()),
            ("maxResults", self.max_results.min(MAX_PAGE_SIZE).to_string()),
            ("order", self.order.to_string()),
            ("relevanceLanguage", self.language.to_string()),
        ];
        if let Some(published_after) = self.published_after {
            params.push(("publishedAfter", published_after.to_string()));
        }
        if let Some(page_token) = self.page_token {
            params.push(("pageToken", page_token.to_string()));
        }
        params
    }
}

#[async_trait]
pub trait VideoApi: Send + Sync {
    async fn search(&self, request: &SearchRequest<'_>) -> Result<SearchListResponse>;

    /// Full snippet and statistics for at most [`MAX_IDS_PER_DETAILS_CALL`] ids.
    async fn video_details(&self, ids: &[String]) -> Result<VideoListResponse>;
}

pub struct YouTubeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl YouTubeClient {
    pub fn new(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&'static str, String)],
    ) -> Result<T> {
        let url = format!("{}/{endpoint}", self.base_url.trim_end_matches('/'));
        // The key travels in the query string, so it is stripped from any error.
        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("Request failed for {url}"))?
            .error_for_status()
            .map_err(|e| e.without_url())
            .with_context(|| format!("HTTP error for {url}"))?;
        response
            .json::<T>()
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("Decoding JSON for {url}"))
    }
}

#[async_trait]
impl VideoApi for YouTubeClient {
    async fn search(&self, request: &SearchRequest<'_>) -> Result<SearchListResponse> {
        self.get_json("search", &request.query_params()).await
    }

    async fn video_details(&self, ids: &[String]) -> Result<VideoListResponse> {
        let ids = &ids[..ids.len().min(MAX_IDS_PER_DETAILS_CALL)];
        let params = [
            ("part", "statistics,snippet,contentDetails".to_string()),
            ("id", ids.join(",")),
        ];
        self.get_json("videos", &params).await
    }
}

pub fn record_from_item(item: VideoItem, topic: &str) -> VideoRecord {
    let VideoItem {
        id,
        snippet,
        statistics,
    } = item;
    VideoRecord {
        video_id: id,
        title: snippet.title,
        description: snippet.description,
        published_at: snippet.published_at,
        channel_id: snippet.channel_id,
        channel_title: snippet.channel_title,
        view_count: statistics.view_count,
        like_count: statistics.like_count,
        comment_count: statistics.comment_count,
        tags: snippet.tags,
        category_id: snippet.category_id,
        topic: topic.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_keeps_only_videos() {
        let response: SearchListResponse = serde_json::from_value(json!({
            "items": [
                {"id": {"kind": "youtube#video", "videoId": "a1"}},
                {"id": {"kind": "youtube#channel", "channelId": "UC1"}},
                {"id": {"kind": "youtube#video", "videoId": "b2"}},
                {"id": {"kind": "youtube#playlist", "playlistId": "PL1"}}
            ],
            "nextPageToken": "CAUQAA"
        }))
        .unwrap();

        assert_eq!(response.video_ids().collect::<Vec<_>>(), vec!["a1", "b2"]);
        assert_eq!(response.next_page_token.as_deref(), Some("CAUQAA"));
    }

    #[test]
    fn missing_cursor_and_items() {
        let response: SearchListResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.items.is_empty());
        assert!(response.next_page_token.is_none());
    }

    #[test]
    fn maps_full_item() {
        let item: VideoItem = serde_json::from_value(json!({
            "id": "dQw4w9WgXcQ",
            "snippet": {
                "title": "Rust in 100 seconds",
                "description": "A quick look",
                "publishedAt": "2023-04-01T12:00:00Z",
                "channelId": "UC123",
                "channelTitle": "Fireship",
                "tags": ["rust", "programming"],
                "categoryId": "28"
            },
            "statistics": {"viewCount": "1200", "likeCount": "80", "commentCount": "7"},
            "contentDetails": {"duration": "PT2M"}
        }))
        .unwrap();

        let record = record_from_item(item, "rust tutorial");
        assert_eq!(record.video_id, "dQw4w9WgXcQ");
        assert_eq!(record.published_at, "2023-04-01T12:00:00Z");
        assert_eq!(record.view_count, 1200);
        assert_eq!(record.like_count, 80);
        assert_eq!(record.comment_count, 7);
        assert_eq!(record.tags, vec!["rust", "programming"]);
        assert_eq!(record.category_id, "28");
        assert_eq!(record.topic, "rust tutorial");
    }

    #[test]
    fn sparse_item_gets_defaults() {
        // Likes hidden, comments disabled, no tags, no snippet at all.
        let item: VideoItem = serde_json::from_value(json!({
            "id": "x",
            "statistics": {"viewCount": "not-a-number", "likeCount": 5}
        }))
        .unwrap();

        let record = record_from_item(item, "python tutorial");
        assert_eq!(record.title, "");
        assert_eq!(record.published_at, "");
        assert_eq!(record.view_count, 0);
        assert_eq!(record.like_count, 5);
        assert_eq!(record.comment_count, 0);
        assert!(record.tags.is_empty());
    }

    #[test]
    fn search_params_clamp_page_size() {
        let request = SearchRequest {
            query: "cloud computing tutorial",
            max_results: 200,
            order: "relevance",
            published_after: Some("2019-01-01T00:00:00Z"),
            language: "en",
            page_token: Some("NEXT"),
        };
        let params = request.query_params();
        let get = |name: &str| {
            params
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("maxResults"), Some("50"));
        assert_eq!(get("type"), Some("video"));
        assert_eq!(get("pageToken"), Some("NEXT"));
        assert_eq!(get("publishedAfter"), Some("2019-01-01T00:00:00Z"));
    }
}
