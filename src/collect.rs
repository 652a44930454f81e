//! Collection stage: paginated search per topic, details for newly seen ids,
//! and a JSON snapshot of everything gathered so far after each topic.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio_utils::RateLimiter;
use tracing::{error, info, warn};

use crate::config::{CollectionConfig, Config};
use crate::models::VideoRecord;
use crate::storage;
use crate::youtube::{record_from_item, SearchRequest, VideoApi, MAX_IDS_PER_DETAILS_CALL};

/// Collects up to `max_queries_per_topic` pages of results for one topic.
///
/// Pagination stops at the first page that brings no unseen ids, when the
/// response has no continuation cursor, or when a search or details call fails.
/// Failures are logged, never propagated.
pub async fn collect_topic<A: VideoApi + ?Sized>(
    api: &A,
    topic: &str,
    settings: &CollectionConfig,
) -> Vec<VideoRecord> {
    info!("Collecting data for topic: {topic}");
    let rate_limiter = RateLimiter::new(settings.page_pause());
    let max_queries = settings.max_queries_per_topic;

    let mut videos = Vec::new();
    let mut seen_video_ids: HashSet<String> = HashSet::new();
    let mut next_page_token: Option<String> = None;

    'pages: for query_no in 1..=max_queries {
        info!("  Query {query_no}/{max_queries}...");
        let request = SearchRequest {
            query: topic,
            max_results: settings.max_results_per_query,
            order: &settings.order,
            published_after: settings.published_after.as_deref(),
            language: &settings.language,
            page_token: next_page_token.as_deref(),
        };
        let search_response = match rate_limiter.throttle(|| api.search(&request)).await {
            Ok(response) => response,
            Err(e) => {
                warn!("  Search failed for query {query_no}: {e:#}");
                break;
            }
        };

        let new_video_ids: Vec<String> = search_response
            .video_ids()
            .filter(|id| seen_video_ids.insert(id.to_string()))
            .map(String::from)
            .collect();
        if new_video_ids.is_empty() {
            info!("  No new videos found in query {query_no}");
            break;
        }

        info!("  Fetching details for {} videos...", new_video_ids.len());
        for batch in new_video_ids.chunks(MAX_IDS_PER_DETAILS_CALL) {
            match api.video_details(batch).await {
                Ok(details) => videos.extend(
                    details
                        .items
                        .into_iter()
                        .map(|item| record_from_item(item, topic)),
                ),
                Err(e) => {
                    warn!("  Fetching details failed for query {query_no}: {e:#}");
                    break 'pages;
                }
            }
        }

        next_page_token = search_response.next_page_token;
        if next_page_token.is_none() {
            info!("  No more pages available for topic: {topic}");
            break;
        }
    }

    info!("  Collected {} unique videos for topic: {topic}", videos.len());
    videos
}

/// Runs [`collect_topic`] for every configured topic, snapshotting the
/// accumulated records after each one and once more at the end.
/// Returns the accumulated records and the path of the final snapshot.
pub async fn collect_all<A: VideoApi + ?Sized>(
    api: &A,
    config: &Config,
) -> Result<(Vec<VideoRecord>, PathBuf)> {
    let raw_dir = &config.storage.raw_dir;
    let mut all_videos: Vec<VideoRecord> = Vec::new();

    for topic in &config.topics {
        let topic_videos = collect_topic(api, topic, &config.collection).await;
        all_videos.extend(topic_videos);

        let snapshot = raw_dir.join(storage::raw_file_name(false));
        match storage::write_json(&snapshot, &all_videos) {
            Ok(()) => info!("Data saved to: {}", snapshot.display()),
            Err(e) => error!("Saving snapshot after topic '{topic}' failed: {e:#}"),
        }

        tokio::time::sleep(config.collection.topic_pause()).await;
    }

    let final_path = raw_dir.join(storage::raw_file_name(true));
    storage::write_json(&final_path, &all_videos).context("Saving final collection")?;
    info!("Data saved to: {}", final_path.display());

    let unique: HashSet<&str> = all_videos.iter().map(|v| v.video_id.as_str()).collect();
    info!("Data collection complete!");
    info!("Total videos collected: {}", all_videos.len());
    info!("Unique videos: {}", unique.len());

    Ok((all_videos, final_path))
}
