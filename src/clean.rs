//! Cleaning stage: raw JSON records in, one deduplicated and windowed table out.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use serde_with::{serde_as, DefaultOnError};
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{round2, CleanedVideo};
use crate::storage::{self, InputSelection};

const UNKNOWN: &str = "Unknown";

/// A raw record as found on disk. Files may come from older runs or other
/// tools, so every field is optional and counts are kept as loose JSON.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVideo {
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub title: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub description: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub channel_title: Option<String>,
    #[serde(default)]
    pub view_count: Value,
    #[serde(default)]
    pub like_count: Value,
    #[serde(default)]
    pub comment_count: Value,
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub topic: Option<String>,
}

/// Keeps the first record seen for each `video_id`. Records without an id are dropped.
pub fn dedup_by_id(records: Vec<RawVideo>) -> Vec<RawVideo> {
    let mut seen = HashSet::new();
    let initial = records.len();
    let mut without_id = 0;
    let kept: Vec<RawVideo> = records
        .into_iter()
        .filter(|r| match &r.video_id {
            Some(id) => seen.insert(id.clone()),
            None => {
                without_id += 1;
                false
            }
        })
        .collect();
    if without_id > 0 {
        warn!("Dropped {without_id} record(s) without a video_id");
    }
    let removed = initial - kept.len() - without_id;
    if removed > 0 {
        info!("Removed {removed} duplicate video(s)");
    }
    kept
}

/// Calendar year of an ISO-8601 timestamp. A trailing `Z` is read as UTC.
/// Date-only and offset-less timestamps are accepted too.
pub fn extract_year(date: &str) -> Option<i32> {
    let date = date.trim();
    if date.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return Some(dt.year());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.year());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt.year());
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .map(|d| d.year())
}

/// Non-negative integer view of a loosely typed count. Fractions are truncated;
/// negatives, non-numbers and missing values become 0.
pub fn coerce_count(value: &Value) -> u64 {
    let as_float = match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                return v;
            }
            n.as_f64()
        }
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<u64>() {
                Ok(v) => return v,
                Err(_) => s.parse::<f64>().ok(),
            }
        }
        _ => None,
    };
    match as_float {
        Some(v) if v.is_finite() && v > 0.0 => v.trunc() as u64,
        _ => 0,
    }
}

pub fn years_since_publication(publication_year: i32, current_year: i32) -> i32 {
    (current_year - publication_year + 1).max(1)
}

pub fn avg_views_per_year(view_count: u64, years_since_publication: i32) -> f64 {
    round2(view_count as f64 / years_since_publication.max(1) as f64)
}

/// Likes per hundred views. Zero views count as one so the ratio stays finite.
pub fn engagement_rate(like_count: u64, view_count: u64) -> f64 {
    round2(like_count as f64 / view_count.max(1) as f64 * 100.0)
}

static TUTORIAL_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i) tutorial$").expect("static regex"));

/// Display form of a topic: the trailing " tutorial" removed, any casing.
pub fn main_topic(topic: &str) -> String {
    TUTORIAL_SUFFIX.replace(topic, "").into_owned()
}

fn text_or_unknown(value: Option<String>) -> String {
    value.unwrap_or_else(|| UNKNOWN.to_string())
}

/// Runs the cleaning steps in order: dedup, year extraction, fill-missing and
/// drop-undated, views per year, trailing window, engagement and main topic.
pub fn clean_records(raw: Vec<RawVideo>, current_year: i32, window_years: i32) -> Vec<CleanedVideo> {
    info!("Initial record count: {}", raw.len());

    info!("Step 1: Removing duplicates...");
    let deduped = dedup_by_id(raw);

    info!("Step 2: Converting publication dates to years...");
    let with_years: Vec<(RawVideo, Option<i32>)> = deduped
        .into_iter()
        .map(|r| {
            let year = r.published_at.as_deref().and_then(extract_year);
            (r, year)
        })
        .collect();
    let invalid_dates = with_years.iter().filter(|(_, y)| y.is_none()).count();
    if invalid_dates > 0 {
        info!("  Found {invalid_dates} records with invalid dates");
    }

    let min_year = current_year - window_years;
    let in_window: Vec<(RawVideo, i32)> = with_years
        .into_iter()
        .filter_map(|(r, year)| year.map(|y| (r, y)))
        .filter(|(_, year)| *year >= min_year)
        .collect();
    info!(
        "Step 3: Kept {} dated records published from {min_year} onwards",
        in_window.len()
    );

    info!("Step 4: Filling missing fields, normalizing counts, adding derived fields...");
    let cleaned: Vec<CleanedVideo> = in_window
        .into_iter()
        .map(|(r, publication_year)| {
            let view_count = coerce_count(&r.view_count);
            let like_count = coerce_count(&r.like_count);
            let years_since = years_since_publication(publication_year, current_year);
            let topic = r.topic.unwrap_or_default();
            CleanedVideo {
                video_id: r.video_id.unwrap_or_default(),
                title: text_or_unknown(r.title),
                description: text_or_unknown(r.description),
                published_at: r.published_at.unwrap_or_default(),
                channel_id: r.channel_id.unwrap_or_default(),
                channel_title: text_or_unknown(r.channel_title),
                view_count,
                like_count,
                comment_count: coerce_count(&r.comment_count),
                tags: r.tags,
                category_id: r.category_id.unwrap_or_default(),
                main_topic: main_topic(&topic),
                topic,
                publication_year,
                years_since_publication: years_since,
                avg_views_per_year: avg_views_per_year(view_count, years_since),
                engagement_rate: engagement_rate(like_count, view_count),
            }
        })
        .collect();

    info!("Final record count: {}", cleaned.len());
    cleaned
}

fn log_summary(videos: &[CleanedVideo]) {
    let mut by_topic: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_year: BTreeMap<i32, usize> = BTreeMap::new();
    for v in videos {
        *by_topic.entry(v.main_topic.as_str()).or_default() += 1;
        *by_year.entry(v.publication_year).or_default() += 1;
    }
    let mut by_topic: Vec<_> = by_topic.into_iter().collect();
    by_topic.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    info!("Total videos: {}", videos.len());
    if let (Some(first), Some(last)) = (by_year.keys().next(), by_year.keys().last()) {
        info!("Date range: {first} - {last}");
    }
    for (topic, count) in by_topic {
        info!("  {topic}: {count}");
    }
    for (year, count) in by_year {
        info!("  {year}: {count}");
    }
}

/// Loads the selected raw files, cleans them and writes the cleaned table.
/// Returns `None` when there was nothing to write.
pub fn run(
    config: &Config,
    selection: &InputSelection,
    name: Option<String>,
    current_year: i32,
) -> Result<Option<(PathBuf, PathBuf)>> {
    let paths = storage::resolve_raw_inputs(selection)?;
    if paths.is_empty() {
        warn!("No JSON files found for {selection:?}");
    }
    let values = storage::load_raw_values(&paths);
    if values.is_empty() {
        warn!("No data to clean. Run the collect stage first.");
        return Ok(None);
    }

    let raw: Vec<RawVideo> = values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed record: {e}");
                None
            }
        })
        .collect();

    let cleaned = clean_records(raw, current_year, config.analysis.window_years);
    if cleaned.is_empty() {
        warn!("No records survived cleaning; nothing written.");
        return Ok(None);
    }

    let name = name.unwrap_or_else(storage::cleaned_base_name);
    let (csv_path, json_path) =
        storage::write_cleaned(&config.storage.processed_dir, &name, &cleaned)
            .context("Saving cleaned data")?;
    info!("Cleaned data saved to CSV: {}", csv_path.display());
    info!("Cleaned data saved to JSON: {}", json_path.display());

    log_summary(&cleaned);
    Ok(Some((csv_path, json_path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i32 = 2026;

    fn raw(value: Value) -> RawVideo {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn duplicate_ids_keep_first_seen() {
        let records = vec![
            raw(json!({"video_id": "abc", "published_at": "2025-03-01T00:00:00Z", "view_count": 100})),
            raw(json!({"video_id": "xyz", "published_at": "2025-03-01T00:00:00Z", "view_count": 7})),
            raw(json!({"video_id": "abc", "published_at": "2025-03-01T00:00:00Z", "view_count": 500})),
        ];

        let cleaned = clean_records(records, NOW, 5);
        let abc: Vec<_> = cleaned.iter().filter(|v| v.video_id == "abc").collect();
        assert_eq!(abc.len(), 1);
        assert_eq!(abc[0].view_count, 100);
        assert_eq!(cleaned.len(), 2);
    }

    #[test]
    fn year_from_iso_timestamps() {
        assert_eq!(extract_year("2023-11-05T14:22:01Z"), Some(2023));
        assert_eq!(extract_year("2020-01-01T00:30:00.123Z"), Some(2020));
        assert_eq!(extract_year("2021-12-31T23:00:00-05:00"), Some(2021));
        assert_eq!(extract_year("2022-07-04T09:00:00"), Some(2022));
        assert_eq!(extract_year("2024-02-29"), Some(2024));
        assert_eq!(extract_year(""), None);
        assert_eq!(extract_year("yesterday"), None);
        assert_eq!(extract_year("2023-13-45T00:00:00Z"), None);
    }

    #[test]
    fn undated_records_are_dropped() {
        let records = vec![
            raw(json!({"video_id": "a", "published_at": "", "view_count": 10, "title": "ok"})),
            raw(json!({"video_id": "b", "view_count": 10})),
            raw(json!({"video_id": "c", "published_at": "garbage"})),
            raw(json!({"video_id": "d", "published_at": "2024-05-05T00:00:00Z"})),
        ];
        let cleaned = clean_records(records, NOW, 5);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].video_id, "d");
    }

    #[test]
    fn counts_are_coerced() {
        assert_eq!(coerce_count(&json!(42)), 42);
        assert_eq!(coerce_count(&json!("1234")), 1234);
        assert_eq!(coerce_count(&json!(" 12.9 ")), 12);
        assert_eq!(coerce_count(&json!(3.7)), 3);
        assert_eq!(coerce_count(&json!(-5)), 0);
        assert_eq!(coerce_count(&json!("n/a")), 0);
        assert_eq!(coerce_count(&json!(null)), 0);
        assert_eq!(coerce_count(&json!([1])), 0);
    }

    #[test]
    fn missing_text_becomes_unknown() {
        let cleaned = clean_records(
            vec![raw(json!({
                "video_id": "a",
                "published_at": "2025-01-01T00:00:00Z",
                "title": null,
                "channel_id": "UC9",
                "tags": "not-a-list",
                "topic": "Data Science Tutorial"
            }))],
            NOW,
            5,
        );
        let v = &cleaned[0];
        assert_eq!(v.title, UNKNOWN);
        assert_eq!(v.description, UNKNOWN);
        assert_eq!(v.channel_title, UNKNOWN);
        assert_eq!(v.channel_id, "UC9");
        assert!(v.tags.is_empty());
        assert_eq!(v.view_count, 0);
        assert_eq!(v.main_topic, "Data Science");
    }

    #[test]
    fn views_per_year_never_divides_by_zero() {
        assert_eq!(years_since_publication(NOW, NOW), 1);
        assert_eq!(years_since_publication(NOW + 1, NOW), 1);
        assert_eq!(years_since_publication(2022, NOW), 5);
        assert_eq!(avg_views_per_year(999, years_since_publication(NOW, NOW)), 999.0);
        assert_eq!(avg_views_per_year(1000, 3), 333.33);
        assert_eq!(avg_views_per_year(1000, 0), 1000.0);
    }

    #[test]
    fn engagement_treats_zero_views_as_one() {
        assert_eq!(engagement_rate(0, 0), 0.0);
        assert_eq!(engagement_rate(15, 0), 1500.0);
        assert_eq!(engagement_rate(1, 3), 33.33);
        assert_eq!(engagement_rate(50, 1000), 5.0);
    }

    #[test]
    fn window_keeps_trailing_years() {
        let records = vec![
            raw(json!({"video_id": "old", "published_at": "2020-06-01T00:00:00Z"})),
            raw(json!({"video_id": "edge", "published_at": "2021-01-01T00:00:00Z"})),
            raw(json!({"video_id": "new", "published_at": "2026-01-01T00:00:00Z", "view_count": 80})),
        ];
        let cleaned = clean_records(records, NOW, 5);
        let ids: Vec<_> = cleaned.iter().map(|v| v.video_id.as_str()).collect();
        assert_eq!(ids, vec!["edge", "new"]);
        assert_eq!(cleaned[0].years_since_publication, 6);
        assert_eq!(cleaned[1].avg_views_per_year, 80.0);
    }

    #[test]
    fn main_topic_strips_trailing_suffix_only() {
        assert_eq!(main_topic("cybersecurity tutorial"), "cybersecurity");
        assert_eq!(main_topic("Machine Learning TUTORIAL"), "Machine Learning");
        assert_eq!(main_topic("tutorial hell tips"), "tutorial hell tips");
        assert_eq!(main_topic("rust"), "rust");
    }

    #[test]
    fn run_writes_nothing_for_empty_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.processed_dir = dir.path().join("processed");
        std::fs::write(dir.path().join("empty.json"), "[]").unwrap();

        let written = run(
            &config,
            &InputSelection::AllIn(dir.path().to_path_buf()),
            None,
            NOW,
        )
        .unwrap();
        assert!(written.is_none());
        assert!(!config.storage.processed_dir.exists());
    }

    #[test]
    fn run_writes_named_outputs() {
        let dir = tempfile::TempDir::new().unwrap();
        let raw_dir = dir.path().join("raw");
        std::fs::create_dir_all(&raw_dir).unwrap();
        std::fs::write(
            raw_dir.join("youtube_data_1.json"),
            json!([
                {"video_id": "a", "published_at": "2025-02-02T00:00:00Z", "view_count": "300",
                 "like_count": "3", "topic": "python tutorial", "tags": ["py"]},
                {"video_id": "b", "published_at": "2024-02-02T00:00:00Z", "view_count": 50,
                 "topic": "python tutorial"}
            ])
            .to_string(),
        )
        .unwrap();
        std::fs::write(
            raw_dir.join("youtube_data_2.json"),
            json!({"video_id": "a", "published_at": "2025-02-02T00:00:00Z", "view_count": 999})
                .to_string(),
        )
        .unwrap();

        let mut config = Config::default();
        config.storage.processed_dir = dir.path().join("processed");
        let (csv_path, json_path) = run(
            &config,
            &InputSelection::AllIn(raw_dir),
            Some("cleaned_fixture".to_string()),
            NOW,
        )
        .unwrap()
        .unwrap();

        assert!(csv_path.ends_with("processed/cleaned_fixture.csv"));
        let reloaded = storage::load_cleaned(&json_path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded[0].view_count, 300);
        assert_eq!(reloaded[0].engagement_rate, 1.0);
        assert_eq!(reloaded[0].main_topic, "python");
        assert_eq!(reloaded[0].avg_views_per_year, 150.0);
    }
}
