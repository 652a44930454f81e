use std::collections::BTreeMap;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

use crate::analyze::{Analysis, GrowthRow};
use crate::models::CleanedVideo;

pub const REPORT_FILE: &str = "analysis_report.txt";

const RULE: &str = "============================================================";
const THIN_RULE: &str = "------------------------------------------------------------";

/// Topics ordered by video count, most first. Ties go alphabetically.
pub fn top_topics_by_count(videos: &[CleanedVideo], n: usize) -> Vec<(String, u64)> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for v in videos {
        *counts.entry(v.main_topic.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<(String, u64)> = counts
        .into_iter()
        .map(|(topic, count)| (topic.to_string(), count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked
}

/// Topics ordered by mean view count, highest first.
pub fn top_topics_by_views(videos: &[CleanedVideo], n: usize) -> Vec<(String, f64)> {
    let mut sums: BTreeMap<&str, (f64, u64)> = BTreeMap::new();
    for v in videos {
        let entry = sums.entry(v.main_topic.as_str()).or_default();
        entry.0 += v.view_count as f64;
        entry.1 += 1;
    }
    let mut ranked: Vec<(String, f64)> = sums
        .into_iter()
        .map(|(topic, (sum, count))| (topic.to_string(), sum / count as f64))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked
}

/// Growth rows of the latest year in the table, ranked by video-count growth.
pub fn fastest_growing(growth: &[GrowthRow], n: usize) -> Vec<&GrowthRow> {
    let Some(latest) = growth.iter().map(|g| g.year).max() else {
        return Vec::new();
    };
    let mut recent: Vec<&GrowthRow> = growth.iter().filter(|g| g.year == latest).collect();
    // Stable sort keeps table order among equal growth.
    recent.sort_by(|a, b| b.video_count_growth_pct.total_cmp(&a.video_count_growth_pct));
    recent.truncate(n);
    recent
}

/// Formats a non-negative amount with no decimals and comma thousands separators.
pub fn with_thousands(value: f64) -> String {
    let digits = format!("{:.0}", value);
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits.as_str()),
    };
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}{grouped}")
}

pub fn render(videos: &[CleanedVideo], analysis: &Analysis, generated_at: DateTime<Local>) -> String {
    let mut lines = vec![
        RULE.to_string(),
        "YouTube IT Skills Trend Analysis Report".to_string(),
        RULE.to_string(),
        String::new(),
        format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S")),
        String::new(),
        "EXECUTIVE SUMMARY".to_string(),
        THIN_RULE.to_string(),
        format!("Total videos analyzed: {}", videos.len()),
    ];
    let min_year = videos.iter().map(|v| v.publication_year).min();
    let max_year = videos.iter().map(|v| v.publication_year).max();
    if let (Some(min_year), Some(max_year)) = (min_year, max_year) {
        lines.push(format!("Date range: {min_year} - {max_year}"));
    }
    lines.push(format!("Topics analyzed: {}", analysis.pivot.topics.len()));
    lines.push(String::new());

    lines.push("KEY FINDINGS".to_string());
    lines.push(THIN_RULE.to_string());

    lines.push(String::new());
    lines.push("Most popular topics (by video count):".to_string());
    lines.extend(
        top_topics_by_count(videos, 5)
            .into_iter()
            .map(|(topic, count)| format!("  - {topic}: {count} videos")),
    );

    lines.push(String::new());
    lines.push("Topics with highest average views:".to_string());
    lines.extend(
        top_topics_by_views(videos, 5)
            .into_iter()
            .map(|(topic, views)| format!("  - {topic}: {} average views", with_thousands(views))),
    );

    let fastest = fastest_growing(&analysis.growth, 3);
    if !fastest.is_empty() {
        lines.push(String::new());
        lines.push("Growth Trends:".to_string());
        lines.push("  Fastest growing topics (by video count):".to_string());
        lines.extend(
            fastest
                .into_iter()
                .map(|row| format!("    - {}: {:.1}% growth", row.topic, row.video_count_growth_pct)),
        );
    }

    lines.push(String::new());
    lines.push(RULE.to_string());
    lines.push("For detailed visualizations, see the PNG files in this directory.".to_string());

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

pub fn write(results_dir: &Path, text: &str) -> Result<PathBuf> {
    create_dir_all(results_dir)
        .with_context(|| format!("Creating directory {}", results_dir.display()))?;
    let path = results_dir.join(REPORT_FILE);
    std::fs::write(&path, text).with_context(|| format!("Writing {}", path.display()))?;
    Ok(path)
}
