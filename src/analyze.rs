//! Grouped aggregates over the cleaned table: publication counts, engagement
//! means and year-over-year growth per topic.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::charts;
use crate::config::Config;
use crate::models::{round2, CleanedVideo};
use crate::report;
use crate::storage::{self, InputSelection};

/// Video counts with one row per publication year and one column per topic.
/// Both axes are sorted ascending; cells without videos hold 0.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotTable {
    pub years: Vec<i32>,
    pub topics: Vec<String>,
    pub counts: Vec<Vec<u64>>,
}

impl PivotTable {
    pub fn get(&self, year: i32, topic: &str) -> Option<u64> {
        let row = self.years.iter().position(|y| *y == year)?;
        let col = self.topics.iter().position(|t| t == topic)?;
        Some(self.counts[row][col])
    }

    pub fn to_text(&self) -> String {
        let width = self.topics.iter().map(String::len).max().unwrap_or(0).max(6);
        let header: String = self
            .topics
            .iter()
            .map(|topic| format!(" {topic:>width$}"))
            .collect();
        let rows = self.years.iter().zip(&self.counts).map(|(year, row)| {
            let cells: String = row.iter().map(|count| format!(" {count:>width$}")).collect();
            format!("{year:<6}{cells}")
        });
        std::iter::once(format!("{:<6}{header}", "year"))
            .chain(rows)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublicationCount {
    pub main_topic: String,
    pub publication_year: i32,
    pub video_count: u64,
}

/// Mean engagement per (topic, year), rounded to two places.
#[derive(Debug, Clone, PartialEq)]
pub struct EngagementRow {
    pub main_topic: String,
    pub publication_year: i32,
    pub view_count: f64,
    pub like_count: f64,
    pub avg_views_per_year: f64,
    pub engagement_rate: f64,
}

/// Unrounded per-year aggregates that growth is computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct YearlyStats {
    pub topic: String,
    pub year: i32,
    pub video_count: u64,
    pub avg_views: f64,
    pub avg_likes: f64,
    pub avg_views_per_year: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrowthRow {
    pub topic: String,
    pub year: i32,
    pub video_count_growth_pct: f64,
    pub avg_views_growth_pct: f64,
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub publication_counts: Vec<PublicationCount>,
    pub pivot: PivotTable,
    pub engagement: Vec<EngagementRow>,
    pub yearly_stats: Vec<YearlyStats>,
    pub growth: Vec<GrowthRow>,
}

#[derive(Default)]
struct Accum {
    count: u64,
    views: f64,
    likes: f64,
    views_per_year: f64,
    engagement: f64,
}

impl Accum {
    fn add(&mut self, v: &CleanedVideo) {
        self.count += 1;
        self.views += v.view_count as f64;
        self.likes += v.like_count as f64;
        self.views_per_year += v.avg_views_per_year;
        self.engagement += v.engagement_rate;
    }

    fn mean(&self, total: f64) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            total / self.count as f64
        }
    }
}

/// Groups by (main_topic, publication_year), ordered by topic then year.
fn group(videos: &[CleanedVideo]) -> BTreeMap<(String, i32), Accum> {
    let mut groups: BTreeMap<(String, i32), Accum> = BTreeMap::new();
    for v in videos {
        groups
            .entry((v.main_topic.clone(), v.publication_year))
            .or_default()
            .add(v);
    }
    groups
}

pub fn publication_trends(videos: &[CleanedVideo]) -> (Vec<PublicationCount>, PivotTable) {
    let groups = group(videos);
    let counts: Vec<PublicationCount> = groups
        .iter()
        .map(|((topic, year), acc)| PublicationCount {
            main_topic: topic.clone(),
            publication_year: *year,
            video_count: acc.count,
        })
        .collect();

    let years: Vec<i32> = groups
        .keys()
        .map(|(_, y)| *y)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let topics: Vec<String> = groups
        .keys()
        .map(|(t, _)| t.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let matrix = years
        .iter()
        .map(|year| {
            topics
                .iter()
                .map(|topic| {
                    groups
                        .get(&(topic.clone(), *year))
                        .map_or(0, |acc| acc.count)
                })
                .collect()
        })
        .collect();

    (
        counts,
        PivotTable {
            years,
            topics,
            counts: matrix,
        },
    )
}

pub fn engagement_trends(videos: &[CleanedVideo]) -> Vec<EngagementRow> {
    group(videos)
        .into_iter()
        .map(|((topic, year), acc)| EngagementRow {
            main_topic: topic,
            publication_year: year,
            view_count: round2(acc.mean(acc.views)),
            like_count: round2(acc.mean(acc.likes)),
            avg_views_per_year: round2(acc.mean(acc.views_per_year)),
            engagement_rate: round2(acc.mean(acc.engagement)),
        })
        .collect()
}

pub fn yearly_stats(videos: &[CleanedVideo]) -> Vec<YearlyStats> {
    group(videos)
        .into_iter()
        .map(|((topic, year), acc)| YearlyStats {
            topic,
            year,
            video_count: acc.count,
            avg_views: acc.mean(acc.views),
            avg_likes: acc.mean(acc.likes),
            avg_views_per_year: acc.mean(acc.views_per_year),
        })
        .collect()
}

/// Percentage change from `prev` to `curr`, rounded to two places.
/// A zero (or negative) baseline reports 0 rather than an unbounded change.
pub fn pct_change(prev: f64, curr: f64) -> f64 {
    if prev > 0.0 {
        round2((curr - prev) / prev * 100.0)
    } else {
        0.0
    }
}

/// Change between consecutive years present for each topic. `stats` must be
/// ordered by topic then year, as [`yearly_stats`] returns it.
pub fn growth_trends(stats: &[YearlyStats]) -> Vec<GrowthRow> {
    stats
        .windows(2)
        .filter(|pair| pair[0].topic == pair[1].topic)
        .map(|pair| {
            let (prev, curr) = (&pair[0], &pair[1]);
            GrowthRow {
                topic: curr.topic.clone(),
                year: curr.year,
                video_count_growth_pct: pct_change(prev.video_count as f64, curr.video_count as f64),
                avg_views_growth_pct: pct_change(prev.avg_views, curr.avg_views),
            }
        })
        .collect()
}

/// Total videos per year across all topics, ascending by year.
pub fn yearly_totals(videos: &[CleanedVideo]) -> Vec<(i32, u64)> {
    let mut totals: BTreeMap<i32, u64> = BTreeMap::new();
    for v in videos {
        *totals.entry(v.publication_year).or_default() += 1;
    }
    totals.into_iter().collect()
}

pub fn analyze(videos: &[CleanedVideo]) -> Analysis {
    let (publication_counts, pivot) = publication_trends(videos);
    let engagement = engagement_trends(videos);
    let yearly_stats = yearly_stats(videos);
    let growth = growth_trends(&yearly_stats);
    Analysis {
        publication_counts,
        pivot,
        engagement,
        yearly_stats,
        growth,
    }
}

fn log_analysis(analysis: &Analysis) {
    info!("Analysis 1: Publication Trends");
    info!("Videos published per topic per year:\n{}", analysis.pivot.to_text());

    info!("Analysis 2: Engagement Trends");
    for row in &analysis.engagement {
        info!(
            "  {} {}: views={:.2} likes={:.2} views/year={:.2} engagement={:.2}%",
            row.main_topic,
            row.publication_year,
            row.view_count,
            row.like_count,
            row.avg_views_per_year,
            row.engagement_rate
        );
    }

    info!("Analysis 3: Growth/Decline Trends");
    for row in &analysis.growth {
        info!(
            "  {} {}: videos {:+.2}%, views {:+.2}%",
            row.topic, row.year, row.video_count_growth_pct, row.avg_views_growth_pct
        );
    }
}

/// Loads the selected cleaned table, logs the three analyses, renders the
/// charts and writes the report. Returns `false` when there was no data.
pub fn run(config: &Config, selection: &InputSelection) -> Result<bool> {
    let Some(path) = storage::resolve_cleaned_input(selection)? else {
        warn!("No data files found for {selection:?}. Run the clean stage first.");
        return Ok(false);
    };
    info!("Loading data from: {}", path.display());
    let videos = storage::load_cleaned(&path)?;
    if videos.is_empty() {
        warn!("No data available for analysis.");
        return Ok(false);
    }

    let analysis = analyze(&videos);
    log_analysis(&analysis);

    let results_dir = &config.storage.results_dir;
    match charts::render_all(results_dir, &videos, &analysis) {
        Ok(paths) => {
            for p in paths {
                info!("Saved: {}", p.display());
            }
        }
        Err(e) => error!("Rendering charts failed: {e:#}"),
    }

    let text = report::render(&videos, &analysis, chrono::Local::now());
    let report_path = report::write(results_dir, &text).context("Writing analysis report")?;
    info!("Summary report saved to: {}", report_path.display());
    Ok(true)
}
