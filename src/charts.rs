//! PNG charts for the analysis stage, drawn with plotters.

use std::fs::create_dir_all;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::analyze::{yearly_totals, Analysis, EngagementRow, PivotTable};
use crate::models::CleanedVideo;

pub const PUBLICATION_TRENDS: &str = "publication_trends.png";
pub const ENGAGEMENT_VIEWS: &str = "engagement_views.png";
pub const ENGAGEMENT_LIKES: &str = "engagement_likes.png";
pub const PUBLICATION_HEATMAP: &str = "publication_heatmap.png";
pub const YEARLY_TOTAL: &str = "yearly_total.png";

const SIZE: (u32, u32) = (1400, 800);
const STEELBLUE: RGBColor = RGBColor(70, 130, 180);

type Series = Vec<(String, Vec<(i32, f64)>)>;

/// One line per topic from the pivot. Absent years plot as 0.
pub fn topic_series(pivot: &PivotTable) -> Series {
    pivot
        .topics
        .iter()
        .enumerate()
        .map(|(col, topic)| {
            let points = pivot
                .years
                .iter()
                .zip(&pivot.counts)
                .map(|(year, row)| (*year, row[col] as f64))
                .collect();
            (topic.clone(), points)
        })
        .collect()
}

/// One line per topic over the years that topic has rows for.
pub fn engagement_series(rows: &[EngagementRow], value: fn(&EngagementRow) -> f64) -> Series {
    let mut series: Series = Vec::new();
    for row in rows {
        let point = (row.publication_year, value(row));
        match series.last_mut() {
            Some((topic, points)) if *topic == row.main_topic => points.push(point),
            _ => series.push((row.main_topic.clone(), vec![point])),
        }
    }
    series
}

/// Year axis from the earliest to the latest year, at least one year wide.
pub fn year_span<'a>(years: impl IntoIterator<Item = &'a i32>) -> Range<i32> {
    let mut years = years.into_iter().copied();
    let Some(first) = years.next() else {
        return 0..1;
    };
    let (lo, hi) = years.fold((first, first), |(lo, hi), y| (lo.min(y), hi.max(y)));
    lo..hi.max(lo + 1)
}

/// Upper bound for a value axis with some headroom above the largest value.
pub fn value_ceiling(max: f64) -> f64 {
    if max > 0.0 {
        max * 1.1
    } else {
        1.0
    }
}

/// Yellow-orange-red ramp. `max == 0` maps everything to the palest color.
pub fn heat_color(count: u64, max: u64) -> RGBColor {
    const STOPS: [(f64, f64, f64); 3] = [(255.0, 255.0, 204.0), (253.0, 141.0, 60.0), (189.0, 0.0, 38.0)];
    let t = if max == 0 {
        0.0
    } else {
        (count as f64 / max as f64).clamp(0.0, 1.0)
    };
    let (from, to, local) = if t <= 0.5 {
        (STOPS[0], STOPS[1], t * 2.0)
    } else {
        (STOPS[1], STOPS[2], (t - 0.5) * 2.0)
    };
    let lerp = |a: f64, b: f64| (a + (b - a) * local).round() as u8;
    RGBColor(lerp(from.0, to.0), lerp(from.1, to.1), lerp(from.2, to.2))
}

fn line_chart(path: &Path, caption: &str, y_desc: &str, series: &Series) -> Result<()> {
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let x_range = year_span(series.iter().flat_map(|(_, pts)| pts.iter().map(|(y, _)| y)));
    let y_max = series
        .iter()
        .flat_map(|(_, pts)| pts.iter().map(|(_, v)| *v))
        .fold(0.0, f64::max);

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 30))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(90)
        .build_cartesian_2d(x_range, 0f64..value_ceiling(y_max))?;
    chart
        .configure_mesh()
        .x_desc("Year")
        .y_desc(y_desc)
        .x_label_formatter(&|y| y.to_string())
        .draw()?;

    for (idx, (topic, points)) in series.iter().enumerate() {
        let color = Palette99::pick(idx).mix(1.0);
        chart
            .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))?
            .label(topic.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        chart.draw_series(points.iter().map(|p| Circle::new(*p, 4, color.filled())))?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

/// Topics down the side, years across, each cell annotated with its count.
fn heatmap(path: &Path, pivot: &PivotTable) -> Result<()> {
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let n_years = pivot.years.len() as i32;
    let n_topics = pivot.topics.len() as i32;
    let max = pivot.counts.iter().flatten().copied().max().unwrap_or(0);

    let mut chart = ChartBuilder::on(&root)
        .caption("Heatmap: Videos Published by Topic and Year", ("sans-serif", 30))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(220)
        .build_cartesian_2d(
            (0..(n_years - 1).max(1)).into_segmented(),
            (0..(n_topics - 1).max(1)).into_segmented(),
        )?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Year")
        .y_desc("Topic")
        .x_labels(pivot.years.len())
        .y_labels(pivot.topics.len())
        .x_label_formatter(&|v| match v {
            SegmentValue::CenterOf(i) => pivot
                .years
                .get(*i as usize)
                .map(|y| y.to_string())
                .unwrap_or_default(),
            _ => String::new(),
        })
        .y_label_formatter(&|v| match v {
            SegmentValue::CenterOf(i) => pivot.topics.get(*i as usize).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .draw()?;

    let cells: Vec<(i32, i32, u64)> = pivot
        .counts
        .iter()
        .enumerate()
        .flat_map(|(row, counts)| {
            counts
                .iter()
                .enumerate()
                .map(move |(col, count)| (row as i32, col as i32, *count))
        })
        .collect();

    chart.draw_series(cells.iter().map(|(year, topic, count)| {
        Rectangle::new(
            [
                (SegmentValue::Exact(*year), SegmentValue::Exact(*topic)),
                (SegmentValue::Exact(year + 1), SegmentValue::Exact(topic + 1)),
            ],
            heat_color(*count, max).filled(),
        )
    }))?;

    let label_style = ("sans-serif", 18)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Center));
    chart.draw_series(cells.iter().map(|(year, topic, count)| {
        Text::new(
            count.to_string(),
            (SegmentValue::CenterOf(*year), SegmentValue::CenterOf(*topic)),
            label_style.clone(),
        )
    }))?;

    root.present()?;
    Ok(())
}

fn yearly_bars(path: &Path, totals: &[(i32, u64)]) -> Result<()> {
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let span = year_span(totals.iter().map(|(y, _)| y));
    let max = totals.iter().map(|(_, c)| *c).max().unwrap_or(0);
    let y_top = value_ceiling(max as f64).ceil() as u64;

    let mut chart = ChartBuilder::on(&root)
        .caption("Total IT Tutorial Videos Published per Year", ("sans-serif", 30))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(span.into_segmented(), 0u64..y_top)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Year")
        .y_desc("Number of Videos")
        .x_label_formatter(&|v| match v {
            SegmentValue::CenterOf(y) => y.to_string(),
            _ => String::new(),
        })
        .draw()?;

    chart.draw_series(
        Histogram::vertical(&chart)
            .style(STEELBLUE.mix(0.7).filled())
            .margin(10)
            .data(totals.iter().copied()),
    )?;

    let label_style = ("sans-serif", 18)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Bottom));
    chart.draw_series(totals.iter().map(|(year, count)| {
        Text::new(
            count.to_string(),
            (SegmentValue::CenterOf(*year), *count),
            label_style.clone(),
        )
    }))?;

    root.present()?;
    Ok(())
}

/// Draws all five charts into `results_dir` and returns their paths.
pub fn render_all(results_dir: &Path, videos: &[CleanedVideo], analysis: &Analysis) -> Result<Vec<PathBuf>> {
    create_dir_all(results_dir)
        .with_context(|| format!("Creating directory {}", results_dir.display()))?;
    let out = |name: &str| results_dir.join(name);

    let trends = out(PUBLICATION_TRENDS);
    line_chart(
        &trends,
        "IT Tutorial Videos Published per Topic Over Time",
        "Number of Videos",
        &topic_series(&analysis.pivot),
    )
    .with_context(|| format!("Drawing {}", trends.display()))?;

    let views = out(ENGAGEMENT_VIEWS);
    line_chart(
        &views,
        "Average Views per Topic Over Time",
        "Average Views",
        &engagement_series(&analysis.engagement, |r| r.view_count),
    )
    .with_context(|| format!("Drawing {}", views.display()))?;

    let likes = out(ENGAGEMENT_LIKES);
    line_chart(
        &likes,
        "Average Likes per Topic Over Time",
        "Average Likes",
        &engagement_series(&analysis.engagement, |r| r.like_count),
    )
    .with_context(|| format!("Drawing {}", likes.display()))?;

    let heat = out(PUBLICATION_HEATMAP);
    heatmap(&heat, &analysis.pivot).with_context(|| format!("Drawing {}", heat.display()))?;

    let totals = out(YEARLY_TOTAL);
    yearly_bars(&totals, &yearly_totals(videos))
        .with_context(|| format!("Drawing {}", totals.display()))?;

    Ok(vec![trends, views, likes, heat, totals])
}
