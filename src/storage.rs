//! Flat-file persistence shared by the three stages.
//!
//! Raw records are pretty-printed JSON arrays. The cleaned table is written
//! twice: a CSV through polars and a JSON array of row objects.

use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use polars::prelude::*;
use serde::Serialize;

use crate::models::CleanedVideo;

pub const RAW_PREFIX: &str = "youtube_data";
pub const CLEANED_PREFIX: &str = "cleaned_youtube_data";

/// Which file(s) a stage reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSelection {
    /// Exactly these files, in this order
    Paths(Vec<PathBuf>),
    /// Every matching file in the directory, in file-name order
    AllIn(PathBuf),
    /// The most recently created matching file in the directory
    LatestIn(PathBuf),
}

pub fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

pub fn raw_file_name(is_final: bool) -> String {
    if is_final {
        format!("{RAW_PREFIX}_final_{}.json", timestamp())
    } else {
        format!("{RAW_PREFIX}_{}.json", timestamp())
    }
}

pub fn cleaned_base_name() -> String {
    format!("{CLEANED_PREFIX}_{}", timestamp())
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .with_context(|| format!("Creating directory {}", parent.display()))?;
    }
    let f = File::create(path).with_context(|| format!("Creating {}", path.display()))?;
    let mut writer = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Writing {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Listing {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e.eq_ignore_ascii_case(ext)) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// Not every filesystem records a birth time; fall back to the modification time.
fn created_at(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.created().or_else(|_| m.modified()))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn latest(files: Vec<PathBuf>) -> Option<PathBuf> {
    files.into_iter().max_by_key(|path| created_at(path))
}

/// Resolves the raw JSON files the cleaner should read.
pub fn resolve_raw_inputs(selection: &InputSelection) -> Result<Vec<PathBuf>> {
    match selection {
        InputSelection::Paths(paths) => Ok(paths.clone()),
        InputSelection::AllIn(dir) => files_with_extension(dir, "json"),
        InputSelection::LatestIn(dir) => Ok(latest(files_with_extension(dir, "json")?)
            .into_iter()
            .collect()),
    }
}

/// Resolves the cleaned table the analyzer should read, preferring CSV over JSON.
pub fn resolve_cleaned_input(selection: &InputSelection) -> Result<Option<PathBuf>> {
    match selection {
        InputSelection::Paths(paths) => Ok(paths.first().cloned()),
        InputSelection::AllIn(dir) | InputSelection::LatestIn(dir) => {
            if let Some(csv) = latest(files_with_extension(dir, "csv")?) {
                return Ok(Some(csv));
            }
            Ok(latest(files_with_extension(dir, "json")?))
        }
    }
}

/// Reads each raw file and flattens its contents into one list of JSON values.
/// A file holding a single object contributes that object. Files that can't be
/// read or parsed are logged and skipped.
pub fn load_raw_values(paths: &[PathBuf]) -> Vec<serde_json::Value> {
    let mut all_values = Vec::new();
    tracing::info!("Found {} data file(s)", paths.len());
    for path in paths {
        tracing::info!("Loading: {}", path.display());
        let parsed = File::open(path)
            .map_err(anyhow::Error::from)
            .and_then(|f| {
                serde_json::from_reader::<_, serde_json::Value>(BufReader::new(f))
                    .map_err(anyhow::Error::from)
            });
        match parsed {
            Ok(serde_json::Value::Array(values)) => all_values.extend(values),
            Ok(value) => all_values.push(value),
            Err(e) => tracing::warn!("Error loading {}: {e}", path.display()),
        }
    }
    tracing::info!("Total records loaded: {}", all_values.len());
    all_values
}

/// Builds the polars frame for the CSV output. Tags become a JSON string since
/// CSV has no nested columns.
fn cleaned_frame(videos: &[CleanedVideo]) -> Result<DataFrame> {
    let n = videos.len();
    let mut video_id = Vec::with_capacity(n);
    let mut title = Vec::with_capacity(n);
    let mut description = Vec::with_capacity(n);
    let mut published_at = Vec::with_capacity(n);
    let mut channel_id = Vec::with_capacity(n);
    let mut channel_title = Vec::with_capacity(n);
    let mut view_count = Vec::with_capacity(n);
    let mut like_count = Vec::with_capacity(n);
    let mut comment_count = Vec::with_capacity(n);
    let mut tags = Vec::with_capacity(n);
    let mut category_id = Vec::with_capacity(n);
    let mut topic = Vec::with_capacity(n);
    let mut publication_year = Vec::with_capacity(n);
    let mut years_since_publication = Vec::with_capacity(n);
    let mut avg_views_per_year = Vec::with_capacity(n);
    let mut engagement_rate = Vec::with_capacity(n);
    let mut main_topic = Vec::with_capacity(n);
    for v in videos {
        video_id.push(v.video_id.as_str());
        title.push(v.title.as_str());
        description.push(v.description.as_str());
        published_at.push(v.published_at.as_str());
        channel_id.push(v.channel_id.as_str());
        channel_title.push(v.channel_title.as_str());
        view_count.push(v.view_count as i64);
        like_count.push(v.like_count as i64);
        comment_count.push(v.comment_count as i64);
        tags.push(serde_json::to_string(&v.tags)?);
        category_id.push(v.category_id.as_str());
        topic.push(v.topic.as_str());
        publication_year.push(v.publication_year);
        years_since_publication.push(v.years_since_publication);
        avg_views_per_year.push(v.avg_views_per_year);
        engagement_rate.push(v.engagement_rate);
        main_topic.push(v.main_topic.as_str());
    }

    let df = df![
        "video_id" => video_id,
        "title" => title,
        "description" => description,
        "published_at" => published_at,
        "channel_id" => channel_id,
        "channel_title" => channel_title,
        "view_count" => view_count,
        "like_count" => like_count,
        "comment_count" => comment_count,
        "tags" => tags,
        "category_id" => category_id,
        "topic" => topic,
        "publication_year" => publication_year,
        "years_since_publication" => years_since_publication,
        "avg_views_per_year" => avg_views_per_year,
        "engagement_rate" => engagement_rate,
        "main_topic" => main_topic,
    ]?;
    Ok(df)
}

/// Writes `<dir>/<name>.csv` and `<dir>/<name>.json`, returning both paths.
pub fn write_cleaned(dir: &Path, name: &str, videos: &[CleanedVideo]) -> Result<(PathBuf, PathBuf)> {
    create_dir_all(dir).with_context(|| format!("Creating directory {}", dir.display()))?;

    let csv_path = dir.join(format!("{name}.csv"));
    let mut frame = cleaned_frame(videos)?;
    let mut outf =
        File::create(&csv_path).with_context(|| format!("Creating {}", csv_path.display()))?;
    CsvWriter::new(&mut outf)
        .include_header(true)
        .with_separator(b',')
        .finish(&mut frame)
        .with_context(|| format!("Writing {}", csv_path.display()))?;

    let json_path = dir.join(format!("{name}.json"));
    write_json(&json_path, videos)?;

    Ok((csv_path, json_path))
}

fn str_column(df: &DataFrame, name: &str) -> PolarsResult<Vec<String>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

fn i64_column(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<i64>>> {
    let column = df.column(name)?.cast(&DataType::Int64)?;
    Ok(column.i64()?.into_iter().collect())
}

fn f64_column(df: &DataFrame, name: &str) -> PolarsResult<Vec<f64>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().map(|v| v.unwrap_or(0.0)).collect())
}

fn count(value: Option<i64>) -> u64 {
    value.unwrap_or(0).max(0) as u64
}

const TEXT_COLUMNS: [&str; 10] = [
    "video_id",
    "title",
    "description",
    "published_at",
    "channel_id",
    "channel_title",
    "tags",
    "category_id",
    "topic",
    "main_topic",
];
const INT_COLUMNS: [&str; 5] = [
    "view_count",
    "like_count",
    "comment_count",
    "publication_year",
    "years_since_publication",
];
const FLOAT_COLUMNS: [&str; 2] = ["avg_views_per_year", "engagement_rate"];

/// Column types of the cleaned CSV. Text columns are pinned so ids like
/// "007" or "05" are not inferred as numbers.
fn cleaned_schema() -> Schema {
    let mut schema = Schema::default();
    for name in TEXT_COLUMNS {
        schema.with_column(name.into(), DataType::String);
    }
    for name in INT_COLUMNS {
        schema.with_column(name.into(), DataType::Int64);
    }
    for name in FLOAT_COLUMNS {
        schema.with_column(name.into(), DataType::Float64);
    }
    schema
}

fn read_cleaned_csv(path: &Path) -> Result<Vec<CleanedVideo>> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_schema_overwrite(Some(Arc::new(cleaned_schema())))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let video_id = str_column(&df, "video_id")?;
    let title = str_column(&df, "title")?;
    let description = str_column(&df, "description")?;
    let published_at = str_column(&df, "published_at")?;
    let channel_id = str_column(&df, "channel_id")?;
    let channel_title = str_column(&df, "channel_title")?;
    let view_count = i64_column(&df, "view_count")?;
    let like_count = i64_column(&df, "like_count")?;
    let comment_count = i64_column(&df, "comment_count")?;
    let tags = str_column(&df, "tags")?;
    let category_id = str_column(&df, "category_id")?;
    let topic = str_column(&df, "topic")?;
    let publication_year = i64_column(&df, "publication_year")?;
    let years_since_publication = i64_column(&df, "years_since_publication")?;
    let avg_views_per_year = f64_column(&df, "avg_views_per_year")?;
    let engagement_rate = f64_column(&df, "engagement_rate")?;
    let main_topic = str_column(&df, "main_topic")?;

    let mut videos = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        // A row without a year can't be placed on any timeline.
        let Some(year) = publication_year[i] else {
            tracing::warn!("Skipping row {i} of {} without publication_year", path.display());
            continue;
        };
        videos.push(CleanedVideo {
            video_id: video_id[i].clone(),
            title: title[i].clone(),
            description: description[i].clone(),
            published_at: published_at[i].clone(),
            channel_id: channel_id[i].clone(),
            channel_title: channel_title[i].clone(),
            view_count: count(view_count[i]),
            like_count: count(like_count[i]),
            comment_count: count(comment_count[i]),
            tags: serde_json::from_str(&tags[i]).unwrap_or_default(),
            category_id: category_id[i].clone(),
            topic: topic[i].clone(),
            publication_year: year as i32,
            years_since_publication: years_since_publication[i].unwrap_or(1) as i32,
            avg_views_per_year: avg_views_per_year[i],
            engagement_rate: engagement_rate[i],
            main_topic: main_topic[i].clone(),
        });
    }
    Ok(videos)
}

/// Loads a cleaned table written by [`write_cleaned`], dispatching on the extension.
pub fn load_cleaned(path: &Path) -> Result<Vec<CleanedVideo>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("csv") => {
            read_cleaned_csv(path).with_context(|| format!("Reading {}", path.display()))
        }
        Some("json") => {
            let f = File::open(path).with_context(|| format!("Opening {}", path.display()))?;
            serde_json::from_reader(BufReader::new(f))
                .with_context(|| format!("Reading {}", path.display()))
        }
        _ => bail!("Unsupported cleaned data file: {}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn video(id: &str, year: i32) -> CleanedVideo {
        CleanedVideo {
            video_id: id.to_string(),
            title: format!("Video {id}, with a comma"),
            description: "Part one; \"quoted\" part two".to_string(),
            published_at: format!("{year}-06-01T00:00:00Z"),
            channel_id: "UC1".to_string(),
            channel_title: "Unknown".to_string(),
            view_count: 1000,
            like_count: 25,
            comment_count: 3,
            tags: vec!["rust".to_string(), "async".to_string()],
            category_id: "28".to_string(),
            topic: "rust tutorial".to_string(),
            publication_year: year,
            years_since_publication: 2,
            avg_views_per_year: 500.0,
            engagement_rate: 2.5,
            main_topic: "rust".to_string(),
        }
    }

    #[test]
    fn cleaned_table_reads_back_from_csv_and_json() {
        let dir = TempDir::new().unwrap();
        let videos = vec![video("a", 2024), video("b", 2025)];

        let (csv_path, json_path) = write_cleaned(dir.path(), "cleaned_test", &videos).unwrap();
        assert_eq!(csv_path.file_name().unwrap(), "cleaned_test.csv");

        assert_eq!(load_cleaned(&csv_path).unwrap(), videos);
        assert_eq!(load_cleaned(&json_path).unwrap(), videos);
    }

    #[test]
    fn numeric_looking_text_survives_csv() {
        let dir = TempDir::new().unwrap();
        let mut v = video("0012345", 2024);
        v.title = "007".to_string();
        v.description = "1.50".to_string();
        v.category_id = "05".to_string();
        v.topic = "2024 tutorial".to_string();
        v.main_topic = "2024".to_string();
        let videos = vec![v];

        let (csv_path, _) = write_cleaned(dir.path(), "numeric_text", &videos).unwrap();
        let reloaded = load_cleaned(&csv_path).unwrap();

        assert_eq!(reloaded[0].video_id, "0012345");
        assert_eq!(reloaded[0].title, "007");
        assert_eq!(reloaded[0].description, "1.50");
        assert_eq!(reloaded[0].category_id, "05");
        assert_eq!(reloaded, videos);
    }

    #[test]
    fn raw_loading_flattens_and_skips_bad_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.json"), r#"[{"video_id": "1"}, {"video_id": "2"}]"#)
            .unwrap();
        std::fs::write(dir.path().join("b.json"), r#"{"video_id": "3"}"#).unwrap();
        std::fs::write(dir.path().join("c.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let paths = resolve_raw_inputs(&InputSelection::AllIn(dir.path().to_path_buf())).unwrap();
        assert_eq!(paths.len(), 3);

        let values = load_raw_values(&paths);
        let ids: Vec<_> = values.iter().map(|v| v["video_id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn cleaned_input_prefers_csv() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cleaned.json"), "[]").unwrap();
        let selection = InputSelection::LatestIn(dir.path().to_path_buf());
        assert_eq!(
            resolve_cleaned_input(&selection).unwrap(),
            Some(dir.path().join("cleaned.json"))
        );

        std::fs::write(dir.path().join("cleaned.csv"), "video_id\n").unwrap();
        assert_eq!(
            resolve_cleaned_input(&selection).unwrap(),
            Some(dir.path().join("cleaned.csv"))
        );
    }

    #[test]
    fn newest_cleaned_file_wins() {
        let dir = TempDir::new().unwrap();
        let selection = InputSelection::LatestIn(dir.path().to_path_buf());
        // The newer file sorts first by name so only its timestamp can pick it.
        std::fs::write(dir.path().join("b_old.csv"), "video_id\n").unwrap();
        std::fs::write(dir.path().join("b_old.json"), "[]").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        std::fs::write(dir.path().join("a_new.csv"), "video_id\n").unwrap();
        std::fs::write(dir.path().join("a_new.json"), "[]").unwrap();

        assert_eq!(
            resolve_cleaned_input(&selection).unwrap(),
            Some(dir.path().join("a_new.csv"))
        );

        std::fs::remove_file(dir.path().join("a_new.csv")).unwrap();
        std::fs::remove_file(dir.path().join("b_old.csv")).unwrap();
        assert_eq!(
            resolve_cleaned_input(&selection).unwrap(),
            Some(dir.path().join("a_new.json"))
        );
    }

    #[test]
    fn missing_directory_has_no_inputs() {
        let selection = InputSelection::LatestIn(PathBuf::from("/nonexistent/processed"));
        assert_eq!(resolve_cleaned_input(&selection).unwrap(), None);
        assert!(resolve_raw_inputs(&InputSelection::AllIn(PathBuf::from("/nonexistent/raw")))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn file_names_carry_prefix() {
        assert!(raw_file_name(false).starts_with("youtube_data_2"));
        assert!(raw_file_name(true).starts_with("youtube_data_final_"));
        assert!(cleaned_base_name().starts_with("cleaned_youtube_data_"));
    }
}
