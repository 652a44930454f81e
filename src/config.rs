use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const API_KEY_VAR: &str = "YOUTUBE_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YOUTUBE_API_KEY not found. Set it in the environment or in a .env file.")]
    MissingApiKey,
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Search keywords, one collection unit each
    pub topics: Vec<String>,
    pub collection: CollectionConfig,
    pub storage: StorageConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Page size for search calls. The API caps this at 50.
    pub max_results_per_query: u32,
    pub max_queries_per_topic: u32,
    /// RFC 3339 lower bound on publication time, passed as `publishedAfter`
    pub published_after: Option<String>,
    pub language: String,
    /// One of relevance, viewCount, rating, date
    pub order: String,
    pub page_pause_ms: u64,
    pub topic_pause_ms: u64,
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub results_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Trailing number of years kept by the cleaner
    pub window_years: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topics: [
                "cybersecurity tutorial",
                "machine learning tutorial",
                "cloud computing tutorial",
                "python programming tutorial",
                "web development tutorial",
                "data science tutorial",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            collection: CollectionConfig::default(),
            storage: StorageConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            max_results_per_query: 50,
            max_queries_per_topic: 10,
            published_after: Some("2019-01-01T00:00:00Z".to_string()),
            language: "en".to_string(),
            order: "relevance".to_string(),
            page_pause_ms: 100,
            topic_pause_ms: 1000,
            api_base: "https://www.googleapis.com/youtube/v3".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            results_dir: PathBuf::from("results"),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { window_years: 5 }
    }
}

impl CollectionConfig {
    pub fn page_pause(&self) -> Duration {
        Duration::from_millis(self.page_pause_ms)
    }

    pub fn topic_pause(&self) -> Duration {
        Duration::from_millis(self.topic_pause_ms)
    }
}

impl Config {
    /// Loads the TOML file at `path`, or the built-in defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let buf = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                let config: Config = toml::from_str(&buf).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
                tracing::info!("Loaded configuration from {}", path.display());
                config
            }
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let per_query = self.collection.max_results_per_query;
        if !(1..=50).contains(&per_query) {
            return Err(ConfigError::Invalid(format!(
                "max_results_per_query must be within 1..=50, got {per_query}"
            )));
        }
        if self.collection.max_queries_per_topic == 0 {
            return Err(ConfigError::Invalid(
                "max_queries_per_topic must be greater than 0".to_string(),
            ));
        }
        if self.analysis.window_years < 0 {
            return Err(ConfigError::Invalid(
                "window_years must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reads the API key, honoring a `.env` file in the working directory.
pub fn api_key() -> Result<String, ConfigError> {
    dotenv::dotenv().ok();
    key_from(std::env::var(API_KEY_VAR).ok())
}

fn key_from(value: Option<String>) -> Result<String, ConfigError> {
    match value {
        Some(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(ConfigError::MissingApiKey),
    }
}
