/*
 * Pipeline:
 *  Stage 1. collect  - page through search results for every topic, fetch
 *                      statistics for new ids, snapshot raw JSON after each topic
 *  Stage 2. clean    - merge raw snapshots, dedup by id, derive year and
 *                      engagement columns, keep the recent window, write CSV+JSON
 *  Stage 3. analyze  - grouped counts, engagement means, growth, charts, report
 *
 * Each stage reads what the previous one wrote to disk, so they can be run
 * one at a time or back to back with `run`.
 */

mod analyze;
mod charts;
mod clean;
mod collect;
mod config;
mod models;
mod report;
mod storage;
mod youtube;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Datelike;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::storage::InputSelection;
use crate::youtube::YouTubeClient;

#[derive(Parser)]
#[command(version, about = "Collect, clean and analyze YouTube tutorial trends")]
struct Cli {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: CliCmd,
}

#[derive(Subcommand)]
enum CliCmd {
    /// Query the search API for every topic and save raw JSON snapshots
    Collect {
        /// Topic to search for instead of the configured list (repeatable)
        #[arg(long)]
        topic: Vec<String>,
    },
    /// Merge raw snapshots into the cleaned CSV and JSON table
    Clean {
        /// Raw JSON file to read instead of every file in the raw directory (repeatable)
        #[arg(long)]
        input: Vec<PathBuf>,
        /// Base name for the output files, without extension
        #[arg(long)]
        name: Option<String>,
    },
    /// Analyze a cleaned table, render charts and write the report
    Analyze {
        /// Cleaned CSV or JSON file. Defaults to the newest one.
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Run collect, clean and analyze in sequence
    Run,
}

async fn collect(config: &Config) -> Result<()> {
    // Fail before any network traffic when the key is missing.
    let api_key = config::api_key()?;
    let client = YouTubeClient::new(api_key, config.collection.api_base.clone());
    let (videos, path) = collect::collect_all(&client, config).await?;
    info!("Collected {} records into {}", videos.len(), path.display());
    Ok(())
}

fn clean(config: &Config, input: Vec<PathBuf>, name: Option<String>) -> Result<()> {
    let selection = if input.is_empty() {
        InputSelection::AllIn(config.storage.raw_dir.clone())
    } else {
        InputSelection::Paths(input)
    };
    let current_year = chrono::Local::now().year();
    clean::run(config, &selection, name, current_year)?;
    Ok(())
}

fn analyze(config: &Config, input: Option<PathBuf>) -> Result<()> {
    let selection = match input {
        Some(path) => InputSelection::Paths(vec![path]),
        None => InputSelection::LatestIn(config.storage.processed_dir.clone()),
    };
    analyze::run(config, &selection)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Installing tracing subscriber")?;

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.cmd {
        CliCmd::Collect { topic } => {
            if !topic.is_empty() {
                config.topics = topic;
            }
            collect(&config).await?;
        }
        CliCmd::Clean { input, name } => clean(&config, input, name)?,
        CliCmd::Analyze { input } => analyze(&config, input)?,
        CliCmd::Run => {
            collect(&config).await?;
            clean(&config, Vec::new(), None)?;
            analyze(&config, None)?;
        }
    }
    Ok(())
}
