//! FactorLab CLI: fetch, simulate, and cache inspection commands.
//!
//! Commands:
//! - `fetch` fills the Parquet cache for one series, asking the source only for gaps
//! - `simulate` runs a train/test walk from a TOML config file
//! - `cache status` reports every cached series with its coverage

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use factorlab_core::data::{CsvProvider, ParquetStore, SeriesKey, SyntheticProvider, TimeSeriesCache};
use factorlab_core::domain::Timeframe;
use factorlab_core::simulation::{DataConfig, Record, SimulationConfig, SimulationDriver, TimePoint};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "factorlab", about = "FactorLab CLI: cached market series and streaming factors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one series into the cache, requesting only what is missing.
    Fetch {
        /// Data source: synthetic or csv.
        #[arg(long, default_value = "synthetic")]
        source: String,

        /// Symbol, e.g. BTC/USDT or SPY.
        #[arg(long)]
        symbol: String,

        /// Bar width, e.g. 1m, 4h, 1d.
        #[arg(long, default_value = "1d")]
        timeframe: String,

        /// Range start: epoch milliseconds or YYYY-MM-DD[ HH:MM:SS].
        #[arg(long)]
        start: String,

        /// Range end (inclusive), same formats as --start.
        #[arg(long)]
        end: String,

        /// Cache directory. Defaults to ./cache.
        #[arg(long, default_value = "cache")]
        cache_dir: PathBuf,

        /// Directory of `{SYMBOL}-{TF}.csv` files for the csv source.
        #[arg(long)]
        csv_dir: Option<PathBuf>,

        /// Seed for the synthetic source.
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Run a train/test simulation from a TOML config file.
    Simulate {
        /// Path to the simulation config.
        #[arg(long)]
        config: PathBuf,

        /// Override the config's cache directory.
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Print the newest record of every streamed snapshot as a JSON line.
        #[arg(long, default_value_t = false)]
        emit: bool,
    },
    /// Cache inspection commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached series with bar counts and coverage.
    Status {
        /// Cache directory. Defaults to ./cache.
        #[arg(long, default_value = "cache")]
        cache_dir: PathBuf,

        /// Print the status as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "factorlab_core=info,factorlab_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            source,
            symbol,
            timeframe,
            start,
            end,
            cache_dir,
            csv_dir,
            seed,
        } => {
            let data = DataConfig {
                cache_dir,
                csv_dir,
                seed,
            };
            run_fetch(&data, &source, &symbol, &timeframe, &start, &end)
        }
        Commands::Simulate {
            config,
            cache_dir,
            emit,
        } => run_simulate(&config, cache_dir, emit),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir, json } => run_cache_status(&cache_dir, json),
        },
    }
}

/// Cache over `data.cache_dir` with the offline sources registered.
fn build_cache(data: &DataConfig) -> TimeSeriesCache {
    let mut cache = TimeSeriesCache::new(ParquetStore::new(&data.cache_dir))
        .with_provider(SyntheticProvider::new(data.seed));
    if let Some(dir) = &data.csv_dir {
        cache.register(Box::new(CsvProvider::new(dir)));
    }
    cache
}

fn parse_time(text: &str) -> Result<i64> {
    let point = match text.parse::<i64>() {
        Ok(millis) => TimePoint::Millis(millis),
        Err(_) => TimePoint::Text(text.to_string()),
    };
    point
        .to_millis()
        .with_context(|| format!("invalid time '{text}'"))
}

fn run_fetch(
    data: &DataConfig,
    source: &str,
    symbol: &str,
    timeframe: &str,
    start: &str,
    end: &str,
) -> Result<()> {
    if source == "csv" && data.csv_dir.is_none() {
        bail!("--csv-dir is required with --source csv");
    }
    let timeframe: Timeframe = timeframe.parse()?;
    let start = parse_time(start)?;
    let end = parse_time(end)?;

    let mut cache = build_cache(data);
    let key = SeriesKey::new(source, symbol, timeframe);
    let bars = cache
        .fetch(&key, start, end)
        .with_context(|| format!("fetching {key}"))?;
    let report = cache.last_report();

    println!("Series:   {key}");
    println!("Range:    {} to {}", format_time(start), format_time(end));
    println!("Bars:     {}", bars.len());
    println!(
        "Fetched:  {} bar(s) over {} gap(s){}",
        report.fetched_bars,
        report.gaps,
        if report.persisted { ", cache updated" } else { "" }
    );
    Ok(())
}

fn run_simulate(config_path: &Path, cache_dir: Option<PathBuf>, emit: bool) -> Result<()> {
    let mut config = SimulationConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(dir) = cache_dir {
        config.data.cache_dir = dir;
    }

    let cache = build_cache(&config.data);
    let mut driver = SimulationDriver::from_config(&config, cache)?;

    let trained = driver.train().context("training phase")?;
    let columns = trained.first().map_or(0, |r| r.fields.len());
    info!(rows = trained.len(), columns, "trained");

    let mut steps = 0usize;
    let mut newest: Option<Record> = None;
    for snapshot in driver.test().context("starting test phase")? {
        let mut snapshot = snapshot.context("streaming test phase")?;
        steps += 1;
        newest = snapshot.pop();
        if emit {
            if let Some(record) = &newest {
                println!("{}", serde_json::to_string(record)?);
            }
        }
    }

    if !emit {
        print_summary(&config, trained.len(), steps, newest.as_ref());
    }
    Ok(())
}

fn print_summary(config: &SimulationConfig, trained: usize, steps: usize, newest: Option<&Record>) {
    println!();
    println!("=== Simulation ===");
    println!("Series:   {}/{}/{}", config.source, config.symbol, config.timeframe);
    println!("Train:    {} to {} ({trained} rows)", config.start, config.train_end);
    println!("Test:     {} to {} ({steps} steps)", config.train_end, config.test_end);
    println!("Window:   {}", config.window);
    if let Some(record) = newest {
        println!();
        println!("--- Last record ({}) ---", format_time(record.open_time));
        for (column, value) in &record.fields {
            println!("{column:<32} {value:>14.6}");
        }
    }
    println!();
}

fn run_cache_status(cache_dir: &Path, json: bool) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let cache = TimeSeriesCache::new(ParquetStore::new(cache_dir));
    let status = cache
        .status()
        .with_context(|| format!("reading cache at {}", cache_dir.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    if status.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    println!("Cache: {}", cache_dir.display());
    println!("Series: {}", status.len());
    println!();
    println!(
        "{:<12} {:<12} {:<6} {:>8} {:<41} {:>6}",
        "Source", "Symbol", "TF", "Bars", "Range", "Spans"
    );
    println!("{}", "-".repeat(90));
    for entry in &status {
        let range = match (entry.first_open_time, entry.last_open_time) {
            (Some(first), Some(last)) => format!("{} to {}", format_time(first), format_time(last)),
            _ => "(empty)".into(),
        };
        println!(
            "{:<12} {:<12} {:<6} {:>8} {:<41} {:>6}",
            entry.key.source,
            entry.key.symbol,
            entry.key.timeframe,
            entry.bar_count,
            range,
            entry.coverage.len() / 2
        );
    }
    Ok(())
}

fn format_time(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}
