//! Persistence for cached series: an in-memory store and a Parquet store.
//!
//! Parquet layout: `{root}/source={SOURCE}/symbol={SYMBOL}/{TF}.parquet`
//! with a `{TF}.meta.json` sidecar holding the coverage bounds.
//!
//! The table and its sidecar are one unit:
//! - Writes go to `.tmp` files and are renamed into place, table first.
//! - The sidecar records the bar count and a blake3 hash of the bars, so a
//!   torn write (new table, old sidecar) is detected on load.
//! - Exactly one of the two files present is corruption, not a cache miss.

use super::provider::DataError;
use super::reconcile::Coverage;
use crate::domain::{Bar, Timeframe};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Identity of one cached series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub source: String,
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(source: impl Into<String>, symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            source: source.into(),
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.source, self.symbol, self.timeframe)
    }
}

/// The persisted pair for one key: the bar table and its coverage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CachedSeries {
    pub bars: Vec<Bar>,
    pub coverage: Coverage<i64>,
}

/// Storage backend for [`super::cache::TimeSeriesCache`].
///
/// `put` must store the bars and coverage together; a store never exposes one
/// without the other.
pub trait CacheStore: Send {
    fn get(&self, key: &SeriesKey) -> Result<Option<CachedSeries>, DataError>;

    fn put(&mut self, key: &SeriesKey, series: &CachedSeries) -> Result<(), DataError>;

    /// Every key with persisted data.
    fn keys(&self) -> Result<Vec<SeriesKey>, DataError>;
}

/// HashMap-backed store; contents live as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    series: HashMap<SeriesKey, CachedSeries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &SeriesKey) -> Result<Option<CachedSeries>, DataError> {
        Ok(self.series.get(key).cloned())
    }

    fn put(&mut self, key: &SeriesKey, series: &CachedSeries) -> Result<(), DataError> {
        self.series.insert(key.clone(), series.clone());
        Ok(())
    }

    fn keys(&self) -> Result<Vec<SeriesKey>, DataError> {
        let mut keys: Vec<SeriesKey> = self.series.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// Metadata sidecar for a cached series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub source: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub coverage: Vec<i64>,
    pub bar_count: usize,
    pub data_hash: String,
    pub written_at: chrono::NaiveDateTime,
}

/// File-backed store using Hive-style directories.
pub struct ParquetStore {
    root: PathBuf,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/source={SOURCE}/symbol={SYMBOL}/`, with `/` in pair symbols replaced by `-`.
    fn series_dir(&self, key: &SeriesKey) -> PathBuf {
        self.root
            .join(format!("source={}", key.source))
            .join(format!("symbol={}", key.symbol.replace('/', "-")))
    }

    fn table_path(&self, key: &SeriesKey) -> PathBuf {
        self.series_dir(key).join(format!("{}.parquet", key.timeframe))
    }

    fn meta_path(&self, key: &SeriesKey) -> PathBuf {
        self.series_dir(key).join(format!("{}.meta.json", key.timeframe))
    }

    pub fn read_meta(&self, key: &SeriesKey) -> Result<Option<SeriesMeta>, DataError> {
        let path = self.meta_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| DataError::Io(format!("read meta: {e}")))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| corruption(key, format!("unreadable sidecar: {e}")))
    }
}

impl CacheStore for ParquetStore {
    fn get(&self, key: &SeriesKey) -> Result<Option<CachedSeries>, DataError> {
        let table_path = self.table_path(key);
        let has_table = table_path.exists();
        let meta = self.read_meta(key)?;

        let meta = match (has_table, meta) {
            (false, None) => return Ok(None),
            (true, None) => {
                warn!(%key, "cached table has no coverage sidecar");
                return Err(corruption(key, "table present without coverage sidecar"));
            }
            (false, Some(_)) => {
                warn!(%key, "coverage sidecar has no table");
                return Err(corruption(key, "coverage sidecar present without table"));
            }
            (true, Some(meta)) => meta,
        };

        let bars = read_parquet(&table_path).map_err(|e| corruption(key, e.to_string()))?;

        if bars.len() != meta.bar_count {
            return Err(corruption(
                key,
                format!("sidecar expects {} bars, table has {}", meta.bar_count, bars.len()),
            ));
        }
        if hash_bars(&bars)? != meta.data_hash {
            return Err(corruption(key, "table hash does not match sidecar"));
        }
        if bars.windows(2).any(|w| w[0].open_time >= w[1].open_time) {
            return Err(corruption(key, "table is not strictly sorted by open_time"));
        }
        let coverage = Coverage::from_bounds(meta.coverage)
            .map_err(|e| corruption(key, format!("invalid coverage: {e}")))?;

        debug!(%key, bars = bars.len(), spans = coverage.len(), "loaded cached series");
        Ok(Some(CachedSeries { bars, coverage }))
    }

    fn put(&mut self, key: &SeriesKey, series: &CachedSeries) -> Result<(), DataError> {
        let dir = self.series_dir(key);
        fs::create_dir_all(&dir).map_err(|e| DataError::Io(format!("failed to create dir: {e}")))?;

        let meta = SeriesMeta {
            source: key.source.clone(),
            symbol: key.symbol.clone(),
            timeframe: key.timeframe.clone(),
            coverage: series.coverage.bounds().to_vec(),
            bar_count: series.bars.len(),
            data_hash: hash_bars(&series.bars)?,
            written_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::Serialization(format!("meta serialization: {e}")))?;

        let table_path = self.table_path(key);
        let meta_path = self.meta_path(key);
        let table_tmp = table_path.with_extension("parquet.tmp");
        let meta_tmp = meta_path.with_extension("json.tmp");

        write_parquet(&bars_to_dataframe(&series.bars)?, &table_tmp)?;
        fs::write(&meta_tmp, meta_json).map_err(|e| {
            let _ = fs::remove_file(&table_tmp);
            DataError::Io(format!("meta write: {e}"))
        })?;

        for (tmp, path) in [(&table_tmp, &table_path), (&meta_tmp, &meta_path)] {
            fs::rename(tmp, path).map_err(|e| {
                let _ = fs::remove_file(tmp);
                DataError::Io(format!("atomic rename failed: {e}"))
            })?;
        }

        debug!(%key, bars = series.bars.len(), "persisted cached series");
        Ok(())
    }

    fn keys(&self) -> Result<Vec<SeriesKey>, DataError> {
        let mut keys = Vec::new();
        if !self.root.exists() {
            return Ok(keys);
        }
        for source_dir in list_dirs(&self.root, "source=")? {
            for symbol_dir in list_dirs(&source_dir.0, "symbol=")? {
                let entries = fs::read_dir(&symbol_dir.0)
                    .map_err(|e| DataError::Io(format!("read dir: {e}")))?;
                for entry in entries {
                    let path = entry.map_err(|e| DataError::Io(format!("dir entry: {e}")))?.path();
                    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                        continue;
                    };
                    let Some(tf) = file_name.strip_suffix(".parquet") else {
                        continue;
                    };
                    let Ok(timeframe) = tf.parse::<Timeframe>() else {
                        warn!(path = %path.display(), "skipping table with unparseable timeframe");
                        continue;
                    };
                    let mut key = SeriesKey::new(&source_dir.1, &symbol_dir.1, timeframe);
                    // The sidecar keeps the unsanitized symbol.
                    if let Ok(Some(meta)) = self.read_meta(&key) {
                        key.symbol = meta.symbol;
                    }
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn corruption(key: &SeriesKey, reason: impl Into<String>) -> DataError {
    DataError::CacheCorruption {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Subdirectories named `{prefix}{value}`, as `(path, value)`.
fn list_dirs(dir: &Path, prefix: &str) -> Result<Vec<(PathBuf, String)>, DataError> {
    let mut out = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| DataError::Io(format!("read dir: {e}")))?;
    for entry in entries {
        let path = entry.map_err(|e| DataError::Io(format!("dir entry: {e}")))?.path();
        if !path.is_dir() {
            continue;
        }
        let value = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(prefix))
            .map(str::to_string);
        if let Some(value) = value {
            out.push((path, value));
        }
    }
    Ok(out)
}

fn hash_bars(bars: &[Bar]) -> Result<String, DataError> {
    let bytes = serde_json::to_vec(bars)
        .map_err(|e| DataError::Serialization(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn bars_to_dataframe(bars: &[Bar]) -> Result<DataFrame, DataError> {
    let times: Vec<i64> = bars.iter().map(|b| b.open_time).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new("open_time".into(), times),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| DataError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), DataError> {
    let file = fs::File::create(path).map_err(|e| DataError::Parquet(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| DataError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

fn read_parquet(path: &Path) -> Result<Vec<Bar>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::Parquet(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::Parquet(format!("read: {e}")))?;

    let column_err = |name: &str, e: PolarsError| DataError::Parquet(format!("{name} column: {e}"));
    let float_column = |name: &str| -> Result<Vec<f64>, DataError> {
        let ca = df
            .column(name)
            .map_err(|e| column_err(name, e))?
            .f64()
            .map_err(|e| column_err(name, e))?;
        Ok(ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    };

    let times = df
        .column("open_time")
        .map_err(|e| column_err("open_time", e))?
        .i64()
        .map_err(|e| column_err("open_time", e))?;
    let opens = float_column("open")?;
    let highs = float_column("high")?;
    let lows = float_column("low")?;
    let closes = float_column("close")?;
    let volumes = float_column("volume")?;

    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let open_time = times
            .get(i)
            .ok_or_else(|| DataError::Parquet(format!("null open_time at row {i}")))?;
        bars.push(Bar {
            open_time,
            open: opens[i],
            high: highs[i],
            low: lows[i],
            close: closes[i],
            volume: volumes[i],
        });
    }
    Ok(bars)
}
