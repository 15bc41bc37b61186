//! TOML simulation configuration.
//!
//! ```toml
//! source = "synthetic"
//! symbol = "BTC/USDT"
//! timeframe = "1h"
//! start = "2024-01-01"
//! train_end = "2024-02-01"
//! test_end = 1_709_251_200_000
//! window = 48
//!
//! [data]
//! cache_dir = "cache"
//!
//! [pipeline]
//! name = "signals"
//! children = [{ kind = "moving_average", periods = 20 }, { kind = "rsi" }]
//! ```

use super::SimulationError;
use crate::domain::Timeframe;
use crate::pipeline::PipelineSpec;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_WINDOW: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Name of the registered data provider.
    pub source: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start: TimePoint,
    pub train_end: TimePoint,
    pub test_end: TimePoint,

    /// Records kept in the rolling history.
    #[serde(default = "default_window")]
    pub window: usize,

    /// Join raw OHLCV columns onto factor columns.
    #[serde(default = "default_true")]
    pub join_ohlcv: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineSpec>,

    #[serde(default)]
    pub data: DataConfig,
}

/// Where the cache lives and how the offline providers are set up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Directory for the `csv` source, if used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_dir: Option<PathBuf>,

    /// Seed for the `synthetic` source.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            csv_dir: None,
            seed: default_seed(),
        }
    }
}

fn default_window() -> usize {
    DEFAULT_WINDOW
}

fn default_true() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_seed() -> u64 {
    42
}

impl SimulationConfig {
    pub fn load(path: &Path) -> Result<Self, SimulationError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SimulationError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, SimulationError> {
        let config: Self =
            toml::from_str(text).map_err(|e| SimulationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// `start < train_end < test_end` and a non-empty window.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let (start, train_end, test_end) = self.range()?;
        if !(start < train_end && train_end < test_end) {
            return Err(SimulationError::Config(format!(
                "need start < train_end < test_end, got {start}, {train_end}, {test_end}"
            )));
        }
        if self.window == 0 {
            return Err(SimulationError::Config("window must be >= 1".into()));
        }
        Ok(())
    }

    /// `(start, train_end, test_end)` in epoch milliseconds.
    pub fn range(&self) -> Result<(i64, i64, i64), SimulationError> {
        Ok((
            self.start.to_millis()?,
            self.train_end.to_millis()?,
            self.test_end.to_millis()?,
        ))
    }
}

/// A point in time: epoch milliseconds or a UTC date/datetime string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimePoint {
    Millis(i64),
    Text(String),
}

impl TimePoint {
    /// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and
    /// `YYYY-MM-DD` (midnight UTC).
    pub fn to_millis(&self) -> Result<i64, SimulationError> {
        let text = match self {
            TimePoint::Millis(ms) => return Ok(*ms),
            TimePoint::Text(text) => text.trim(),
        };
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Ok(dt.timestamp_millis());
        }
        for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
                return Ok(dt.and_utc().timestamp_millis());
            }
        }
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().timestamp_millis())
            .ok_or_else(|| SimulationError::Config(format!("unrecognized time point '{text}'")))
    }
}

impl From<i64> for TimePoint {
    fn from(ms: i64) -> Self {
        TimePoint::Millis(ms)
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimePoint::Millis(ms) => write!(f, "{ms}"),
            TimePoint::Text(text) => f.write_str(text),
        }
    }
}
