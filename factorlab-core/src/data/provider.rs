//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over the fetch collaborator (exchange
//! client, CSV import, synthetic generator) so the cache can be exercised
//! without a network and mocked in tests.

use crate::domain::{Bar, Timeframe};
use thiserror::Error;

use super::reconcile::IntervalError;

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error(transparent)]
    InvalidInterval(#[from] IntervalError),

    #[error("fetch from '{source_name}' failed for {symbol} [{start}, {end}]: {message}")]
    Fetch {
        source_name: String,
        symbol: String,
        start: i64,
        end: i64,
        message: String,
    },

    #[error("cache corruption for {key}: {reason}")]
    CacheCorruption { key: String, reason: String },

    #[error("no provider registered for source '{0}'")]
    UnknownSource(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("validation error: {0}")]
    Validation(String),
}

impl DataError {
    /// Build a `Fetch` error from inside a provider.
    pub fn fetch(
        source_name: &str,
        symbol: &str,
        start: i64,
        end: i64,
        message: impl Into<String>,
    ) -> Self {
        DataError::Fetch {
            source_name: source_name.to_string(),
            symbol: symbol.to_string(),
            start,
            end,
            message: message.into(),
        }
    }

    /// True for errors that must not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DataError::CacheCorruption { .. })
    }
}

/// The fetch collaborator.
///
/// Implementations return bars with `start <= open_time <= end`. They may
/// return fewer bars than the span implies (no data yet at the tail) or none,
/// and must be safe to call again for the same range.
/// The cache layer sits above this trait: providers don't know about the cache.
pub trait DataProvider: Send + Sync {
    /// Source name; also the first component of every cache key it fills.
    fn name(&self) -> &str;

    /// Fetch bars for `symbol` over the closed range `[start, end]` (ms).
    fn fetch(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        start: i64,
        end: i64,
    ) -> Result<Vec<Bar>, DataError>;
}
