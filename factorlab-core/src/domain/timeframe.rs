//! Bar timeframes such as `1m`, `4h` or `1d`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MINUTE_MS: i64 = 60_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeframeError {
    #[error("invalid timeframe '{0}': expected <count><unit> with unit one of s, m, h, d, w")]
    Invalid(String),
}

/// A bar width, kept in its textual form so cache keys stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    label: String,
    millis: i64,
}

impl Timeframe {
    pub fn as_str(&self) -> &str {
        &self.label
    }

    /// Width of one bar in milliseconds.
    pub fn as_millis(&self) -> i64 {
        self.millis
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TimeframeError::Invalid(s.to_string());
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        let (count, unit) = s.split_at(split);
        let count: i64 = count.parse().map_err(|_| invalid())?;
        if count <= 0 {
            return Err(invalid());
        }
        let unit_ms = match unit {
            "s" => 1_000,
            "m" => MINUTE_MS,
            "h" => 60 * MINUTE_MS,
            "d" => 24 * 60 * MINUTE_MS,
            "w" => 7 * 24 * 60 * MINUTE_MS,
            _ => return Err(invalid()),
        };
        let millis = count.checked_mul(unit_ms).ok_or_else(invalid)?;
        Ok(Self {
            label: s.to_string(),
            millis,
        })
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TimeframeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.label
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}
