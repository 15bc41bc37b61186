//! CSV import provider.
//!
//! Reads `{dir}/{SYMBOL}-{TIMEFRAME}.csv` files with the header
//! `open_time,open,high,low,close,volume` and serves the requested range.

use super::provider::{DataError, DataProvider};
use crate::domain::{Bar, Timeframe};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct CsvProvider {
    dir: PathBuf,
    name: String,
}

impl CsvProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            name: "csv".to_string(),
        }
    }

    /// Register under a different source name (e.g. the exchange the files came from).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `symbol` at `timeframe`. `/` in pair symbols becomes `-`.
    pub fn file_path(&self, symbol: &str, timeframe: &Timeframe) -> PathBuf {
        self.dir
            .join(format!("{}-{timeframe}.csv", symbol.replace('/', "-")))
    }
}

impl DataProvider for CsvProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        start: i64,
        end: i64,
    ) -> Result<Vec<Bar>, DataError> {
        let path = self.file_path(symbol, timeframe);
        let fail = |message: String| DataError::fetch(&self.name, symbol, start, end, message);

        let mut reader = csv::Reader::from_path(&path)
            .map_err(|e| fail(format!("open {}: {e}", path.display())))?;

        let mut bars = Vec::new();
        for (line, record) in reader.deserialize::<Bar>().enumerate() {
            let bar = record.map_err(|e| fail(format!("row {}: {e}", line + 1)))?;
            if start <= bar.open_time && bar.open_time <= end {
                bars.push(bar);
            }
        }
        bars.sort_by_key(|b| b.open_time);

        debug!(
            source = %self.name,
            symbol,
            start,
            end,
            rows = bars.len(),
            "csv fetch"
        );
        Ok(bars)
    }
}

/// Write bars as a CSV file readable by [`CsvProvider`].
pub fn write_csv(path: &Path, bars: &[Bar]) -> Result<(), DataError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| DataError::Csv(e.to_string()))?;
    for bar in bars {
        writer
            .serialize(bar)
            .map_err(|e| DataError::Csv(e.to_string()))?;
    }
    writer.flush().map_err(|e| DataError::Io(e.to_string()))?;
    Ok(())
}
