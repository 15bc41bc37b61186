//! Interval-reconciling series cache.
//!
//! For each `(source, symbol, timeframe)` the cache keeps one sorted,
//! deduplicated bar table plus the coverage already fetched. A request only
//! goes to the provider for the gaps the reconciler reports; the results are
//! merged into the table and both are persisted together before returning.
//!
//! Coverage follows the extent of the data actually held: its outer bounds
//! are clamped to the first and last bar (never inside what was already
//! recorded). On a first fetch this records `[min, max]` of the returned bars
//! rather than the requested bounds, and a request running past the tail of
//! the available data leaves that tail uncovered so it is asked for again.
//! A span whose data is a single bar cannot shrink to a point; it keeps the
//! requested bounds so every stored bar stays covered.

use super::provider::{DataError, DataProvider};
use super::reconcile::{reconcile, Coverage, Interval};
use super::store::{CacheStore, CachedSeries, SeriesKey};
use crate::domain::{Bar, Timeframe};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Summary of what one `fetch` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub gaps: usize,
    pub fetched_bars: usize,
    pub persisted: bool,
}

/// Per-key cache status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub key: SeriesKey,
    pub bar_count: usize,
    pub coverage: Vec<i64>,
    pub first_open_time: Option<i64>,
    pub last_open_time: Option<i64>,
}

pub struct TimeSeriesCache {
    store: Box<dyn CacheStore>,
    providers: HashMap<String, Box<dyn DataProvider>>,
    last_report: FetchReport,
}

impl TimeSeriesCache {
    pub fn new(store: impl CacheStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            providers: HashMap::new(),
            last_report: FetchReport::default(),
        }
    }

    /// Register a fetch collaborator under its `name()`.
    pub fn with_provider(mut self, provider: impl DataProvider + 'static) -> Self {
        self.register(Box::new(provider));
        self
    }

    pub fn register(&mut self, provider: Box<dyn DataProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Report of the most recent `fetch`.
    pub fn last_report(&self) -> &FetchReport {
        &self.last_report
    }

    /// Bars of `key` with `start <= open_time <= end`, fetching only what is missing.
    ///
    /// Takes `&mut self`: at most one reconciliation per cache is in flight.
    pub fn fetch(&mut self, key: &SeriesKey, start: i64, end: i64) -> Result<Vec<Bar>, DataError> {
        let request = Interval::new(start, end)?;
        let provider = self
            .providers
            .get(&key.source)
            .ok_or_else(|| DataError::UnknownSource(key.source.clone()))?;

        let existing = self.store.get(key)?.unwrap_or_default();
        let plan = reconcile(request, &existing.coverage)?;
        self.last_report = FetchReport {
            gaps: plan.to_fetch.len(),
            ..FetchReport::default()
        };

        if plan.to_fetch.is_empty() {
            debug!(%key, start, end, "request fully covered");
            return Ok(slice_range(&existing.bars, start, end));
        }

        // All gaps must succeed before anything is merged or written.
        let mut fetched = Vec::new();
        for gap in &plan.to_fetch {
            debug!(%key, start = gap.start, end = gap.end, "fetching gap");
            let bars = provider.fetch(&key.symbol, &key.timeframe, gap.start, gap.end)?;
            fetched.extend(bars);
        }
        self.last_report.fetched_bars = fetched.len();

        let previous_len = existing.bars.len();
        let merged = merge_bars(existing.bars, fetched);
        let (Some(first), Some(last)) = (merged.first(), merged.last()) else {
            debug!(%key, "no data in range, nothing persisted");
            return Ok(Vec::new());
        };

        let lo = existing.coverage.first().map_or(first.open_time, |b| b.min(first.open_time));
        let hi = existing.coverage.last().map_or(last.open_time, |b| b.max(last.open_time));
        let coverage = plan.coverage.clamp(lo, hi);

        let series = CachedSeries {
            bars: merged,
            coverage,
        };
        self.store.put(key, &series)?;
        self.last_report.persisted = true;

        info!(
            %key,
            gaps = plan.to_fetch.len(),
            new_bars = series.bars.len() - previous_len,
            total_bars = series.bars.len(),
            "cache updated"
        );
        Ok(slice_range(&series.bars, start, end))
    }

    /// Convenience wrapper building the key from its parts.
    pub fn fetch_series(
        &mut self,
        source: &str,
        symbol: &str,
        timeframe: &Timeframe,
        start: i64,
        end: i64,
    ) -> Result<Vec<Bar>, DataError> {
        let key = SeriesKey::new(source, symbol, timeframe.clone());
        self.fetch(&key, start, end)
    }

    /// Recorded coverage for `key` (empty if never fetched).
    pub fn coverage(&self, key: &SeriesKey) -> Result<Coverage<i64>, DataError> {
        Ok(self.store.get(key)?.map(|s| s.coverage).unwrap_or_default())
    }

    pub fn status(&self) -> Result<Vec<CacheStatus>, DataError> {
        self.store
            .keys()?
            .into_iter()
            .map(|key| {
                let series = self.store.get(&key)?.unwrap_or_default();
                Ok(CacheStatus {
                    bar_count: series.bars.len(),
                    coverage: series.coverage.into_bounds(),
                    first_open_time: series.bars.first().map(|b| b.open_time),
                    last_open_time: series.bars.last().map(|b| b.open_time),
                    key,
                })
            })
            .collect()
    }
}

/// Concatenate, sort by `open_time`, and keep the latest write for each key.
pub fn merge_bars(existing: Vec<Bar>, fetched: Vec<Bar>) -> Vec<Bar> {
    let mut all = existing;
    all.extend(fetched);
    // Stable sort keeps write order among equal keys, so the last of each run wins.
    all.sort_by_key(|b| b.open_time);
    let mut merged: Vec<Bar> = Vec::with_capacity(all.len());
    for bar in all {
        match merged.last_mut() {
            Some(prev) if prev.open_time == bar.open_time => *prev = bar,
            _ => merged.push(bar),
        }
    }
    merged
}

fn slice_range(bars: &[Bar], start: i64, end: i64) -> Vec<Bar> {
    let lo = bars.partition_point(|b| b.open_time < start);
    let hi = bars.partition_point(|b| b.open_time <= end);
    bars[lo..hi.max(lo)].to_vec()
}
