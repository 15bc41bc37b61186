//! Train/test walk over one cached series.
//!
//! `train` fetches the training range, batch-applies the pipeline and keeps
//! the trailing `window` joined records. `test` fetches the test range and
//! hands back a lazy stream that steps the pipeline one bar at a time,
//! yielding a snapshot of the rolling history after each bar.

use super::config::{SimulationConfig, DEFAULT_WINDOW};
use super::history::{Record, RollingHistory};
use super::SimulationError;
use crate::data::{SeriesKey, TimeSeriesCache};
use crate::domain::{Bar, PriceField};
use crate::pipeline::{flatten_outputs, flatten_values, PipelineNode};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Trained,
    Streaming,
}

pub struct SimulationDriver {
    cache: TimeSeriesCache,
    key: SeriesKey,
    pipeline: Option<PipelineNode>,
    start: i64,
    train_end: i64,
    test_end: i64,
    window: usize,
    join_ohlcv: bool,
    phase: Phase,
    history: Option<RollingHistory>,
    last_trained: Option<i64>,
}

impl SimulationDriver {
    /// Requires `start < train_end < test_end`.
    pub fn new(
        cache: TimeSeriesCache,
        key: SeriesKey,
        start: i64,
        train_end: i64,
        test_end: i64,
    ) -> Result<Self, SimulationError> {
        if !(start < train_end && train_end < test_end) {
            return Err(SimulationError::Config(format!(
                "need start < train_end < test_end, got {start}, {train_end}, {test_end}"
            )));
        }
        Ok(Self {
            cache,
            key,
            pipeline: None,
            start,
            train_end,
            test_end,
            window: DEFAULT_WINDOW,
            join_ohlcv: true,
            phase: Phase::Idle,
            history: None,
            last_trained: None,
        })
    }

    /// Driver for `config`, reading through `cache`.
    pub fn from_config(
        config: &SimulationConfig,
        cache: TimeSeriesCache,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let (start, train_end, test_end) = config.range()?;
        let key = SeriesKey::new(&config.source, &config.symbol, config.timeframe.clone());
        let mut driver = Self::new(cache, key, start, train_end, test_end)?
            .with_window(config.window)?
            .with_ohlcv(config.join_ohlcv);
        if let Some(spec) = &config.pipeline {
            driver = driver.with_pipeline(spec.build()?)?;
        }
        Ok(driver)
    }

    /// Factor columns are namespaced under the pipeline root, which must not
    /// shadow a raw column when those are joined.
    pub fn with_pipeline(mut self, pipeline: PipelineNode) -> Result<Self, SimulationError> {
        self.pipeline = Some(pipeline);
        self.check_columns()?;
        Ok(self)
    }

    pub fn with_window(mut self, window: usize) -> Result<Self, SimulationError> {
        if window == 0 {
            return Err(SimulationError::Config("window must be >= 1".into()));
        }
        self.window = window;
        Ok(self)
    }

    pub fn with_ohlcv(mut self, join_ohlcv: bool) -> Self {
        self.join_ohlcv = join_ohlcv;
        self
    }

    fn check_columns(&self) -> Result<(), SimulationError> {
        let Some(pipeline) = &self.pipeline else {
            return Ok(());
        };
        if self.join_ohlcv && PriceField::ALL.iter().any(|f| f.as_str() == pipeline.name()) {
            return Err(SimulationError::Config(format!(
                "pipeline root '{}' collides with a raw column",
                pipeline.name()
            )));
        }
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn cache(&self) -> &TimeSeriesCache {
        &self.cache
    }

    /// Rolling history as of the end of training, if trained and not yet streamed.
    pub fn history(&self) -> Option<&RollingHistory> {
        self.history.as_ref()
    }

    /// Fetch `[start, train_end]`, batch-apply the pipeline and return the
    /// full joined training table.
    ///
    /// A failed `train` leaves the driver `Idle`.
    pub fn train(&mut self) -> Result<Vec<Record>, SimulationError> {
        self.check_columns()?;
        self.phase = Phase::Idle;
        self.history = None;
        self.last_trained = None;
        let bars = self.cache.fetch(&self.key, self.start, self.train_end)?;
        let columns = match self.pipeline.as_mut() {
            Some(pipeline) => flatten_outputs(&pipeline.apply(&bars)?),
            None => BTreeMap::new(),
        };

        let records: Vec<Record> = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| {
                let mut record = Record::from_bar(bar, self.join_ohlcv);
                for (path, values) in &columns {
                    record.fields.insert(path.clone(), values[i]);
                }
                record
            })
            .collect();

        let mut history = RollingHistory::new(self.window);
        history.extend(records.iter().cloned());
        self.history = Some(history);
        self.last_trained = bars.last().map(|b| b.open_time);
        self.phase = Phase::Trained;

        info!(
            key = %self.key,
            rows = records.len(),
            columns = columns.len(),
            "training complete"
        );
        Ok(records)
    }

    /// Fetch `[train_end, test_end]` and stream one history snapshot per new bar.
    ///
    /// Bars at or before the last trained bar are skipped. The stream
    /// consumes the trained state: call `train` again before another `test`.
    pub fn test(&mut self) -> Result<TestStream<'_>, SimulationError> {
        if self.phase != Phase::Trained {
            return Err(SimulationError::NotTrainedYet);
        }
        let bars = self.cache.fetch(&self.key, self.train_end, self.test_end)?;
        let history = self.history.take().ok_or(SimulationError::NotTrainedYet)?;

        let fetched = bars.len();
        let bars: Vec<Bar> = match self.last_trained {
            Some(last) => bars.into_iter().filter(|b| b.open_time > last).collect(),
            None => bars,
        };
        debug!(key = %self.key, fetched, streaming = bars.len(), "test stream ready");
        self.phase = Phase::Streaming;

        Ok(TestStream {
            pipeline: self.pipeline.as_mut(),
            join_ohlcv: self.join_ohlcv,
            history,
            bars: bars.into_iter(),
            failed: false,
        })
    }
}

/// Lazy, finite stream of rolling-history snapshots.
///
/// Stops after the first pipeline error.
pub struct TestStream<'a> {
    pipeline: Option<&'a mut PipelineNode>,
    join_ohlcv: bool,
    history: RollingHistory,
    bars: std::vec::IntoIter<Bar>,
    failed: bool,
}

impl TestStream<'_> {
    pub fn history(&self) -> &RollingHistory {
        &self.history
    }

    /// Bars not yet streamed.
    pub fn remaining(&self) -> usize {
        if self.failed {
            0
        } else {
            self.bars.len()
        }
    }
}

impl Iterator for TestStream<'_> {
    type Item = Result<Vec<Record>, SimulationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let bar = self.bars.next()?;
        let mut record = Record::from_bar(&bar, self.join_ohlcv);

        if let Some(pipeline) = self.pipeline.as_deref_mut() {
            match pipeline.step(&bar) {
                Ok(values) => record.fields.extend(flatten_values(&values)),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e.into()));
                }
            }
        }

        self.history.push(record);
        Some(Ok(self.history.snapshot()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MemoryStore, SyntheticProvider};
    use crate::domain::Timeframe;
    use crate::factors::{Factor, Macd, MovingAverage, Rsi};

    const HOUR: i64 = 3_600_000;

    fn driver(window: usize) -> SimulationDriver {
        let cache = TimeSeriesCache::new(MemoryStore::new()).with_provider(SyntheticProvider::new(7));
        let key = SeriesKey::new("synthetic", "BTC/USDT", "1h".parse::<Timeframe>().unwrap());
        let pipeline = PipelineNode::branch(
            "signals",
            vec![
                PipelineNode::leaf(Factor::new(MovingAverage::close(3).unwrap())),
                PipelineNode::leaf(Factor::new(Macd::close(2, 4).unwrap())),
            ],
        )
        .unwrap();
        SimulationDriver::new(cache, key, 0, 20 * HOUR, 30 * HOUR)
            .unwrap()
            .with_window(window)
            .unwrap()
            .with_pipeline(pipeline)
            .unwrap()
    }

    #[test]
    fn train_returns_full_joined_table() {
        let mut driver = driver(5);
        let records = driver.train().unwrap();

        // Synthetic bars on the hour from 0 through 20h inclusive.
        assert_eq!(records.len(), 21);
        let last = records.last().unwrap();
        assert!(last.get("close").is_some());
        assert!(last.get("signals.MA_3").unwrap().is_finite());
        assert!(last.get("signals.MACD_2_4.fast").is_some());
        assert!(last.get("signals.MACD_2_4.slow").is_some());

        assert_eq!(driver.phase(), Phase::Trained);
        let history = driver.history().unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history.last().unwrap().open_time, 20 * HOUR);
    }

    #[test]
    fn test_before_train_fails() {
        let mut driver = driver(5);
        assert!(matches!(driver.test(), Err(SimulationError::NotTrainedYet)));
    }

    #[test]
    fn stream_skips_trained_bar_and_rolls_window() {
        let mut driver = driver(4);
        driver.train().unwrap();
        let snapshots: Vec<_> = driver.test().unwrap().collect::<Result<_, _>>().unwrap();

        // (20h, 30h] on the hour.
        assert_eq!(snapshots.len(), 10);
        let first = &snapshots[0];
        assert_eq!(first.len(), 4);
        assert_eq!(first.last().unwrap().open_time, 21 * HOUR);
        let last = snapshots.last().unwrap();
        let times: Vec<_> = last.iter().map(|r| r.open_time).collect();
        assert_eq!(times, vec![27 * HOUR, 28 * HOUR, 29 * HOUR, 30 * HOUR]);
        assert_eq!(driver.phase(), Phase::Streaming);
    }

    #[test]
    fn streamed_columns_match_training_columns() {
        let mut driver = driver(3);
        let trained = driver.train().unwrap();
        let mut stream = driver.test().unwrap();
        let snapshot = stream.next().unwrap().unwrap();

        let trained_cols: Vec<_> = trained[0].fields.keys().cloned().collect();
        let streamed_cols: Vec<_> = snapshot.last().unwrap().fields.keys().cloned().collect();
        assert_eq!(trained_cols, streamed_cols);
    }

    #[test]
    fn streamed_values_match_batch() {
        let mut streaming = driver(3);
        streaming.train().unwrap();
        let last = streaming
            .test()
            .unwrap()
            .last()
            .unwrap()
            .unwrap()
            .pop()
            .unwrap();

        // Batch over the whole range in one pass.
        let mut batch = driver(3);
        batch.train_end = 30 * HOUR;
        batch.test_end = 31 * HOUR;
        let records = batch.train().unwrap();
        let expected = records.iter().find(|r| r.open_time == last.open_time).unwrap();
        for (column, value) in &expected.fields {
            let streamed = last.get(column).unwrap();
            assert!(
                (value - streamed).abs() < 1e-9,
                "{column}: batch={value}, stream={streamed}"
            );
        }
    }

    #[test]
    fn second_test_needs_retrain() {
        let mut driver = driver(3);
        driver.train().unwrap();
        let _ = driver.test().unwrap().count();
        assert!(matches!(driver.test(), Err(SimulationError::NotTrainedYet)));

        driver.train().unwrap();
        assert_eq!(driver.test().unwrap().count(), 10);
    }

    #[test]
    fn failed_retrain_resets_to_idle() {
        let cache = TimeSeriesCache::new(MemoryStore::new()).with_provider(SyntheticProvider::new(7));
        let key = SeriesKey::new("synthetic", "BTC/USDT", "1h".parse::<Timeframe>().unwrap());
        let pipeline = PipelineNode::leaf(Factor::new(Rsi::new(5).unwrap()));
        let mut driver = SimulationDriver::new(cache, key, 0, 20 * HOUR, 30 * HOUR)
            .unwrap()
            .with_pipeline(pipeline)
            .unwrap();
        driver.train().unwrap();
        assert_eq!(driver.phase(), Phase::Trained);

        // Three bars are too few for RSI_5.
        driver.start = 18 * HOUR;
        assert!(matches!(driver.train(), Err(SimulationError::Pipeline(_))));
        assert_eq!(driver.phase(), Phase::Idle);
        assert!(driver.history().is_none());
        assert!(matches!(driver.test(), Err(SimulationError::NotTrainedYet)));
    }

    #[test]
    fn raw_columns_can_be_omitted() {
        let mut driver = driver(3).with_ohlcv(false);
        let records = driver.train().unwrap();
        assert!(records[0].get("close").is_none());
        assert!(records[0].get("signals.MA_3").is_some());
    }

    #[test]
    fn pipeline_root_cannot_shadow_raw_column() {
        let cache = TimeSeriesCache::new(MemoryStore::new());
        let key = SeriesKey::new("synthetic", "X", "1h".parse::<Timeframe>().unwrap());
        let shadowing = PipelineNode::leaf(Factor::new(MovingAverage::close(3).unwrap()).renamed("close"));
        let result = SimulationDriver::new(cache, key, 0, HOUR, 2 * HOUR)
            .unwrap()
            .with_pipeline(shadowing);
        assert!(matches!(result, Err(SimulationError::Config(_))));
    }

    #[test]
    fn rejects_bad_range_and_window() {
        let key = SeriesKey::new("synthetic", "X", "1h".parse::<Timeframe>().unwrap());
        let cache = TimeSeriesCache::new(MemoryStore::new());
        assert!(SimulationDriver::new(cache, key.clone(), 10, 10, 20).is_err());
        let cache = TimeSeriesCache::new(MemoryStore::new());
        assert!(SimulationDriver::new(cache, key, 0, 10, 20)
            .unwrap()
            .with_window(0)
            .is_err());
    }

    #[test]
    fn unknown_source_surfaces_as_data_error() {
        let cache = TimeSeriesCache::new(MemoryStore::new());
        let key = SeriesKey::new("nowhere", "X", "1h".parse::<Timeframe>().unwrap());
        let mut driver = SimulationDriver::new(cache, key, 0, HOUR, 2 * HOUR).unwrap();
        assert!(matches!(driver.train(), Err(SimulationError::Data(_))));
        assert_eq!(driver.phase(), Phase::Idle);
    }
}
