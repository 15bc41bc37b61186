//! Deterministic synthetic provider.
//!
//! Every bar is derived from `(seed, symbol, bar index)` alone, so fetching
//! the same range twice, or the same bar through two overlapping ranges,
//! always yields identical values.

use super::provider::{DataError, DataProvider};
use crate::domain::{Bar, Timeframe};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct SyntheticProvider {
    seed: u64,
    base_price: f64,
    /// Last open time with data; later bars do not exist yet.
    available_until: Option<i64>,
}

impl SyntheticProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            base_price: 100.0,
            available_until: None,
        }
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    /// Pretend no bars exist after `open_time` (the tail has not happened yet).
    pub fn available_until(mut self, open_time: i64) -> Self {
        self.available_until = Some(open_time);
        self
    }

    fn symbol_seed(&self, symbol: &str) -> u64 {
        let hash = blake3::hash(symbol.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        self.seed ^ u64::from_le_bytes(bytes)
    }

    fn close_at(&self, symbol_seed: u64, index: i64) -> f64 {
        let mut rng = StdRng::seed_from_u64(symbol_seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let cycle = (index as f64 / 24.0).sin() * 0.05;
        let noise: f64 = rng.gen_range(-0.01..0.01);
        self.base_price * (1.0 + cycle + noise)
    }

    /// Build the bar whose open time is `index * timeframe`.
    pub fn bar_at(&self, symbol: &str, timeframe: &Timeframe, index: i64) -> Bar {
        let seed = self.symbol_seed(symbol);
        let open = self.close_at(seed, index - 1);
        let close = self.close_at(seed, index);
        let mut rng = StdRng::seed_from_u64(seed.rotate_left(17) ^ index as u64);
        let wick: f64 = rng.gen_range(0.0..0.005);
        let volume: f64 = rng.gen_range(10.0..20.0);
        Bar {
            open_time: index * timeframe.as_millis(),
            open,
            high: open.max(close) * (1.0 + wick),
            low: open.min(close) * (1.0 - wick),
            close,
            volume,
        }
    }
}

impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        start: i64,
        end: i64,
    ) -> Result<Vec<Bar>, DataError> {
        if start > end {
            return Err(DataError::Validation(format!(
                "{symbol}: start {start} is after end {end}"
            )));
        }
        let end = match self.available_until {
            Some(limit) => end.min(limit),
            None => end,
        };
        let step = timeframe.as_millis();
        let first = start.div_euclid(step) + i64::from(start.rem_euclid(step) != 0);
        let last = end.div_euclid(step);
        Ok((first..=last)
            .map(|index| self.bar_at(symbol, timeframe, index))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly() -> Timeframe {
        "1h".parse().unwrap()
    }

    #[test]
    fn bars_are_aligned_to_timeframe() {
        let provider = SyntheticProvider::new(7);
        let bars = provider.fetch("SPY", &hourly(), 1, 3 * 3_600_000).unwrap();
        let times: Vec<i64> = bars.iter().map(|b| b.open_time).collect();
        assert_eq!(times, vec![3_600_000, 7_200_000, 10_800_000]);
    }

    #[test]
    fn overlapping_fetches_agree() {
        let provider = SyntheticProvider::new(7);
        let a = provider.fetch("SPY", &hourly(), 0, 10 * 3_600_000).unwrap();
        let b = provider.fetch("SPY", &hourly(), 5 * 3_600_000, 20 * 3_600_000).unwrap();
        assert_eq!(a[5..], b[..6]);
    }

    #[test]
    fn symbols_get_distinct_series() {
        let provider = SyntheticProvider::new(7);
        let spy = provider.fetch("SPY", &hourly(), 0, 3_600_000).unwrap();
        let qqq = provider.fetch("QQQ", &hourly(), 0, 3_600_000).unwrap();
        assert_ne!(spy[0].close, qqq[0].close);
    }

    #[test]
    fn bars_are_sane() {
        let provider = SyntheticProvider::new(1).with_base_price(50.0);
        for bar in provider.fetch("X", &hourly(), 0, 100 * 3_600_000).unwrap() {
            assert!(bar.is_sane(), "{bar:?}");
        }
    }

    #[test]
    fn inverted_range_is_a_validation_error() {
        let err = SyntheticProvider::new(1).fetch("SPY", &hourly(), 10, 5).unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn tail_cut_off_returns_partial_data() {
        let provider = SyntheticProvider::new(7).available_until(2 * 3_600_000);
        let bars = provider.fetch("SPY", &hourly(), 0, 10 * 3_600_000).unwrap();
        assert_eq!(bars.len(), 3);
        assert!(provider
            .fetch("SPY", &hourly(), 5 * 3_600_000, 10 * 3_600_000)
            .unwrap()
            .is_empty());
    }
}
