//! Bounded streaming history for a primed factor.

use super::{FactorOutput, FactorValue};
use crate::domain::Bar;
use std::collections::VecDeque;

/// The trailing `periods` bars and factor values seen by a factor.
///
/// Seeded from the tail of the last `apply` and advanced by `step`. Both
/// queues hold at most `periods` entries and stay aligned: `values[i]` is
/// the factor value at `bars[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorState {
    periods: usize,
    bars: VecDeque<Bar>,
    values: VecDeque<FactorValue>,
}

impl FactorState {
    /// Keep the trailing `periods` rows of a batch computation.
    pub fn seed(periods: usize, bars: &[Bar], output: &FactorOutput) -> Self {
        let rows = bars.len().min(output.len());
        let skip = rows.saturating_sub(periods);
        let bars = bars[skip..rows].iter().copied().collect();
        let values = (skip..rows).filter_map(|i| output.value_at(i)).collect();
        Self {
            periods,
            bars,
            values,
        }
    }

    pub fn periods(&self) -> usize {
        self.periods
    }

    pub fn bars(&self) -> &VecDeque<Bar> {
        &self.bars
    }

    pub fn values(&self) -> &VecDeque<FactorValue> {
        &self.values
    }

    pub fn last_value(&self) -> Option<&FactorValue> {
        self.values.back()
    }

    pub fn last_open_time(&self) -> Option<i64> {
        self.bars.back().map(|b| b.open_time)
    }

    /// True once the window holds `periods` bars.
    pub fn is_full(&self) -> bool {
        self.bars.len() >= self.periods
    }

    /// The stored window followed by `bar`, for recomputation.
    pub fn window_with(&self, bar: &Bar) -> Vec<Bar> {
        let mut window = Vec::with_capacity(self.bars.len() + 1);
        window.extend(self.bars.iter().copied());
        window.push(*bar);
        window
    }

    /// Append one row and evict the oldest beyond `periods`.
    pub fn push(&mut self, bar: Bar, value: FactorValue) {
        self.bars.push_back(bar);
        self.values.push_back(value);
        while self.bars.len() > self.periods {
            self.bars.pop_front();
            self.values.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::make_bars;

    #[test]
    fn seed_keeps_trailing_rows() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let output = FactorOutput::Series(vec![10.0, 20.0, 30.0, 40.0, 50.0]);
        let state = FactorState::seed(3, &bars, &output);

        assert_eq!(state.bars().len(), 3);
        assert_eq!(state.bars()[0].close, 3.0);
        assert_eq!(state.last_value(), Some(&FactorValue::Scalar(50.0)));
        assert!(state.is_full());
    }

    #[test]
    fn seed_from_short_table_is_not_full() {
        let bars = make_bars(&[1.0, 2.0]);
        let output = FactorOutput::Series(vec![f64::NAN, f64::NAN]);
        let state = FactorState::seed(5, &bars, &output);
        assert_eq!(state.bars().len(), 2);
        assert!(!state.is_full());
    }

    #[test]
    fn push_evicts_oldest() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0]);
        let output = FactorOutput::Series(vec![1.0, 2.0]);
        let mut state = FactorState::seed(2, &bars[..2], &output);

        state.push(bars[2], FactorValue::Scalar(3.0));
        state.push(bars[3], FactorValue::Scalar(4.0));

        assert_eq!(state.bars().len(), 2);
        assert_eq!(state.values().len(), 2);
        assert_eq!(state.bars()[0].close, 3.0);
        assert_eq!(state.last_open_time(), Some(bars[3].open_time));
    }

    #[test]
    fn window_with_appends_bar() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let state = FactorState::seed(2, &bars[..2], &FactorOutput::Series(vec![0.0, 0.0]));
        let window = state.window_with(&bars[2]);
        assert_eq!(window.len(), 3);
        assert_eq!(window[2].close, 3.0);
    }
}
