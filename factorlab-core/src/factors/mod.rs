//! Factors: indicators computed in batch over a table or one bar at a time.
//!
//! An [`Indicator`] is a pure function from a bar slice to an output series.
//! A [`Factor`] wraps one behind an `Arc` and adds the streaming state: `apply`
//! runs the batch computation and seeds a bounded history from its tail,
//! `step` advances that history by one bar.
//!
//! Central invariant: for a primed factor, `step(bar)` equals the last value
//! of `apply(history + bar)` within floating tolerance. Every indicator here
//! only looks at the trailing `periods` bars, so recomputing over the stored
//! window gives the same answer as recomputing over the whole table.

pub mod column;
pub mod combine;
pub mod factor;
pub mod macd;
pub mod moving_average;
pub mod rolling;
pub mod rsi;
pub mod spec;
pub mod state;
pub mod vwap;

pub use column::Column;
pub use combine::{Combined, Operand, Operator};
pub use factor::Factor;
pub use macd::Macd;
pub use moving_average::MovingAverage;
pub use rsi::Rsi;
pub use spec::FactorSpec;
pub use state::FactorState;
pub use vwap::Vwap;

use crate::domain::Bar;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FactorError {
    #[error("{name} needs more than {required} rows, got {available}")]
    InsufficientHistory {
        name: String,
        required: usize,
        available: usize,
    },

    #[error("{name} has no history yet: call apply before step")]
    NotPrimed { name: String },

    #[error("unsupported operand: {0}")]
    UnsupportedOperand(String),

    #[error("{factor} cannot be computed on field '{field}'")]
    UnsupportedField { factor: String, field: String },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Pure batch computation behind a [`Factor`].
///
/// `compute` returns one value per input bar. Values that need more bars than
/// are available are `f64::NAN`.
pub trait Indicator: Send + Sync + fmt::Debug {
    /// Default factor name (e.g. `MA_20`).
    fn name(&self) -> &str;

    /// Trailing bars needed for one value; `None` for stateless factors.
    fn periods(&self) -> Option<usize>;

    /// Sub-column names for multi-column outputs, `None` for a single series.
    fn columns(&self) -> Option<Vec<String>> {
        None
    }

    fn compute(&self, bars: &[Bar]) -> Result<FactorOutput, FactorError>;

    /// Constant-time streaming update from the primed state, if the indicator
    /// has one. `None` makes the caller recompute over the stored window.
    fn step_incremental(&self, _state: &FactorState, _bar: &Bar) -> Option<FactorValue> {
        None
    }
}

/// Batch output: one series, or named sub-columns of equal length.
#[derive(Debug, Clone, PartialEq)]
pub enum FactorOutput {
    Series(Vec<f64>),
    Columns(BTreeMap<String, Vec<f64>>),
}

impl FactorOutput {
    pub fn len(&self) -> usize {
        match self {
            FactorOutput::Series(values) => values.len(),
            FactorOutput::Columns(columns) => columns.values().next().map_or(0, Vec::len),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value at row `index`, shaped like a streaming value.
    pub fn value_at(&self, index: usize) -> Option<FactorValue> {
        match self {
            FactorOutput::Series(values) => values.get(index).copied().map(FactorValue::Scalar),
            FactorOutput::Columns(columns) => columns
                .iter()
                .map(|(name, values)| values.get(index).map(|v| (name.clone(), *v)))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(FactorValue::Columns),
        }
    }

    pub fn last(&self) -> Option<FactorValue> {
        self.len().checked_sub(1).and_then(|i| self.value_at(i))
    }

    pub fn as_series(&self) -> Option<&[f64]> {
        match self {
            FactorOutput::Series(values) => Some(values),
            FactorOutput::Columns(_) => None,
        }
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        match self {
            FactorOutput::Series(_) => None,
            FactorOutput::Columns(columns) => columns.get(name).map(Vec::as_slice),
        }
    }
}

/// Streaming output: the batch shape minus the time axis.
#[derive(Debug, Clone, PartialEq)]
pub enum FactorValue {
    Scalar(f64),
    Columns(BTreeMap<String, f64>),
}

impl FactorValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            FactorValue::Scalar(v) => Some(*v),
            FactorValue::Columns(_) => None,
        }
    }

    pub fn column(&self, name: &str) -> Option<f64> {
        match self {
            FactorValue::Scalar(_) => None,
            FactorValue::Columns(columns) => columns.get(name).copied(),
        }
    }

    /// Equal within `epsilon`, treating two NaNs as equal.
    pub fn approx_eq(&self, other: &FactorValue, epsilon: f64) -> bool {
        let close = |a: f64, b: f64| (a.is_nan() && b.is_nan()) || (a - b).abs() <= epsilon;
        match (self, other) {
            (FactorValue::Scalar(a), FactorValue::Scalar(b)) => close(*a, *b),
            (FactorValue::Columns(a), FactorValue::Columns(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && close(*va, *vb))
            }
            _ => false,
        }
    }
}

/// Create synthetic bars from close prices for testing.
///
/// Bars are one hour apart starting at 2024-01-02 00:00 UTC.
/// open = prev_close (or close for the first bar), high/low = max/min(open,close) ± 1.0,
/// volume cycles through 1000, 1100, 1200.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    const BASE_TIME: i64 = 1_704_153_600_000;
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                open_time: BASE_TIME + i as i64 * 3_600_000,
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0 + 100.0 * (i % 3) as f64,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for factor tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

/// Prime `factor` on `bars[..split]`, step through the rest, and check every
/// streamed value against a batch recomputation on the prefix.
#[cfg(test)]
pub fn assert_step_matches_apply(factor: &mut Factor, bars: &[Bar], split: usize, epsilon: f64) {
    factor.apply(&bars[..split]).unwrap();
    for i in split..bars.len() {
        let streamed = factor.step(&bars[i]).unwrap();
        let batch = factor.compute(&bars[..=i]).unwrap().last().unwrap();
        assert!(
            streamed.approx_eq(&batch, epsilon),
            "{}: step diverged at row {i}: streamed={streamed:?}, batch={batch:?}",
            factor.name()
        );
    }
}
