//! Simple moving average over open or close prices.
//!
//! Streams in constant time once the window is full:
//! `new = old + (incoming - evicted) / periods`.

use super::rolling::rolling_mean;
use super::{FactorError, FactorOutput, FactorState, FactorValue, Indicator};
use crate::domain::{Bar, PriceField};

#[derive(Debug, Clone)]
pub struct MovingAverage {
    periods: usize,
    field: PriceField,
    name: String,
}

impl MovingAverage {
    /// Moving average of `field`, which must be `Open` or `Close`.
    pub fn new(periods: usize, field: PriceField) -> Result<Self, FactorError> {
        let name = format!("MA_{periods}");
        if periods == 0 {
            return Err(FactorError::InvalidParameter(format!(
                "{name}: periods must be >= 1"
            )));
        }
        if !matches!(field, PriceField::Open | PriceField::Close) {
            return Err(FactorError::UnsupportedField {
                factor: name,
                field: field.to_string(),
            });
        }
        Ok(Self {
            periods,
            field,
            name,
        })
    }

    /// Moving average of close prices.
    pub fn close(periods: usize) -> Result<Self, FactorError> {
        Self::new(periods, PriceField::Close)
    }

    pub fn field(&self) -> PriceField {
        self.field
    }
}

impl Indicator for MovingAverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn periods(&self) -> Option<usize> {
        Some(self.periods)
    }

    fn compute(&self, bars: &[Bar]) -> Result<FactorOutput, FactorError> {
        let values: Vec<f64> = bars.iter().map(|b| b.field(self.field)).collect();
        Ok(FactorOutput::Series(rolling_mean(&values, self.periods)))
    }

    fn step_incremental(&self, state: &FactorState, bar: &Bar) -> Option<FactorValue> {
        if !state.is_full() {
            return None;
        }
        let old = state.last_value()?.as_scalar().filter(|v| v.is_finite())?;
        let evicted = state.bars().front()?.field(self.field);
        let incoming = bar.field(self.field);
        if !evicted.is_finite() || !incoming.is_finite() {
            return None;
        }
        Some(FactorValue::Scalar(
            old + (incoming - evicted) / self.periods as f64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{assert_approx, assert_step_matches_apply, make_bars, Factor, DEFAULT_EPSILON};

    #[test]
    fn ma_5_basic() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
        let ma = MovingAverage::close(5).unwrap();
        let output = ma.compute(&bars).unwrap();
        let result = output.as_series().unwrap();

        assert_eq!(result.len(), 7);
        for (i, v) in result.iter().enumerate().take(4) {
            assert!(v.is_nan(), "expected NaN at index {i}");
        }
        assert_approx(result[4], 12.0, DEFAULT_EPSILON);
        assert_approx(result[5], 13.0, DEFAULT_EPSILON);
        assert_approx(result[6], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ma_on_open() {
        // open[i] = close[i-1]
        let bars = make_bars(&[10.0, 20.0, 30.0]);
        let ma = MovingAverage::new(2, PriceField::Open).unwrap();
        let output = ma.compute(&bars).unwrap();
        assert_approx(output.as_series().unwrap()[2], 15.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ma_rejects_other_fields() {
        let err = MovingAverage::new(5, PriceField::Volume).unwrap_err();
        assert!(matches!(err, FactorError::UnsupportedField { .. }));
        assert!(MovingAverage::new(5, PriceField::High).is_err());
    }

    #[test]
    fn ma_rejects_zero_periods() {
        assert!(matches!(
            MovingAverage::close(0),
            Err(FactorError::InvalidParameter(_))
        ));
    }

    #[test]
    fn ma_name_and_periods() {
        let ma = MovingAverage::close(20).unwrap();
        assert_eq!(ma.name(), "MA_20");
        assert_eq!(ma.periods(), Some(20));
    }

    #[test]
    fn ma_nan_propagation() {
        let mut bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
        bars[2].close = f64::NAN;
        let output = MovingAverage::close(3).unwrap().compute(&bars).unwrap();
        let result = output.as_series().unwrap();
        assert!(result[2].is_nan());
        assert!(result[3].is_nan());
        assert!(result[4].is_nan());
        assert_approx(result[5], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn incremental_step_matches_batch() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let bars = make_bars(&closes);
        let mut factor = Factor::new(MovingAverage::close(10).unwrap());
        assert_step_matches_apply(&mut factor, &bars, 20, 1e-9);
    }

    #[test]
    fn step_before_window_fills_recomputes() {
        // Primed on fewer bars than periods, so the recurrence cannot be used yet.
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut factor = Factor::new(MovingAverage::close(4).unwrap());
        assert_step_matches_apply(&mut factor, &bars, 2, DEFAULT_EPSILON);
    }

    #[test]
    fn step_recovers_after_nan() {
        let mut bars = make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        bars[5].close = f64::NAN;
        let mut factor = Factor::new(MovingAverage::close(2).unwrap());
        assert_step_matches_apply(&mut factor, &bars, 3, DEFAULT_EPSILON);
    }
}
