//! Rolling volume-weighted average of the open price.
//!
//! VWAP = sum(open * volume) / sum(volume) over the trailing `periods` bars.
//! A window with zero total volume yields NaN.

use super::rolling::rolling_sum;
use super::{FactorError, FactorOutput, Indicator};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Vwap {
    periods: usize,
    name: String,
}

impl Vwap {
    pub fn new(periods: usize) -> Result<Self, FactorError> {
        let name = format!("VWAP_{periods}");
        if periods == 0 {
            return Err(FactorError::InvalidParameter(format!(
                "{name}: periods must be >= 1"
            )));
        }
        Ok(Self { periods, name })
    }
}

impl Indicator for Vwap {
    fn name(&self) -> &str {
        &self.name
    }

    fn periods(&self) -> Option<usize> {
        Some(self.periods)
    }

    fn compute(&self, bars: &[Bar]) -> Result<FactorOutput, FactorError> {
        let notional: Vec<f64> = bars.iter().map(|b| b.open * b.volume).collect();
        let volume: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        let notional_sum = rolling_sum(&notional, self.periods);
        let volume_sum = rolling_sum(&volume, self.periods);

        let values = notional_sum
            .iter()
            .zip(&volume_sum)
            .map(|(&n, &v)| if v == 0.0 { f64::NAN } else { n / v })
            .collect();
        Ok(FactorOutput::Series(values))
    }
}
