//! Relative Strength Index (RSI) over intrabar moves.
//!
//! Gains and losses are taken from `close - open` of each bar and averaged
//! with plain rolling means, so the value at a row depends only on the
//! trailing `periods` bars.
//! RSI = 100 - 100 / (1 + mean_gain / mean_loss)
//! Edge cases: mean_loss == 0 → RSI = 100; mean_gain == 0 → RSI = 0;
//! both zero → 50.

use super::rolling::rolling_mean;
use super::{FactorError, FactorOutput, Indicator};
use crate::domain::Bar;

pub const DEFAULT_RSI_PERIODS: usize = 14;

#[derive(Debug, Clone)]
pub struct Rsi {
    periods: usize,
    name: String,
}

impl Rsi {
    pub fn new(periods: usize) -> Result<Self, FactorError> {
        let name = format!("RSI_{periods}");
        if periods == 0 {
            return Err(FactorError::InvalidParameter(format!(
                "{name}: periods must be >= 1"
            )));
        }
        Ok(Self { periods, name })
    }
}

impl Default for Rsi {
    fn default() -> Self {
        Self {
            periods: DEFAULT_RSI_PERIODS,
            name: format!("RSI_{DEFAULT_RSI_PERIODS}"),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn periods(&self) -> Option<usize> {
        Some(self.periods)
    }

    fn compute(&self, bars: &[Bar]) -> Result<FactorOutput, FactorError> {
        if bars.len() <= self.periods {
            return Err(FactorError::InsufficientHistory {
                name: self.name.clone(),
                required: self.periods,
                available: bars.len(),
            });
        }

        let (gains, losses): (Vec<f64>, Vec<f64>) = bars
            .iter()
            .map(|b| {
                let diff = b.close - b.open;
                if diff.is_nan() {
                    (f64::NAN, f64::NAN)
                } else if diff >= 0.0 {
                    (diff, 0.0)
                } else {
                    (0.0, -diff)
                }
            })
            .unzip();

        let mean_gain = rolling_mean(&gains, self.periods);
        let mean_loss = rolling_mean(&losses, self.periods);
        let values = mean_gain
            .iter()
            .zip(&mean_loss)
            .map(|(&g, &l)| compute_rsi(g, l))
            .collect();
        Ok(FactorOutput::Series(values))
    }
}

fn compute_rsi(mean_gain: f64, mean_loss: f64) -> f64 {
    if mean_gain.is_nan() || mean_loss.is_nan() {
        f64::NAN
    } else if mean_loss == 0.0 && mean_gain == 0.0 {
        50.0 // no movement
    } else if mean_loss == 0.0 {
        100.0
    } else if mean_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + mean_gain / mean_loss)
    }
}
