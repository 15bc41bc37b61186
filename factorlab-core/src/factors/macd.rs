//! Moving average convergence/divergence as a pair of moving averages.
//!
//! Emits two sub-columns, `fast` and `slow`, each a simple rolling mean of
//! the chosen field. `periods` is the slow window.

use super::rolling::rolling_mean;
use super::{FactorError, FactorOutput, Indicator};
use crate::domain::{Bar, PriceField};
use std::collections::BTreeMap;

pub const FAST_COLUMN: &str = "fast";
pub const SLOW_COLUMN: &str = "slow";

#[derive(Debug, Clone)]
pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    field: PriceField,
    name: String,
}

impl Macd {
    /// Requires `1 <= fast_period <= slow_period`.
    pub fn new(fast_period: usize, slow_period: usize, field: PriceField) -> Result<Self, FactorError> {
        let name = format!("MACD_{fast_period}_{slow_period}");
        if fast_period == 0 || fast_period > slow_period {
            return Err(FactorError::InvalidParameter(format!(
                "{name}: need 1 <= fast_period <= slow_period"
            )));
        }
        Ok(Self {
            fast_period,
            slow_period,
            field,
            name,
        })
    }

    pub fn close(fast_period: usize, slow_period: usize) -> Result<Self, FactorError> {
        Self::new(fast_period, slow_period, PriceField::Close)
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn periods(&self) -> Option<usize> {
        Some(self.slow_period)
    }

    fn columns(&self) -> Option<Vec<String>> {
        Some(vec![FAST_COLUMN.to_string(), SLOW_COLUMN.to_string()])
    }

    fn compute(&self, bars: &[Bar]) -> Result<FactorOutput, FactorError> {
        let values: Vec<f64> = bars.iter().map(|b| b.field(self.field)).collect();
        let mut columns = BTreeMap::new();
        columns.insert(FAST_COLUMN.to_string(), rolling_mean(&values, self.fast_period));
        columns.insert(SLOW_COLUMN.to_string(), rolling_mean(&values, self.slow_period));
        Ok(FactorOutput::Columns(columns))
    }
}
