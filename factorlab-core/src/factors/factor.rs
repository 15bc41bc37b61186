//! The stateful factor handle.

use super::{Combined, FactorError, FactorOutput, FactorState, FactorValue, Indicator, Operand, Operator};
use crate::domain::Bar;
use std::sync::Arc;

/// A named indicator plus its streaming history.
///
/// Cloning shares the indicator and copies the history.
#[derive(Debug, Clone)]
pub struct Factor {
    name: String,
    indicator: Arc<dyn Indicator>,
    state: Option<FactorState>,
}

impl Factor {
    pub fn new(indicator: impl Indicator + 'static) -> Self {
        Self::from_arc(Arc::new(indicator))
    }

    pub fn from_arc(indicator: Arc<dyn Indicator>) -> Self {
        Self {
            name: indicator.name().to_string(),
            indicator,
            state: None,
        }
    }

    /// Same computation under a different output name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn periods(&self) -> Option<usize> {
        self.indicator.periods()
    }

    pub fn columns(&self) -> Option<Vec<String>> {
        self.indicator.columns()
    }

    pub fn indicator(&self) -> &Arc<dyn Indicator> {
        &self.indicator
    }

    pub fn state(&self) -> Option<&FactorState> {
        self.state.as_ref()
    }

    /// True when `step` can be called: stateless, or seeded by `apply`.
    pub fn is_primed(&self) -> bool {
        self.periods().is_none() || self.state.is_some()
    }

    /// Batch computation without touching the streaming history.
    pub fn compute(&self, bars: &[Bar]) -> Result<FactorOutput, FactorError> {
        self.indicator.compute(bars)
    }

    /// Batch computation over `bars`; for windowed factors also replaces the
    /// history with the trailing `periods` bars and values.
    pub fn apply(&mut self, bars: &[Bar]) -> Result<FactorOutput, FactorError> {
        let output = self.indicator.compute(bars)?;
        if let Some(periods) = self.periods() {
            self.state = Some(FactorState::seed(periods, bars, &output));
        }
        Ok(output)
    }

    /// Advance by one bar and return the factor value at that bar.
    pub fn step(&mut self, bar: &Bar) -> Result<FactorValue, FactorError> {
        if self.periods().is_none() {
            let output = self.indicator.compute(std::slice::from_ref(bar))?;
            return output.last().ok_or_else(|| FactorError::InsufficientHistory {
                name: self.name.clone(),
                required: 1,
                available: 1,
            });
        }

        let state = self.state.as_mut().ok_or_else(|| FactorError::NotPrimed {
            name: self.name.clone(),
        })?;
        let value = match self.indicator.step_incremental(state, bar) {
            Some(value) => value,
            None => {
                let window = state.window_with(bar);
                let available = window.len();
                self.indicator
                    .compute(&window)?
                    .last()
                    .ok_or_else(|| FactorError::InsufficientHistory {
                        name: self.name.clone(),
                        required: 1,
                        available,
                    })?
            }
        };
        state.push(*bar, value.clone());
        Ok(value)
    }

    // ── Composition ─────────────────────────────────────────────────

    /// `lhs <op> rhs` as a new, unprimed factor.
    pub fn combine(
        lhs: impl Into<Operand>,
        op: Operator,
        rhs: impl Into<Operand>,
    ) -> Result<Factor, FactorError> {
        Ok(Factor::new(Combined::new(lhs.into(), op, rhs.into())?))
    }

    pub fn plus(&self, rhs: impl Into<Operand>) -> Result<Factor, FactorError> {
        Self::combine(self, Operator::Add, rhs)
    }

    pub fn minus(&self, rhs: impl Into<Operand>) -> Result<Factor, FactorError> {
        Self::combine(self, Operator::Sub, rhs)
    }

    pub fn times(&self, rhs: impl Into<Operand>) -> Result<Factor, FactorError> {
        Self::combine(self, Operator::Mul, rhs)
    }

    pub fn divided_by(&self, rhs: impl Into<Operand>) -> Result<Factor, FactorError> {
        Self::combine(self, Operator::Div, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{make_bars, MovingAverage, Rsi};

    #[test]
    fn step_before_apply_is_not_primed() {
        let bars = make_bars(&[1.0, 2.0]);
        let mut factor = Factor::new(MovingAverage::close(3).unwrap());
        assert!(!factor.is_primed());
        assert_eq!(
            factor.step(&bars[0]).unwrap_err(),
            FactorError::NotPrimed {
                name: "MA_3".into()
            }
        );
    }

    #[test]
    fn apply_seeds_bounded_history() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut factor = Factor::new(MovingAverage::close(3).unwrap());
        factor.apply(&bars).unwrap();

        let state = factor.state().unwrap();
        assert_eq!(state.bars().len(), 3);
        assert_eq!(state.values().len(), 3);
        assert_eq!(state.last_open_time(), Some(bars[5].open_time));
        assert_eq!(state.last_value(), Some(&FactorValue::Scalar(5.0)));
    }

    #[test]
    fn step_keeps_history_bounded() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let mut factor = Factor::new(MovingAverage::close(3).unwrap());
        factor.apply(&bars[..4]).unwrap();
        for bar in &bars[4..] {
            factor.step(bar).unwrap();
        }
        let state = factor.state().unwrap();
        assert_eq!(state.bars().len(), 3);
        assert_eq!(state.bars()[0].close, 5.0);
        assert_eq!(state.last_value(), Some(&FactorValue::Scalar(6.0)));
    }

    #[test]
    fn failed_apply_leaves_factor_unprimed() {
        let bars = make_bars(&[1.0, 2.0]);
        let mut factor = Factor::new(Rsi::new(5).unwrap());
        assert!(matches!(
            factor.apply(&bars),
            Err(FactorError::InsufficientHistory { .. })
        ));
        assert!(factor.state().is_none());
    }

    #[test]
    fn compute_does_not_seed() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let factor = Factor::new(MovingAverage::close(2).unwrap());
        factor.compute(&bars).unwrap();
        assert!(factor.state().is_none());
    }

    #[test]
    fn renamed_keeps_computation() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let plain = Factor::new(MovingAverage::close(2).unwrap());
        let renamed = plain.clone().renamed("fast_ma");
        assert_eq!(renamed.name(), "fast_ma");
        assert_eq!(
            renamed.compute(&bars).unwrap().last(),
            plain.compute(&bars).unwrap().last()
        );
    }
}
