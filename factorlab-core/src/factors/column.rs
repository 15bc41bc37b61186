//! Raw price field as a stateless factor.

use super::{FactorError, FactorOutput, Indicator};
use crate::domain::{Bar, PriceField};

/// Passes one bar field through unchanged. Useful as an operand, e.g.
/// `close - MA_20`.
#[derive(Debug, Clone)]
pub struct Column {
    field: PriceField,
}

impl Column {
    pub fn new(field: PriceField) -> Self {
        Self { field }
    }
}

impl Indicator for Column {
    fn name(&self) -> &str {
        self.field.as_str()
    }

    fn periods(&self) -> Option<usize> {
        None
    }

    fn compute(&self, bars: &[Bar]) -> Result<FactorOutput, FactorError> {
        Ok(FactorOutput::Series(
            bars.iter().map(|b| b.field(self.field)).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{make_bars, Factor, FactorValue};

    #[test]
    fn column_passes_field_through() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let output = Column::new(PriceField::Close).compute(&bars).unwrap();
        assert_eq!(output.as_series().unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn column_steps_without_priming() {
        let bars = make_bars(&[1.0, 2.0]);
        let mut factor = Factor::new(Column::new(PriceField::Volume));
        assert_eq!(factor.periods(), None);
        assert_eq!(factor.name(), "volume");
        assert_eq!(
            factor.step(&bars[1]).unwrap(),
            FactorValue::Scalar(bars[1].volume)
        );
        assert!(factor.state().is_none());
    }
}
