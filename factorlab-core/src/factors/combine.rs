//! Arithmetic composition of factors.
//!
//! A [`Combined`] indicator applies one [`Operator`] pointwise to two
//! [`Operand`]s, each a finite scalar or another factor. Scalars broadcast
//! over rows; single series broadcast over the sub-columns of a multi-column
//! operand. Two multi-column operands must share column names.

use super::{Factor, FactorError, FactorOutput, Indicator};
use crate::domain::Bar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        }
    }

    pub fn apply(&self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Operator::Add => lhs + rhs,
            Operator::Sub => lhs - rhs,
            Operator::Mul => lhs * rhs,
            Operator::Div => lhs / rhs,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One side of a composition.
#[derive(Debug, Clone)]
pub enum Operand {
    Scalar(f64),
    Factor {
        name: String,
        indicator: Arc<dyn Indicator>,
    },
}

impl Operand {
    pub fn name(&self) -> String {
        match self {
            Operand::Scalar(v) => v.to_string(),
            Operand::Factor { name, .. } => name.clone(),
        }
    }

    fn periods(&self) -> Option<usize> {
        match self {
            Operand::Scalar(_) => None,
            Operand::Factor { indicator, .. } => indicator.periods(),
        }
    }

    fn columns(&self) -> Option<Vec<String>> {
        match self {
            Operand::Scalar(_) => None,
            Operand::Factor { indicator, .. } => indicator.columns(),
        }
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Scalar(value)
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Scalar(f64::from(value))
    }
}

impl From<&Factor> for Operand {
    fn from(factor: &Factor) -> Self {
        Operand::Factor {
            name: factor.name().to_string(),
            indicator: Arc::clone(factor.indicator()),
        }
    }
}

impl From<Factor> for Operand {
    fn from(factor: Factor) -> Self {
        Operand::from(&factor)
    }
}

/// Derived indicator: `lhs <op> rhs`, evaluated row by row.
#[derive(Debug, Clone)]
pub struct Combined {
    name: String,
    lhs: Operand,
    op: Operator,
    rhs: Operand,
    periods: Option<usize>,
    columns: Option<Vec<String>>,
}

impl Combined {
    pub fn new(lhs: Operand, op: Operator, rhs: Operand) -> Result<Self, FactorError> {
        for side in [&lhs, &rhs] {
            if let Operand::Scalar(v) = side {
                if !v.is_finite() {
                    return Err(FactorError::UnsupportedOperand(format!(
                        "scalar operand must be finite, got {v}"
                    )));
                }
            }
        }
        if matches!((&lhs, &rhs), (Operand::Scalar(_), Operand::Scalar(_))) {
            return Err(FactorError::UnsupportedOperand(format!(
                "cannot combine two scalars ({} {op} {})",
                lhs.name(),
                rhs.name()
            )));
        }

        let columns = match (lhs.columns(), rhs.columns()) {
            (Some(l), Some(r)) if l != r => {
                return Err(FactorError::UnsupportedOperand(format!(
                    "{} and {} have different columns: {l:?} vs {r:?}",
                    lhs.name(),
                    rhs.name()
                )));
            }
            (l, r) => l.or(r),
        };

        let periods = match (lhs.periods(), rhs.periods()) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        Ok(Self {
            name: format!("({} {op} {})", lhs.name(), rhs.name()),
            lhs,
            op,
            rhs,
            periods,
            columns,
        })
    }

    pub fn operator(&self) -> Operator {
        self.op
    }
}

enum Evaluated {
    Scalar(f64),
    Output(FactorOutput),
}

impl Evaluated {
    fn of(operand: &Operand, bars: &[Bar]) -> Result<Self, FactorError> {
        match operand {
            Operand::Scalar(v) => Ok(Evaluated::Scalar(*v)),
            Operand::Factor { indicator, .. } => Ok(Evaluated::Output(indicator.compute(bars)?)),
        }
    }

    /// Values for `column` (or the single series when `None`), broadcast to `len` rows.
    fn values(&self, column: Option<&str>, len: usize) -> Result<Vec<f64>, FactorError> {
        match self {
            Evaluated::Scalar(v) => Ok(vec![*v; len]),
            Evaluated::Output(FactorOutput::Series(values)) => Ok(values.clone()),
            Evaluated::Output(FactorOutput::Columns(columns)) => column
                .and_then(|c| columns.get(c))
                .cloned()
                .ok_or_else(|| {
                    FactorError::UnsupportedOperand(format!(
                        "operand has no column '{}'",
                        column.unwrap_or_default()
                    ))
                }),
        }
    }
}

impl Indicator for Combined {
    fn name(&self) -> &str {
        &self.name
    }

    fn periods(&self) -> Option<usize> {
        self.periods
    }

    fn columns(&self) -> Option<Vec<String>> {
        self.columns.clone()
    }

    fn compute(&self, bars: &[Bar]) -> Result<FactorOutput, FactorError> {
        let lhs = Evaluated::of(&self.lhs, bars)?;
        let rhs = Evaluated::of(&self.rhs, bars)?;
        let len = bars.len();
        let combine = |column: Option<&str>| -> Result<Vec<f64>, FactorError> {
            let l = lhs.values(column, len)?;
            let r = rhs.values(column, len)?;
            Ok(l.iter().zip(&r).map(|(&a, &b)| self.op.apply(a, b)).collect())
        };

        match &self.columns {
            None => Ok(FactorOutput::Series(combine(None)?)),
            Some(columns) => columns
                .iter()
                .map(|c| Ok((c.clone(), combine(Some(c.as_str()))?)))
                .collect::<Result<_, FactorError>>()
                .map(FactorOutput::Columns),
        }
    }
}
