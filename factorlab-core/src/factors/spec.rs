//! Serializable factor descriptions, as they appear in simulation configs.
//!
//! ```toml
//! kind = "combine"
//! op = "sub"
//! lhs = { kind = "column", field = "close" }
//! rhs = { kind = "moving_average", periods = 20 }
//! name = "close_vs_ma"
//! ```

use super::rsi::DEFAULT_RSI_PERIODS;
use super::{Column, Factor, FactorError, Macd, MovingAverage, Operand, Operator, Rsi, Vwap};
use crate::domain::PriceField;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorSpec {
    #[serde(flatten)]
    pub kind: FactorKind,
    /// Output name override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FactorKind {
    MovingAverage {
        periods: usize,
        #[serde(default = "default_field")]
        on: PriceField,
    },
    Rsi {
        #[serde(default = "default_rsi_periods")]
        periods: usize,
    },
    Vwap {
        periods: usize,
    },
    Macd {
        fast_period: usize,
        slow_period: usize,
        #[serde(default = "default_field")]
        on: PriceField,
    },
    Column {
        field: PriceField,
    },
    /// `lhs <op> rhs`; each operand is a number or a nested factor table.
    Combine {
        op: Operator,
        lhs: toml::Value,
        rhs: toml::Value,
    },
}

fn default_field() -> PriceField {
    PriceField::Close
}

fn default_rsi_periods() -> usize {
    DEFAULT_RSI_PERIODS
}

impl FactorKind {
    pub fn label(&self) -> &'static str {
        match self {
            FactorKind::MovingAverage { .. } => "moving_average",
            FactorKind::Rsi { .. } => "rsi",
            FactorKind::Vwap { .. } => "vwap",
            FactorKind::Macd { .. } => "macd",
            FactorKind::Column { .. } => "column",
            FactorKind::Combine { .. } => "combine",
        }
    }
}

impl FactorSpec {
    pub fn new(kind: FactorKind) -> Self {
        Self { kind, name: None }
    }

    /// Output name override, else the factor kind.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.label())
    }

    /// Build the runtime factor.
    pub fn build(&self) -> Result<Factor, FactorError> {
        let factor = match &self.kind {
            FactorKind::MovingAverage { periods, on } => {
                Factor::new(MovingAverage::new(*periods, *on)?)
            }
            FactorKind::Rsi { periods } => Factor::new(Rsi::new(*periods)?),
            FactorKind::Vwap { periods } => Factor::new(Vwap::new(*periods)?),
            FactorKind::Macd {
                fast_period,
                slow_period,
                on,
            } => Factor::new(Macd::new(*fast_period, *slow_period, *on)?),
            FactorKind::Column { field } => Factor::new(Column::new(*field)),
            FactorKind::Combine { op, lhs, rhs } => {
                Factor::combine(Operand::try_from(lhs)?, *op, Operand::try_from(rhs)?)?
            }
        };
        Ok(match &self.name {
            Some(name) => factor.renamed(name.clone()),
            None => factor,
        })
    }
}

impl TryFrom<&toml::Value> for Operand {
    type Error = FactorError;

    fn try_from(value: &toml::Value) -> Result<Self, Self::Error> {
        match value {
            toml::Value::Integer(i) => Ok(Operand::Scalar(*i as f64)),
            toml::Value::Float(f) => Ok(Operand::Scalar(*f)),
            toml::Value::Table(_) => {
                let spec: FactorSpec = value.clone().try_into().map_err(|e| {
                    FactorError::UnsupportedOperand(format!("invalid factor table: {e}"))
                })?;
                Ok(Operand::from(spec.build()?))
            }
            other => Err(FactorError::UnsupportedOperand(format!(
                "expected a number or a factor table, got {}",
                other.type_str()
            ))),
        }
    }
}
