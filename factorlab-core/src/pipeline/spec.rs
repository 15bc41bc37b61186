//! Serializable pipeline trees for simulation configs.
//!
//! ```toml
//! [pipeline]
//! name = "signals"
//!
//! [[pipeline.children]]
//! kind = "moving_average"
//! periods = 20
//!
//! [[pipeline.children]]
//! name = "momentum"
//! children = [{ kind = "rsi" }, { kind = "macd", fast_period = 12, slow_period = 26 }]
//! ```

use super::{PipelineError, PipelineNode};
use crate::factors::FactorSpec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineSpec {
    Branch {
        name: String,
        children: Vec<PipelineSpec>,
    },
    Leaf(FactorSpec),
}

impl PipelineSpec {
    pub fn build(&self) -> Result<PipelineNode, PipelineError> {
        match self {
            PipelineSpec::Leaf(spec) => {
                let factor = spec.build().map_err(|source| PipelineError::Factor {
                    factor: spec.label().to_string(),
                    source,
                })?;
                Ok(PipelineNode::leaf(factor))
            }
            PipelineSpec::Branch { name, children } => {
                let children = children
                    .iter()
                    .map(PipelineSpec::build)
                    .collect::<Result<Vec<_>, _>>()?;
                PipelineNode::branch(name.clone(), children)
            }
        }
    }
}
