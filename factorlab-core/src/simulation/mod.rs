//! Streaming train/test simulation over a cached series.

pub mod config;
pub mod driver;
pub mod history;

pub use config::{DataConfig, SimulationConfig, TimePoint};
pub use driver::{Phase, SimulationDriver, TestStream};
pub use history::{Record, RollingHistory};

use crate::data::DataError;
use crate::pipeline::PipelineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("test() requires a completed train()")]
    NotTrainedYet,

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("invalid simulation config: {0}")]
    Config(String),
}
