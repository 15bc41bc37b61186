//! Domain types shared by the cache, the factor engine and the simulation.

pub mod bar;
pub mod timeframe;

pub use bar::{Bar, PriceField};
pub use timeframe::{Timeframe, TimeframeError};
