//! Signal pipeline: indicator computation and source fusion.

pub mod fusion;
pub mod indicators;

pub use fusion::fuse;
pub use indicators::{IndicatorPeriods, IndicatorSnapshot};
