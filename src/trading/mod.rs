//! Trading logic: configuration, sizing policy, position management.

mod config;
mod position_manager;

pub use config::{EngineConfig, FusionWeights, SizingConfig};
pub use position_manager::PositionManager;
