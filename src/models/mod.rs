//! Data models: price series, signal-source inputs, fused signals, the
//! position, and durable status records.

mod candle;
mod opinion;
mod position;
mod signal;
mod status;

pub use candle::{Candle, PriceSeries};
pub use opinion::{Direction, Opinion, SentimentScore};
pub use position::{Position, PositionSide};
pub use signal::{FillResult, FusedSignal, OrderAction, OrderIntent};
pub use status::{ExecutionOutcome, RobotStatus, SignalHistoryRecord};
