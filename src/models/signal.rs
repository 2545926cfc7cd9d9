//! Per-cycle decision artifacts: the fused signal, the order intent it turns
//! into, and the fill that confirms execution.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::opinion::Direction;

/// The single combined trading signal for one cycle. Never mutated after
/// creation; the sole input to the position manager.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FusedSignal {
    pub direction: Direction,
    /// |weighted_score| clamped to [0, 1].
    pub confidence: f64,
    pub weighted_score: f64,
}

/// Bounded action the position manager can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderAction {
    Noop,
    Open,
    Add,
    Reduce,
    Close,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Open => "open",
            Self::Add => "add",
            Self::Reduce => "reduce",
            Self::Close => "close",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "noop" => Some(Self::Noop),
            "open" => Some(Self::Open),
            "add" => Some(Self::Add),
            "reduce" => Some(Self::Reduce),
            "close" => Some(Self::Close),
            _ => None,
        }
    }
}

/// Ephemeral order request, consumed immediately by the execution gateway.
/// `size_delta` is quote notional (USDT).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderIntent {
    pub action: OrderAction,
    pub direction: Direction,
    pub size_delta: Decimal,
}

impl OrderIntent {
    pub fn noop() -> Self {
        Self {
            action: OrderAction::Noop,
            direction: Direction::Flat,
            size_delta: Decimal::ZERO,
        }
    }

    pub fn open(direction: Direction, size_delta: Decimal) -> Self {
        Self {
            action: OrderAction::Open,
            direction,
            size_delta,
        }
    }

    pub fn add(direction: Direction, size_delta: Decimal) -> Self {
        Self {
            action: OrderAction::Add,
            direction,
            size_delta,
        }
    }

    pub fn reduce(direction: Direction, size_delta: Decimal) -> Self {
        Self {
            action: OrderAction::Reduce,
            direction,
            size_delta,
        }
    }

    pub fn close(direction: Direction, size_delta: Decimal) -> Self {
        Self {
            action: OrderAction::Close,
            direction,
            size_delta,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.action == OrderAction::Noop
    }
}

/// Confirmed fill from the execution gateway. `filled_size` is in base units.
#[derive(Debug, Clone, Copy)]
pub struct FillResult {
    pub filled_size: Decimal,
    pub avg_price: Decimal,
}
