//! Durable observation records: the latest-wins robot status and the
//! append-only signal history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::position::Position;
use super::signal::{FusedSignal, OrderIntent};

/// How a cycle's order intent ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOutcome {
    /// No order was needed (noop intent or no-trade cycle).
    NoTrade,
    /// Dry-run mode: the fill was simulated at the market price.
    Simulated,
    /// Live order confirmed filled.
    Filled,
    /// Submission rejected or failed; position unchanged.
    Failed,
}

impl ExecutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoTrade => "no_trade",
            Self::Simulated => "simulated",
            Self::Filled => "filled",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "no_trade" => Some(Self::NoTrade),
            "simulated" => Some(Self::Simulated),
            "filled" => Some(Self::Filled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One cycle's decision trail: signal, intent, resulting position, outcome.
/// Created once per cycle, never mutated, trimmed FIFO past the history cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalHistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub signal: FusedSignal,
    pub intent: OrderIntent,
    pub position: Position,
    pub outcome: ExecutionOutcome,
    /// Operator-facing detail (rejection reason, risk note).
    pub detail: Option<String>,
}

/// Latest-wins snapshot read by the monitoring surface, overwritten every
/// cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotStatus {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub equity: Decimal,
    pub position: Position,
    pub last_signal: Option<FusedSignal>,
    /// False when the most recent cycle degraded after inputs were fetched.
    pub healthy: bool,
    pub degraded_reason: Option<String>,
}

impl RobotStatus {
    pub fn healthy(
        price: Decimal,
        equity: Decimal,
        position: Position,
        last_signal: Option<FusedSignal>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            price,
            equity,
            position,
            last_signal,
            healthy: true,
            degraded_reason: None,
        }
    }

    pub fn degraded(
        price: Decimal,
        equity: Decimal,
        position: Position,
        last_signal: Option<FusedSignal>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            price,
            equity,
            position,
            last_signal,
            healthy: false,
            degraded_reason: Some(reason.into()),
        }
    }
}
