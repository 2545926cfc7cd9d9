//! Engine error taxonomy.
//!
//! Everything except `Configuration` is recoverable at the cycle boundary:
//! the scheduler logs it and resumes on the next tick.

use std::fmt;

#[derive(Debug)]
pub enum EngineError {
    /// A signal source timed out or errored; the source is treated as absent
    /// for the current cycle.
    InputUnavailable { source: &'static str, reason: String },

    /// Every signal source was absent; the cycle is a no-trade cycle.
    InsufficientSignal,

    /// Sizing would breach the leverage or position caps.
    RiskViolation(String),

    /// Order submission was rejected or failed; the position is unchanged.
    Execution(String),

    /// State store write failed. The in-memory position survives, but the
    /// monitoring surface now reflects stale data.
    Persistence(sqlx::Error),

    /// Invalid static configuration. Fatal: the process does not start.
    Configuration(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputUnavailable { source, reason } => {
                write!(f, "signal source '{source}' unavailable: {reason}")
            }
            Self::InsufficientSignal => write!(f, "no signal sources available this cycle"),
            Self::RiskViolation(msg) => write!(f, "risk violation: {msg}"),
            Self::Execution(msg) => write!(f, "order execution failed: {msg}"),
            Self::Persistence(_) => write!(f, "state store operation failed"),
            Self::Configuration(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Persistence(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err)
    }
}

impl EngineError {
    pub fn unavailable(source: &'static str, reason: impl Into<String>) -> Self {
        Self::InputUnavailable {
            source,
            reason: reason.into(),
        }
    }

    /// Only configuration errors abort the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
