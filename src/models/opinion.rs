//! Validated signal-source inputs: trade direction, the AI opinion, and the
//! market sentiment score.
//!
//! Both the opinion and the sentiment score arrive from external services and
//! are untrusted until they pass through the constructors here.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Trade direction carried by signals and intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    Flat,
}

impl Direction {
    /// Parse the direction labels external services use. The AI endpoint
    /// answers BUY/SELL/HOLD (original prompt contract); long/short/flat are
    /// accepted for stored records.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "long" | "buy" => Some(Self::Long),
            "short" | "sell" => Some(Self::Short),
            "flat" | "hold" | "none" => Some(Self::Flat),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
            Self::Flat => "flat",
        }
    }

    /// Sign on the [-1, 1] score axis.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
            Self::Flat => 0.0,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
            Self::Flat => Self::Flat,
        }
    }
}

/// Structured trade opinion from the AI endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opinion {
    pub direction: Direction,
    /// Confidence in [0, 1], clamped on ingest.
    pub confidence: f64,
    pub rationale: String,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

impl Opinion {
    /// Validate a raw AI reply into a strict opinion. Unknown direction
    /// labels fail as `InputUnavailable`; confidence is range-clamped.
    pub fn validated(
        direction: &str,
        confidence: f64,
        rationale: String,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<Self, EngineError> {
        let direction = Direction::parse(direction).ok_or_else(|| {
            EngineError::unavailable("ai_opinion", format!("unknown direction '{direction}'"))
        })?;
        if !confidence.is_finite() {
            return Err(EngineError::unavailable(
                "ai_opinion",
                "non-finite confidence",
            ));
        }
        Ok(Self {
            direction,
            confidence: confidence.clamp(0.0, 1.0),
            rationale,
            stop_loss,
            take_profit,
        })
    }

    /// Opinion contribution on the [-1, 1] score axis.
    pub fn score(&self) -> f64 {
        self.direction.sign() * self.confidence
    }
}

/// Market sentiment scalar with its freshness timestamp.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SentimentScore {
    /// Bearish (-1) .. bullish (+1), clamped on ingest.
    pub value: f64,
    pub as_of: DateTime<Utc>,
}

impl SentimentScore {
    pub fn new(value: f64, as_of: DateTime<Utc>) -> Self {
        let value = if value.is_finite() {
            value.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        Self { value, as_of }
    }

    /// Sentiment older than one cycle interval is discarded.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.as_of > max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn opinion_validation_clamps_and_parses() {
        let op = Opinion::validated("BUY", 1.7, "breakout".into(), Some(dec!(95)), None).unwrap();
        assert_eq!(op.direction, Direction::Long);
        assert_eq!(op.confidence, 1.0);
        assert_eq!(op.score(), 1.0);

        let op = Opinion::validated("hold", -0.3, String::new(), None, None).unwrap();
        assert_eq!(op.direction, Direction::Flat);
        assert_eq!(op.confidence, 0.0);
    }

    #[test]
    fn malformed_direction_is_unavailable() {
        let err = Opinion::validated("sideways", 0.5, String::new(), None, None).unwrap_err();
        assert!(matches!(err, EngineError::InputUnavailable { .. }));
    }

    #[test]
    fn sentiment_staleness() {
        let now = Utc::now();
        let fresh = SentimentScore::new(0.4, now - Duration::seconds(60));
        let stale = SentimentScore::new(0.4, now - Duration::seconds(1000));
        let max_age = Duration::seconds(900);
        assert!(!fresh.is_stale(now, max_age));
        assert!(stale.is_stale(now, max_age));
    }
}
