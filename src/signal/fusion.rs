//! Signal fusion: combine the technical score, the AI opinion, and the
//! sentiment score into one weighted decision.
//!
//! Pure function of its inputs. Absent sources have their weight
//! redistributed proportionally across the present ones, so a missing feed
//! never biases the fused score toward neutral.

use tracing::debug;

use crate::error::EngineError;
use crate::models::{Direction, FusedSignal, Opinion, SentimentScore};
use crate::trading::FusionWeights;

use super::indicators::IndicatorSnapshot;

/// Fuse the available sources into one signal for this cycle.
///
/// Fails with `InsufficientSignal` when every source is absent; the caller
/// treats that as a no-trade cycle.
pub fn fuse(
    indicators: Option<&IndicatorSnapshot>,
    opinion: Option<&Opinion>,
    sentiment: Option<&SentimentScore>,
    weights: &FusionWeights,
) -> Result<FusedSignal, EngineError> {
    let (w_technical, w_ai, w_sentiment) = weights
        .normalized(
            indicators.is_some(),
            opinion.is_some(),
            sentiment.is_some(),
        )
        .ok_or(EngineError::InsufficientSignal)?;

    let mut weighted_score = 0.0;
    if let Some(snapshot) = indicators {
        weighted_score += w_technical * snapshot.technical_score();
    }
    if let Some(op) = opinion {
        weighted_score += w_ai * op.score();
    }
    if let Some(s) = sentiment {
        weighted_score += w_sentiment * s.value;
    }
    let weighted_score = weighted_score.clamp(-1.0, 1.0);

    let direction = if weighted_score.abs() < weights.dead_zone {
        Direction::Flat
    } else if weighted_score > 0.0 {
        Direction::Long
    } else {
        Direction::Short
    };

    debug!(
        score = weighted_score,
        direction = direction.as_str(),
        technical = indicators.is_some(),
        ai = opinion.is_some(),
        sentiment = sentiment.is_some(),
        "fused signal"
    );

    Ok(FusedSignal {
        direction,
        confidence: weighted_score.abs().clamp(0.0, 1.0),
        weighted_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceSeries;
    use crate::signal::indicators::IndicatorPeriods;
    use chrono::Utc;

    fn flat_snapshot() -> IndicatorSnapshot {
        // A uniform 96-sample series computes to the neutral snapshot.
        let candles = (0..96).map(|i| crate::models::Candle {
            timestamp: Utc::now() + chrono::Duration::seconds(i),
            open: rust_decimal_macros::dec!(100),
            high: rust_decimal_macros::dec!(100),
            low: rust_decimal_macros::dec!(100),
            close: rust_decimal_macros::dec!(100),
            volume: rust_decimal_macros::dec!(1),
        });
        let series = PriceSeries::from_candles(96, candles);
        IndicatorSnapshot::compute(&series, &IndicatorPeriods::default()).unwrap()
    }

    fn opinion(direction: &str, confidence: f64) -> Opinion {
        Opinion::validated(direction, confidence, String::new(), None, None).unwrap()
    }

    fn sentiment(value: f64) -> SentimentScore {
        SentimentScore::new(value, Utc::now())
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let weights = FusionWeights::default();
        let snap = flat_snapshot();
        let op = opinion("buy", 0.8);
        let s = sentiment(0.3);

        let a = fuse(Some(&snap), Some(&op), Some(&s), &weights).unwrap();
        let b = fuse(Some(&snap), Some(&op), Some(&s), &weights).unwrap();
        assert_eq!(a.weighted_score, b.weighted_score);
        assert_eq!(a.direction, b.direction);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn weight_conservation_with_absent_source() {
        let weights = FusionWeights::default();
        // Opinion and sentiment both fully bullish at 1.0: if the absent
        // technical weight is redistributed, the fused score is exactly 1.0.
        let op = opinion("buy", 1.0);
        let s = sentiment(1.0);
        let fused = fuse(None, Some(&op), Some(&s), &weights).unwrap();
        assert!((fused.weighted_score - 1.0).abs() < 1e-12);

        let (_, w_ai, w_sent) = weights.normalized(false, true, true).unwrap();
        assert!((w_ai + w_sent - 1.0).abs() < 1e-12);
    }

    #[test]
    fn single_source_carries_full_weight() {
        let weights = FusionWeights::default();
        let op = opinion("sell", 0.9);
        let fused = fuse(None, Some(&op), None, &weights).unwrap();
        assert!((fused.weighted_score + 0.9).abs() < 1e-12);
        assert_eq!(fused.direction, Direction::Short);
    }

    #[test]
    fn all_absent_is_insufficient() {
        let weights = FusionWeights::default();
        let err = fuse(None, None, None, &weights).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientSignal));
    }

    #[test]
    fn dead_zone_maps_to_flat() {
        let weights = FusionWeights::default();
        // Flat prices, no opinion, sentiment barely positive: the weighted
        // score stays inside the dead-zone.
        let snap = flat_snapshot();
        let s = sentiment(0.05);
        let fused = fuse(Some(&snap), None, Some(&s), &weights).unwrap();
        assert!(fused.weighted_score.abs() < weights.dead_zone);
        assert_eq!(fused.direction, Direction::Flat);
    }

    #[test]
    fn strong_agreement_is_directional() {
        let weights = FusionWeights::default();
        let op = opinion("buy", 0.9);
        let s = sentiment(0.8);
        let fused = fuse(None, Some(&op), Some(&s), &weights).unwrap();
        assert_eq!(fused.direction, Direction::Long);
        assert!(fused.confidence > weights.dead_zone);
    }
}
