//! Engine, sizing, and fusion-weight configuration.
//!
//! Loaded once at process start; never hot-reloaded. The numeric defaults
//! mirror the operator documentation figures and are one valid scenario, not
//! verified constants.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::signal::IndicatorPeriods;

/// Relative weights of the three fused sources plus the flat dead-zone.
///
/// The weights of present sources are renormalized to sum to 1.0 at fusion
/// time; the ~0.1 of mass they leave unclaimed is the risk-context share the
/// position manager applies through its own multipliers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionWeights {
    pub technical: f64,
    pub ai: f64,
    pub sentiment: f64,
    /// |weighted_score| below this is treated as no actionable signal.
    pub dead_zone: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            technical: 0.35,
            ai: 0.25,
            sentiment: 0.30,
            dead_zone: 0.15,
        }
    }
}

impl FusionWeights {
    /// Weights renormalized over the present sources; `None` when all three
    /// are absent. The returned triple always sums to 1.0 (absent slots 0).
    pub fn normalized(
        &self,
        has_technical: bool,
        has_ai: bool,
        has_sentiment: bool,
    ) -> Option<(f64, f64, f64)> {
        let technical = if has_technical { self.technical } else { 0.0 };
        let ai = if has_ai { self.ai } else { 0.0 };
        let sentiment = if has_sentiment { self.sentiment } else { 0.0 };

        let total = technical + ai + sentiment;
        if total <= 0.0 {
            return None;
        }
        Some((technical / total, ai / total, sentiment / total))
    }
}

/// Position sizing and risk policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Quote notional (USDT) base per order.
    pub base_amount: Decimal,

    /// Confidence bucket multipliers and thresholds.
    pub high_confidence_multiplier: Decimal,
    pub medium_confidence_multiplier: Decimal,
    pub low_confidence_multiplier: Decimal,
    pub high_confidence_threshold: f64,
    pub medium_confidence_threshold: f64,

    /// Trend multiplier range: floor + span * trend_strength.
    pub trend_multiplier_floor: Decimal,
    pub trend_multiplier_span: Decimal,

    /// Total position notional cap as a multiple of `base_amount`.
    pub max_position_ratio: Decimal,

    /// Minimum fused confidence to fully flip an opposite position.
    pub reversal_threshold: f64,

    /// Fraction of position notional shed on a weak opposite signal.
    pub reduce_fraction: Decimal,

    /// Stop-loss / take-profit as return fractions against entry.
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,

    /// Hard ceiling: total notional may never exceed equity * max_leverage.
    pub max_leverage: Decimal,

    /// Orders below this quote notional are not placed.
    pub min_order_size: Decimal,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            base_amount: dec!(5),
            high_confidence_multiplier: dec!(1.2),
            medium_confidence_multiplier: dec!(1.0),
            low_confidence_multiplier: dec!(0.5),
            high_confidence_threshold: 0.7,
            medium_confidence_threshold: 0.4,
            trend_multiplier_floor: dec!(0.8),
            trend_multiplier_span: dec!(0.4),
            max_position_ratio: dec!(2),
            reversal_threshold: 0.6,
            reduce_fraction: dec!(0.5),
            stop_loss_pct: dec!(0.02),
            take_profit_pct: dec!(0.05),
            max_leverage: dec!(10),
            min_order_size: dec!(1),
        }
    }
}

impl SizingConfig {
    /// Bucketized confidence multiplier (high / medium / low).
    pub fn confidence_multiplier(&self, confidence: f64) -> Decimal {
        if confidence >= self.high_confidence_threshold {
            self.high_confidence_multiplier
        } else if confidence >= self.medium_confidence_threshold {
            self.medium_confidence_multiplier
        } else {
            self.low_confidence_multiplier
        }
    }

    /// Trend multiplier scaling with indicator-derived trend magnitude.
    pub fn trend_multiplier(&self, trend_strength: f64) -> Decimal {
        let strength = Decimal::try_from(trend_strength.clamp(0.0, 1.0)).unwrap_or(Decimal::ZERO);
        self.trend_multiplier_floor + self.trend_multiplier_span * strength
    }

    /// Total notional cap.
    pub fn position_cap(&self) -> Decimal {
        self.base_amount * self.max_position_ratio
    }
}

/// Full static engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Instrument symbol, e.g. "BTC-USDT-SWAP".
    pub symbol: String,
    pub leverage: u32,
    /// Candle timeframe label, e.g. "15m".
    pub timeframe: String,
    /// Price series window length.
    pub window: usize,
    /// Cycle interval in seconds.
    pub interval_secs: u64,
    /// Per-source fetch timeout in seconds.
    pub source_timeout_secs: u64,
    /// Maximum retained history records.
    pub history_cap: i64,
    /// Simulate fills instead of submitting live orders.
    pub dry_run: bool,
    /// Simulated account equity used in dry-run mode.
    pub sim_equity: Decimal,
    pub periods: IndicatorPeriods,
    pub sizing: SizingConfig,
    pub weights: FusionWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: "BTC-USDT-SWAP".to_string(),
            leverage: 10,
            timeframe: "15m".to_string(),
            window: 96,
            interval_secs: 900,
            source_timeout_secs: 30,
            history_cap: 500,
            dry_run: true,
            sim_equity: dec!(1000),
            periods: IndicatorPeriods::default(),
            sizing: SizingConfig::default(),
            weights: FusionWeights::default(),
        }
    }
}

impl EngineConfig {
    /// Validate once at startup. Violations are fatal.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.symbol.is_empty() {
            return Err(EngineError::Configuration("symbol must not be empty".into()));
        }
        if self.leverage == 0 {
            return Err(EngineError::Configuration("leverage must be >= 1".into()));
        }
        if self.window == 0 {
            return Err(EngineError::Configuration("window must be >= 1".into()));
        }
        if self.interval_secs == 0 {
            return Err(EngineError::Configuration(
                "interval_secs must be >= 1".into(),
            ));
        }
        if self.history_cap <= 0 {
            return Err(EngineError::Configuration(
                "history_cap must be positive".into(),
            ));
        }
        let w = &self.weights;
        if w.technical < 0.0 || w.ai < 0.0 || w.sentiment < 0.0 {
            return Err(EngineError::Configuration(
                "fusion weights must be non-negative".into(),
            ));
        }
        if w.technical + w.ai + w.sentiment <= 0.0 {
            return Err(EngineError::Configuration(
                "at least one fusion weight must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&w.dead_zone) {
            return Err(EngineError::Configuration(
                "dead_zone must be in [0, 1)".into(),
            ));
        }
        let s = &self.sizing;
        if s.base_amount <= Decimal::ZERO {
            return Err(EngineError::Configuration(
                "base_amount must be positive".into(),
            ));
        }
        if s.max_position_ratio <= Decimal::ZERO {
            return Err(EngineError::Configuration(
                "max_position_ratio must be positive".into(),
            ));
        }
        if s.max_leverage <= Decimal::ZERO {
            return Err(EngineError::Configuration(
                "max_leverage must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&s.reversal_threshold) {
            return Err(EngineError::Configuration(
                "reversal_threshold must be in [0, 1]".into(),
            ));
        }
        if s.reduce_fraction <= Decimal::ZERO || s.reduce_fraction > Decimal::ONE {
            return Err(EngineError::Configuration(
                "reduce_fraction must be in (0, 1]".into(),
            ));
        }
        if s.stop_loss_pct <= Decimal::ZERO || s.take_profit_pct <= Decimal::ZERO {
            return Err(EngineError::Configuration(
                "stop-loss and take-profit percentages must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_configs_are_fatal() {
        let mut cfg = EngineConfig::default();
        cfg.symbol.clear();
        let err = cfg.validate().unwrap_err();
        assert!(err.is_fatal());

        let mut cfg = EngineConfig::default();
        cfg.weights.dead_zone = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.sizing.base_amount = Decimal::ZERO;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.sizing.reversal_threshold = 1.2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn confidence_buckets() {
        let sizing = SizingConfig::default();
        assert_eq!(sizing.confidence_multiplier(0.9), dec!(1.2));
        assert_eq!(sizing.confidence_multiplier(0.5), dec!(1.0));
        assert_eq!(sizing.confidence_multiplier(0.1), dec!(0.5));
    }

    #[test]
    fn trend_multiplier_range() {
        let sizing = SizingConfig::default();
        assert_eq!(sizing.trend_multiplier(0.0), dec!(0.8));
        assert_eq!(sizing.trend_multiplier(0.5), dec!(1.0));
        assert_eq!(sizing.trend_multiplier(1.0), dec!(1.2));
    }

    #[test]
    fn normalized_weights_sum_to_one() {
        let weights = FusionWeights::default();
        let (t, a, s) = weights.normalized(true, true, true).unwrap();
        assert!((t + a + s - 1.0).abs() < 1e-12);

        let (t, a, s) = weights.normalized(true, false, true).unwrap();
        assert_eq!(a, 0.0);
        assert!((t + s - 1.0).abs() < 1e-12);

        assert!(weights.normalized(false, false, false).is_none());
    }
}
