//! Indicator engine: pure technical-indicator math over one price series.
//!
//! Produces one immutable [`IndicatorSnapshot`] per cycle. No I/O; indicator
//! scalars are plain f64 since they are derived values, not money.

use serde::{Deserialize, Serialize};

use crate::models::PriceSeries;

/// Lookback periods for the indicator set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorPeriods {
    pub ma_short: usize,
    pub ma_long: usize,
    pub rsi: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger: usize,
}

impl Default for IndicatorPeriods {
    fn default() -> Self {
        Self {
            ma_short: 20,
            ma_long: 50,
            rsi: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger: 20,
        }
    }
}

impl IndicatorPeriods {
    /// Minimum series length needed to fill every indicator.
    pub fn min_samples(&self) -> usize {
        self.ma_long
            .max(self.macd_slow + self.macd_signal)
            .max(self.rsi + 1)
            .max(self.bollinger)
    }
}

/// Derived scalars computed from exactly one price series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub ma_short: f64,
    pub ma_long: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub bollinger_upper: f64,
    pub bollinger_middle: f64,
    pub bollinger_lower: f64,
    pub last_close: f64,
}

impl IndicatorSnapshot {
    /// Compute the full snapshot, or `None` when the series is too short.
    pub fn compute(series: &PriceSeries, periods: &IndicatorPeriods) -> Option<Self> {
        let closes = series.closes();
        if closes.len() < periods.min_samples() {
            return None;
        }

        let last_close = *closes.last()?;
        let ma_short = sma(&closes, periods.ma_short)?;
        let ma_long = sma(&closes, periods.ma_long)?;
        let rsi = rsi(&closes, periods.rsi)?;
        let (macd, macd_signal, macd_histogram) = macd(
            &closes,
            periods.macd_fast,
            periods.macd_slow,
            periods.macd_signal,
        )?;
        let (bollinger_upper, bollinger_middle, bollinger_lower) =
            bollinger(&closes, periods.bollinger)?;

        Some(Self {
            ma_short,
            ma_long,
            rsi,
            macd,
            macd_signal,
            macd_histogram,
            bollinger_upper,
            bollinger_middle,
            bollinger_lower,
            last_close,
        })
    }

    /// Technical sub-score in [-1, 1]: the mean of four equally weighted
    /// votes (MA crossover, RSI bands, MACD histogram, Bollinger position).
    pub fn technical_score(&self) -> f64 {
        let votes = [
            self.ma_vote(),
            self.rsi_vote(),
            self.macd_vote(),
            self.bollinger_vote(),
        ];
        let score = votes.iter().sum::<f64>() / votes.len() as f64;
        score.clamp(-1.0, 1.0)
    }

    /// Trend magnitude in [0, 1] derived from the MA spread. A 1% spread
    /// between the short and long averages saturates the scale.
    pub fn trend_strength(&self) -> f64 {
        if self.ma_long == 0.0 {
            return 0.0;
        }
        let spread = (self.ma_short - self.ma_long).abs() / self.ma_long;
        (spread / 0.01).clamp(0.0, 1.0)
    }

    // Short MA above long MA is bullish; a 1% spread saturates the vote.
    fn ma_vote(&self) -> f64 {
        if self.ma_long == 0.0 {
            return 0.0;
        }
        let spread = (self.ma_short - self.ma_long) / self.ma_long;
        (spread / 0.01).clamp(-1.0, 1.0)
    }

    // Oversold (RSI 30) votes long, overbought (RSI 70) votes short.
    fn rsi_vote(&self) -> f64 {
        ((50.0 - self.rsi) / 20.0).clamp(-1.0, 1.0)
    }

    // Histogram sign relative to price; 0.5% of price saturates the vote.
    fn macd_vote(&self) -> f64 {
        if self.last_close == 0.0 {
            return 0.0;
        }
        let scale = self.last_close * 0.005;
        (self.macd_histogram / scale).clamp(-1.0, 1.0)
    }

    // Price near the lower band votes long, near the upper band votes short.
    fn bollinger_vote(&self) -> f64 {
        let half_width = self.bollinger_upper - self.bollinger_middle;
        if half_width <= 0.0 {
            return 0.0;
        }
        let b = (self.last_close - self.bollinger_middle) / half_width;
        (-b).clamp(-1.0, 1.0)
    }
}

fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let tail = &values[values.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}

/// Full EMA series, seeded with the first value.
fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = match values.first() {
        Some(&v) => v,
        None => return out,
    };
    out.push(prev);
    for &value in &values[1..] {
        prev = value * k + prev * (1.0 - k);
        out.push(prev);
    }
    out
}

/// Wilder-smoothed RSI. A series without any gains or losses reads 50.
fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for pair in values[..=period].windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += -change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    for pair in values[period..].windows(2) {
        let change = pair[1] - pair[0];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_gain + avg_loss == 0.0 {
        return Some(50.0);
    }
    let rs = avg_gain / avg_loss.max(f64::EPSILON);
    Some(100.0 - 100.0 / (1.0 + rs))
}

fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Option<(f64, f64, f64)> {
    if values.len() < slow + signal {
        return None;
    }
    let fast_ema = ema_series(values, fast);
    let slow_ema = ema_series(values, slow);
    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema_series(&macd_line, signal);

    let macd = *macd_line.last()?;
    let sig = *signal_line.last()?;
    Some((macd, sig, macd - sig))
}

fn bollinger(values: &[f64], period: usize) -> Option<(f64, f64, f64)> {
    let middle = sma(values, period)?;
    let tail = &values[values.len() - period..];
    let variance = tail.iter().map(|v| (v - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();
    Some((middle + 2.0 * std_dev, middle, middle - 2.0 * std_dev))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn series_from(closes: &[f64]) -> PriceSeries {
        let candles = closes.iter().enumerate().map(|(i, &close)| {
            let close = Decimal::try_from(close).unwrap();
            Candle {
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: Decimal::ONE,
            }
        });
        PriceSeries::from_candles(200, candles)
    }

    #[test]
    fn too_short_series_yields_none() {
        let series = series_from(&[100.0; 10]);
        assert!(IndicatorSnapshot::compute(&series, &IndicatorPeriods::default()).is_none());
    }

    #[test]
    fn flat_series_is_neutral() {
        let series = series_from(&[100.0; 96]);
        let snap = IndicatorSnapshot::compute(&series, &IndicatorPeriods::default()).unwrap();

        assert_eq!(snap.ma_short, 100.0);
        assert_eq!(snap.ma_long, 100.0);
        assert_eq!(snap.rsi, 50.0);
        assert!(snap.macd_histogram.abs() < 1e-9);
        assert!(snap.technical_score().abs() < 1e-9);
        assert_eq!(snap.trend_strength(), 0.0);
    }

    #[test]
    fn uptrend_scores_positive() {
        let closes: Vec<f64> = (0..96).map(|i| 100.0 + i as f64 * 0.5).collect();
        let series = series_from(&closes);
        let snap = IndicatorSnapshot::compute(&series, &IndicatorPeriods::default()).unwrap();

        assert!(snap.ma_short > snap.ma_long);
        assert!(snap.rsi > 50.0);
        assert!(snap.ma_vote() > 0.0);
        assert!(snap.macd_vote() > 0.0);
        assert!(snap.trend_strength() > 0.5);
    }

    #[test]
    fn downtrend_scores_negative() {
        let closes: Vec<f64> = (0..96).map(|i| 200.0 - i as f64 * 0.5).collect();
        let series = series_from(&closes);
        let snap = IndicatorSnapshot::compute(&series, &IndicatorPeriods::default()).unwrap();

        assert!(snap.ma_short < snap.ma_long);
        assert!(snap.rsi < 50.0);
        assert!(snap.ma_vote() < 0.0);
    }

    #[test]
    fn determinism() {
        let closes: Vec<f64> = (0..96).map(|i| 100.0 + (i as f64).sin()).collect();
        let series = series_from(&closes);
        let periods = IndicatorPeriods::default();
        let a = IndicatorSnapshot::compute(&series, &periods).unwrap();
        let b = IndicatorSnapshot::compute(&series, &periods).unwrap();
        assert_eq!(a.technical_score(), b.technical_score());
        assert_eq!(a.rsi, b.rsi);
        assert_eq!(a.macd, b.macd);
    }
}
