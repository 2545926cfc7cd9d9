//! OHLCV candles and the bounded price series window.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Ordered OHLCV window of at most `window` candles.
///
/// Timestamps are strictly increasing; pushing past the window drops the
/// oldest sample.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    window: usize,
    candles: VecDeque<Candle>,
}

impl PriceSeries {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            candles: VecDeque::with_capacity(window),
        }
    }

    /// Build a series from candles in ascending time order, keeping the most
    /// recent `window` samples.
    pub fn from_candles(window: usize, candles: impl IntoIterator<Item = Candle>) -> Self {
        let mut series = Self::new(window);
        for candle in candles {
            series.push(candle);
        }
        series
    }

    /// Append a candle. Returns `false` (sample dropped) when the timestamp
    /// does not advance past the newest held candle.
    pub fn push(&mut self, candle: Candle) -> bool {
        if let Some(last) = self.candles.back() {
            if candle.timestamp <= last.timestamp {
                return false;
            }
        }
        if self.candles.len() == self.window {
            self.candles.pop_front();
        }
        self.candles.push_back(candle);
        true
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn last_close(&self) -> Option<Decimal> {
        self.candles.back().map(|c| c.close)
    }

    /// Close prices, oldest first, as f64 for indicator math.
    pub fn closes(&self) -> Vec<f64> {
        self.candles
            .iter()
            .map(|c| c.close.to_f64().unwrap_or(0.0))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn candle(minute: u32, close: Decimal) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
        }
    }

    #[test]
    fn window_never_exceeded() {
        let mut series = PriceSeries::new(3);
        for i in 0..10 {
            series.push(candle(i, dec!(100)));
        }
        assert_eq!(series.len(), 3);
        // Oldest dropped: the window holds minutes 7, 8, 9.
        assert_eq!(series.last().unwrap().timestamp.timestamp() % 600 / 60, 9);
    }

    #[test]
    fn rejects_non_increasing_timestamps() {
        let mut series = PriceSeries::new(10);
        assert!(series.push(candle(5, dec!(100))));
        assert!(!series.push(candle(5, dec!(101))));
        assert!(!series.push(candle(4, dec!(102))));
        assert_eq!(series.len(), 1);
        assert_eq!(series.last_close(), Some(dec!(100)));
    }
}
