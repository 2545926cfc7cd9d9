//! Exchange client: market data, account state, and order execution.
//!
//! In dry-run mode orders are never sent; fills are simulated at the
//! observed price and account equity is a configured constant.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::models::{Candle, Direction, FillResult, OrderAction, OrderIntent, Position, PositionSide};

use super::types::{
    BalanceResponse, CandleRow, LeverageRequest, LivePositionRow, OrderRequest, OrderResponse,
    TickerResponse,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct ExchangeClient {
    client: Client,
    base_url: String,
    token: String,
    dry_run: bool,
    sim_equity: Decimal,
}

impl ExchangeClient {
    pub fn new(
        base_url: String,
        token: String,
        dry_run: bool,
        sim_equity: Decimal,
    ) -> Result<Self, EngineError> {
        if !dry_run && token.is_empty() {
            return Err(EngineError::Configuration(
                "exchange API token required for live trading".into(),
            ));
        }
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token,
            dry_run,
            sim_equity,
        })
    }

    /// Fetch the most recent candles, oldest first.
    pub async fn get_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, EngineError> {
        let url = format!(
            "{}/market/candles?symbol={}&bar={}&limit={}",
            self.base_url, symbol, timeframe, limit
        );
        debug!(url = %url, "fetching candles");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::unavailable("exchange", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::unavailable(
                "exchange",
                format!("candles request failed: {status} - {body}"),
            ));
        }

        let rows: Vec<CandleRow> = response
            .json()
            .await
            .map_err(|e| EngineError::unavailable("exchange", format!("bad candle payload: {e}")))?;

        let mut candles: Vec<Candle> = rows
            .into_iter()
            .filter_map(|row| {
                let timestamp = Utc.timestamp_millis_opt(row.ts).single()?;
                Some(Candle {
                    timestamp,
                    open: row.open,
                    high: row.high,
                    low: row.low,
                    close: row.close,
                    volume: row.volume,
                })
            })
            .collect();
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    /// Last traded price.
    pub async fn get_price(&self, symbol: &str) -> Result<Decimal, EngineError> {
        let url = format!("{}/market/ticker?symbol={}", self.base_url, symbol);
        debug!(url = %url, "fetching ticker");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::unavailable("exchange", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(EngineError::unavailable(
                "exchange",
                format!("ticker request failed: {status}"),
            ));
        }

        let ticker: TickerResponse = response
            .json()
            .await
            .map_err(|e| EngineError::unavailable("exchange", format!("bad ticker payload: {e}")))?;
        Ok(ticker.last)
    }

    /// Account equity in quote currency.
    pub async fn get_equity(&self) -> Result<Decimal, EngineError> {
        if self.dry_run {
            return Ok(self.sim_equity);
        }
        let url = format!("{}/account/balance", self.base_url);
        let response = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(|e| EngineError::unavailable("exchange", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(EngineError::unavailable(
                "exchange",
                format!("balance request failed: {status}"),
            ));
        }

        let balance: BalanceResponse = response
            .json()
            .await
            .map_err(|e| EngineError::unavailable("exchange", format!("bad balance payload: {e}")))?;
        Ok(balance.equity)
    }

    /// Live position on the exchange, `None` when flat or in dry-run mode.
    pub async fn get_live_position(&self, symbol: &str) -> Result<Option<Position>, EngineError> {
        if self.dry_run {
            return Ok(None);
        }
        let url = format!("{}/account/position?symbol={}", self.base_url, symbol);
        let response = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(|e| EngineError::unavailable("exchange", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(EngineError::unavailable(
                "exchange",
                format!("position request failed: {status}"),
            ));
        }

        let rows: Vec<LivePositionRow> = response
            .json()
            .await
            .map_err(|e| EngineError::unavailable("exchange", format!("bad position payload: {e}")))?;

        let Some(row) = rows.into_iter().find(|r| r.size > Decimal::ZERO) else {
            return Ok(None);
        };
        let Some(direction) = PositionSide::parse(&row.side) else {
            return Ok(None);
        };
        if direction == PositionSide::None {
            return Ok(None);
        }
        Ok(Some(Position {
            direction,
            size: row.size,
            entry_price: row.avg_entry_price,
            unrealized_pnl: Decimal::ZERO,
            accumulated_cost: if row.notional > Decimal::ZERO {
                row.notional
            } else {
                row.size * row.avg_entry_price
            },
        }))
    }

    /// Configure instrument leverage. No-op in dry-run mode.
    pub async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), EngineError> {
        if self.dry_run {
            debug!(symbol, leverage, "dry-run: skipping leverage setup");
            return Ok(());
        }
        let url = format!("{}/account/leverage", self.base_url);
        let request = LeverageRequest {
            symbol: symbol.to_string(),
            leverage,
        };
        let response = self
            .authed(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::Execution(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Execution(format!(
                "leverage request failed: {status} - {body}"
            )));
        }
        Ok(())
    }

    /// Submit one intent as a market order and return the confirmed fill.
    pub async fn submit(
        &self,
        symbol: &str,
        intent: &OrderIntent,
        price: Decimal,
    ) -> Result<FillResult, EngineError> {
        if price <= Decimal::ZERO {
            return Err(EngineError::Execution("non-positive reference price".into()));
        }

        if self.dry_run {
            let fill = FillResult {
                filled_size: intent.size_delta / price,
                avg_price: price,
            };
            info!(
                action = intent.action.as_str(),
                direction = intent.direction.as_str(),
                notional = %intent.size_delta,
                price = %price,
                "dry-run: simulated fill"
            );
            return Ok(fill);
        }

        let request = OrderRequest {
            client_order_id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side: order_side(intent).to_string(),
            notional: intent.size_delta,
            reduce_only: matches!(intent.action, OrderAction::Reduce | OrderAction::Close),
        };

        let url = format!("{}/trade/order", self.base_url);
        let response = self
            .authed(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::Execution(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Execution(format!(
                "order rejected: {status} - {body}"
            )));
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Execution(format!("bad order payload: {e}")))?;

        info!(
            order_id = %order.order_id,
            action = intent.action.as_str(),
            filled = %order.filled_size,
            avg_price = %order.avg_price,
            "order filled"
        );
        Ok(FillResult {
            filled_size: order.filled_size,
            avg_price: order.avg_price,
        })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.token)
    }
}

/// Market side for an intent: entries trade with the signal direction,
/// exits trade against the held direction.
fn order_side(intent: &OrderIntent) -> &'static str {
    let buys = match intent.action {
        OrderAction::Open | OrderAction::Add => intent.direction == Direction::Long,
        OrderAction::Reduce | OrderAction::Close => intent.direction == Direction::Short,
        OrderAction::Noop => false,
    };
    if buys {
        "buy"
    } else {
        "sell"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn dry_client() -> ExchangeClient {
        ExchangeClient::new("http://localhost:0".into(), String::new(), true, dec!(1000)).unwrap()
    }

    #[tokio::test]
    async fn dry_run_simulates_fill_at_reference_price() {
        let client = dry_client();
        let intent = OrderIntent::open(Direction::Long, dec!(6));
        let fill = client.submit("BTC-USDT-SWAP", &intent, dec!(100)).await.unwrap();
        assert_eq!(fill.filled_size, dec!(0.06));
        assert_eq!(fill.avg_price, dec!(100));
    }

    #[tokio::test]
    async fn dry_run_uses_simulated_equity() {
        let client = dry_client();
        assert_eq!(client.get_equity().await.unwrap(), dec!(1000));
    }

    #[test]
    fn live_mode_without_token_is_fatal() {
        let err =
            ExchangeClient::new("http://localhost:0".into(), String::new(), false, dec!(0))
                .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn order_sides_per_action() {
        let open_long = OrderIntent::open(Direction::Long, dec!(5));
        assert_eq!(order_side(&open_long), "buy");
        let close_long = OrderIntent::close(Direction::Long, dec!(5));
        assert_eq!(order_side(&close_long), "sell");
        let reduce_short = OrderIntent::reduce(Direction::Short, dec!(5));
        assert_eq!(order_side(&reduce_short), "buy");
    }
}
