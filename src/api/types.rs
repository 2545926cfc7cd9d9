//! Wire types for the exchange, AI advisor, and sentiment feed APIs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One candle row from the exchange market-data endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleRow {
    /// Open time in epoch milliseconds.
    pub ts: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
}

/// Ticker response from the exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerResponse {
    pub last: Decimal,
}

/// Account balance response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub equity: Decimal,
}

/// Live position row from the exchange, absent when flat.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivePositionRow {
    pub side: String,
    pub size: Decimal,
    #[serde(default)]
    pub avg_entry_price: Decimal,
    #[serde(default)]
    pub notional: Decimal,
}

/// Leverage configuration request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeverageRequest {
    pub symbol: String,
    pub leverage: u32,
}

/// Market order submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    /// "buy" or "sell".
    pub side: String,
    /// Quote notional to fill.
    pub notional: Decimal,
    pub reduce_only: bool,
}

/// Fill confirmation from the exchange.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(default)]
    pub order_id: String,
    pub filled_size: Decimal,
    pub avg_price: Decimal,
}

/// Chat-completions request for the AI advisor.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// JSON document the advisor is instructed to reply with.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OpinionPayload {
    pub direction: String,
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
}

/// Sentiment feed response (fear-and-greed style, values 0..100).
#[derive(Debug, Clone, Deserialize)]
pub struct SentimentResponse {
    pub data: Vec<SentimentPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentimentPoint {
    pub value: f64,
    pub timestamp: i64,
}
