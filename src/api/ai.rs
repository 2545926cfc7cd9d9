//! AI advisor client: asks a chat-completions model for a directional
//! opinion and validates the structured reply.
//!
//! The advisor is one optional source. Any failure here (timeout, refusal,
//! malformed reply) degrades the cycle, never aborts it.

use std::time::Duration;

use backoff::ExponentialBackoff;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::models::{Opinion, Position};
use crate::signal::IndicatorSnapshot;

use super::types::{ChatMessage, ChatRequest, ChatResponse, OpinionPayload};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const SYSTEM_PROMPT: &str = "You are a cryptocurrency trading analyst. \
Reply with a single JSON object and nothing else: \
{\"direction\": \"long\"|\"short\"|\"flat\", \"confidence\": 0.0-1.0, \
\"rationale\": \"...\", \"stop_loss\": number|null, \"take_profit\": number|null}";

pub struct OpinionClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpinionClient {
    pub fn new(base_url: String, api_key: String, model: String) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Fetch one validated opinion for the current market context.
    pub async fn fetch(
        &self,
        symbol: &str,
        price: Decimal,
        snapshot: Option<&IndicatorSnapshot>,
        position: &Position,
    ) -> Result<Opinion, EngineError> {
        if !self.is_configured() {
            return Err(EngineError::unavailable("ai", "no API key configured"));
        }

        let prompt = self.build_prompt(symbol, price, snapshot, position);
        let content = self.complete(prompt).await?;
        parse_opinion(&content)
    }

    fn build_prompt(
        &self,
        symbol: &str,
        price: Decimal,
        snapshot: Option<&IndicatorSnapshot>,
        position: &Position,
    ) -> String {
        let indicators = match snapshot {
            Some(s) => json!({
                "ma_short": s.ma_short,
                "ma_long": s.ma_long,
                "rsi": s.rsi,
                "macd_histogram": s.macd_histogram,
                "bollinger_upper": s.bollinger_upper,
                "bollinger_lower": s.bollinger_lower,
            }),
            None => json!(null),
        };
        json!({
            "symbol": symbol,
            "price": price,
            "indicators": indicators,
            "position": {
                "direction": position.direction.as_str(),
                "size": position.size,
                "entry_price": position.entry_price,
            },
        })
        .to_string()
    }

    /// One chat completion with retry on transient transport errors.
    async fn complete(&self, prompt: String) -> Result<String, EngineError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt,
                },
            ],
            temperature: 0.2,
        };

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(20)),
            ..Default::default()
        };
        let url = format!("{}/chat/completions", self.base_url);

        let response: ChatResponse = backoff::future::retry(policy, || async {
            debug!(url = %url, model = %self.model, "requesting opinion");
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(backoff::Error::transient)?;

            let status = response.status();
            let response = response.error_for_status().map_err(|e| {
                if status.is_server_error() {
                    warn!(status = %status, "advisor server error, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })?;
            response.json().await.map_err(backoff::Error::permanent)
        })
        .await
        .map_err(|e| EngineError::unavailable("ai", e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| EngineError::unavailable("ai", "empty completion"))
    }
}

/// Parse and validate the advisor reply. Tolerates a markdown code fence
/// around the JSON but nothing else.
fn parse_opinion(content: &str) -> Result<Opinion, EngineError> {
    let body = strip_code_fence(content);
    let payload: OpinionPayload = serde_json::from_str(body)
        .map_err(|e| EngineError::unavailable("ai", format!("malformed opinion: {e}")))?;
    Opinion::validated(
        &payload.direction,
        payload.confidence,
        payload.rationale,
        payload.stop_loss,
        payload.take_profit,
    )
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;

    #[test]
    fn parses_plain_json_opinion() {
        let content = r#"{"direction": "long", "confidence": 0.8, "rationale": "momentum", "stop_loss": null, "take_profit": null}"#;
        let opinion = parse_opinion(content).unwrap();
        assert_eq!(opinion.direction, Direction::Long);
        assert_eq!(opinion.confidence, 0.8);
    }

    #[test]
    fn parses_code_fenced_opinion() {
        let content = "```json\n{\"direction\": \"sell\", \"confidence\": 0.6}\n```";
        let opinion = parse_opinion(content).unwrap();
        assert_eq!(opinion.direction, Direction::Short);
    }

    #[test]
    fn rejects_prose_reply() {
        let err = parse_opinion("I think the market will go up.").unwrap_err();
        assert!(matches!(err, EngineError::InputUnavailable { source: "ai", .. }));
    }

    #[test]
    fn rejects_unknown_direction() {
        let content = r#"{"direction": "sideways", "confidence": 0.5}"#;
        assert!(parse_opinion(content).is_err());
    }

    #[test]
    fn clamps_out_of_range_confidence() {
        let content = r#"{"direction": "long", "confidence": 1.7}"#;
        let opinion = parse_opinion(content).unwrap();
        assert_eq!(opinion.confidence, 1.0);
    }
}
