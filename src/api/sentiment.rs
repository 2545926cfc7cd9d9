//! Sentiment feed client.
//!
//! Pulls a fear-and-greed style index (0..100) and maps it onto the
//! engine's [-1, 1] sentiment scale. Optional source; failures and stale
//! readings make it absent for the cycle.

use std::time::Duration;

use backoff::ExponentialBackoff;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::models::SentimentScore;

use super::types::SentimentResponse;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SentimentClient {
    client: Client,
    base_url: String,
}

impl SentimentClient {
    pub fn new(base_url: String) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }

    /// Fetch the latest sentiment reading, retrying transient transport
    /// errors within a short window.
    pub async fn fetch(&self) -> Result<SentimentScore, EngineError> {
        if !self.is_configured() {
            return Err(EngineError::unavailable("sentiment", "no feed configured"));
        }
        let url = format!("{}/fng?limit=1", self.base_url);

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(15)),
            ..Default::default()
        };

        let payload: SentimentResponse = backoff::future::retry(policy, || async {
            debug!(url = %url, "fetching sentiment");
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(backoff::Error::transient)?;

            let status = response.status();
            let response = response.error_for_status().map_err(|e| {
                if status.is_server_error() {
                    warn!(status = %status, "sentiment feed server error, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })?;
            response.json().await.map_err(backoff::Error::permanent)
        })
        .await
        .map_err(|e| EngineError::unavailable("sentiment", e.to_string()))?;

        let point = payload
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::unavailable("sentiment", "empty feed response"))?;

        let as_of = Utc
            .timestamp_opt(point.timestamp, 0)
            .single()
            .ok_or_else(|| EngineError::unavailable("sentiment", "invalid feed timestamp"))?;

        Ok(SentimentScore::new(index_to_score(point.value), as_of))
    }
}

/// Map a 0..100 greed index onto [-1, 1], 50 neutral.
fn index_to_score(index: f64) -> f64 {
    ((index - 50.0) / 50.0).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_mapping() {
        assert_eq!(index_to_score(50.0), 0.0);
        assert_eq!(index_to_score(100.0), 1.0);
        assert_eq!(index_to_score(0.0), -1.0);
        assert_eq!(index_to_score(75.0), 0.5);
        assert_eq!(index_to_score(150.0), 1.0);
    }

    #[test]
    fn unconfigured_feed_is_absent() {
        let client = SentimentClient::new(String::new()).unwrap();
        assert!(!client.is_configured());
    }
}
