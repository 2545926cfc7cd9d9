//! HTTP clients for the exchange, the AI advisor, and the sentiment feed.

mod ai;
mod exchange;
mod sentiment;
mod types;

pub use ai::OpinionClient;
pub use exchange::ExchangeClient;
pub use sentiment::SentimentClient;
pub use types::*;
