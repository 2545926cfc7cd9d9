//! Signal-fusion trading engine.
//!
//! Periodically fuses technical indicators, an AI opinion, and a market
//! sentiment score into one bounded position action on a single instrument.

mod api;
mod bot;
mod db;
mod error;
mod models;
mod signal;
mod trading;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{ExchangeClient, OpinionClient, SentimentClient};
use crate::bot::Bot;
use crate::db::StateStore;
use crate::trading::EngineConfig;

/// Signal-fusion trading engine CLI.
#[derive(Parser)]
#[command(name = "signalfuse")]
#[command(about = "Fuse indicators, AI opinion, and sentiment into position actions", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "sqlite:./signalfuse.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Exchange API base URL
    #[arg(long, env = "EXCHANGE_API_URL", default_value = "https://api.exchange.example")]
    exchange_url: String,

    /// Exchange API token (required for live trading)
    #[arg(long, env = "EXCHANGE_API_TOKEN", default_value = "", hide_env_values = true)]
    exchange_token: String,

    /// AI advisor base URL
    #[arg(long, env = "AI_API_URL", default_value = "https://api.deepseek.com")]
    ai_url: String,

    /// AI advisor API key (advisor absent when empty)
    #[arg(long, env = "AI_API_KEY", default_value = "", hide_env_values = true)]
    ai_key: String,

    /// AI advisor model name
    #[arg(long, env = "AI_MODEL", default_value = "deepseek-chat")]
    ai_model: String,

    /// Sentiment feed base URL (feed absent when empty)
    #[arg(long, env = "SENTIMENT_API_URL", default_value = "")]
    sentiment_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the decision loop
    Run {
        /// Instrument symbol
        #[arg(short, long, default_value = "BTC-USDT-SWAP")]
        symbol: String,

        /// Cycle interval in seconds
        #[arg(short, long, default_value = "900")]
        interval: u64,

        /// Submit real orders instead of simulating fills
        #[arg(long)]
        live: bool,
    },

    /// Show the latest persisted status
    Status,

    /// Show recent decision history
    History {
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            symbol,
            interval,
            live,
        } => {
            let mut config = EngineConfig::default();
            config.symbol = symbol;
            config.interval_secs = interval;
            config.dry_run = !live;
            config.validate()?;

            let store = StateStore::new(&cli.database, config.history_cap).await?;
            let exchange = ExchangeClient::new(
                cli.exchange_url,
                cli.exchange_token,
                config.dry_run,
                config.sim_equity,
            )?;
            let advisor = OpinionClient::new(cli.ai_url, cli.ai_key, cli.ai_model)?;
            let sentiment = SentimentClient::new(cli.sentiment_url)?;

            info!(
                symbol = %config.symbol,
                interval = config.interval_secs,
                dry_run = config.dry_run,
                "starting engine"
            );

            println!("\n=== Signal Fusion Engine ===");
            println!("Symbol:   {}", config.symbol);
            println!("Interval: {}s", config.interval_secs);
            println!(
                "Mode:     {}",
                if config.dry_run {
                    "DRY RUN (simulated fills)"
                } else {
                    "LIVE TRADING"
                }
            );
            println!("\nPress Ctrl+C to stop.\n");

            let mut bot = Bot::new(config, store, exchange, advisor, sentiment);
            bot.initialize().await?;
            bot.run().await?;
        }

        Commands::Status => {
            let config = EngineConfig::default();
            let store = StateStore::new(&cli.database, config.history_cap).await?;

            let Some(status) = store.load_status().await? else {
                println!("No persisted state found. Run 'signalfuse run' to start the engine.");
                return Ok(());
            };

            println!("\n=== Engine Status ===");
            println!("As of:       {}", status.timestamp);
            println!(
                "Health:      {}",
                if status.healthy {
                    "healthy".to_string()
                } else {
                    format!(
                        "degraded ({})",
                        status.degraded_reason.as_deref().unwrap_or("unknown")
                    )
                }
            );
            println!("Price:       {}", status.price);
            println!("Equity:      {}", status.equity);

            println!("\n=== Position ===");
            println!("Direction:   {}", status.position.direction.as_str());
            println!("Size:        {}", status.position.size);
            println!("Entry:       {}", status.position.entry_price);
            println!("Notional:    {}", status.position.accumulated_cost);
            println!("Unrealized:  {}", status.position.unrealized_pnl);

            if let Some(signal) = status.last_signal {
                println!("\n=== Last Signal ===");
                println!("Direction:   {}", signal.direction.as_str());
                println!("Score:       {:.4}", signal.weighted_score);
                println!("Confidence:  {:.4}", signal.confidence);
            }
        }

        Commands::History { limit } => {
            let config = EngineConfig::default();
            let store = StateStore::new(&cli.database, config.history_cap).await?;

            let records = store.recent_history(limit).await?;
            if records.is_empty() {
                println!("No decision history yet.");
                return Ok(());
            }

            println!(
                "\n{:<22} {:<6} {:>8} {:<7} {:>10} {:<10}",
                "TIMESTAMP", "SIGNAL", "SCORE", "ACTION", "NOTIONAL", "OUTCOME"
            );
            println!("{}", "-".repeat(70));
            for record in records {
                println!(
                    "{:<22} {:<6} {:>8.3} {:<7} {:>10} {:<10}",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.signal.direction.as_str(),
                    record.signal.weighted_score,
                    record.intent.action.as_str(),
                    record.intent.size_delta,
                    record.outcome.as_str()
                );
                if let Some(detail) = record.detail {
                    println!("    {detail}");
                }
            }
        }

        Commands::Config => {
            let config = EngineConfig::default();

            println!("\n=== Engine Configuration ===\n");
            println!("Symbol:            {}", config.symbol);
            println!("Timeframe:         {}", config.timeframe);
            println!("Window:            {} candles", config.window);
            println!("Interval:          {}s", config.interval_secs);
            println!("Source timeout:    {}s", config.source_timeout_secs);
            println!("History cap:       {} records", config.history_cap);

            println!("\nFusion Weights:");
            println!("  Technical:       {}", config.weights.technical);
            println!("  AI opinion:      {}", config.weights.ai);
            println!("  Sentiment:       {}", config.weights.sentiment);
            println!("  Dead zone:       {}", config.weights.dead_zone);

            println!("\nSizing:");
            println!("  Base amount:     {} USDT", config.sizing.base_amount);
            println!(
                "  Confidence mult: {} / {} / {}",
                config.sizing.high_confidence_multiplier,
                config.sizing.medium_confidence_multiplier,
                config.sizing.low_confidence_multiplier
            );
            println!(
                "  Trend mult:      {} + {} * strength",
                config.sizing.trend_multiplier_floor, config.sizing.trend_multiplier_span
            );
            println!("  Position cap:    {} USDT", config.sizing.position_cap());
            println!("  Max leverage:    {}x", config.sizing.max_leverage);

            println!("\nRisk:");
            println!("  Stop loss:       {}%", config.sizing.stop_loss_pct * rust_decimal::Decimal::from(100));
            println!("  Take profit:     {}%", config.sizing.take_profit_pct * rust_decimal::Decimal::from(100));
            println!("  Reversal conf:   {}", config.sizing.reversal_threshold);
            println!("  Reduce fraction: {}", config.sizing.reduce_fraction);
        }
    }

    Ok(())
}
