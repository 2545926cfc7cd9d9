//! Engine runner: the periodic decision loop.
//!
//! Each cycle fetches market data, gathers the optional signal sources,
//! fuses them, turns the result into bounded order intents, executes them,
//! and commits the outcome to the state store. Any failure after inputs are
//! fetched degrades the cycle; only configuration errors stop the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, warn};

use crate::api::{ExchangeClient, OpinionClient, SentimentClient};
use crate::db::StateStore;
use crate::error::EngineError;
use crate::models::{
    ExecutionOutcome, FusedSignal, Opinion, OrderIntent, Position, PriceSeries, RobotStatus,
    SentimentScore, SignalHistoryRecord,
};
use crate::signal::{fuse, IndicatorSnapshot};
use crate::trading::{EngineConfig, PositionManager};

pub struct Bot {
    config: EngineConfig,
    store: StateStore,
    exchange: ExchangeClient,
    advisor: OpinionClient,
    sentiment: SentimentClient,
    manager: PositionManager,

    series: PriceSeries,
    position: Position,
    last_price: Decimal,
    last_equity: Decimal,
    last_signal: Option<FusedSignal>,

    shutdown: Arc<AtomicBool>,
}

impl Bot {
    pub fn new(
        config: EngineConfig,
        store: StateStore,
        exchange: ExchangeClient,
        advisor: OpinionClient,
        sentiment: SentimentClient,
    ) -> Self {
        let window = config.window;
        let manager = PositionManager::new(config.sizing.clone());
        Self {
            config,
            store,
            exchange,
            advisor,
            sentiment,
            manager,
            series: PriceSeries::new(window),
            position: Position::flat(),
            last_price: Decimal::ZERO,
            last_equity: Decimal::ZERO,
            last_signal: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Restore persisted state and reconcile with the exchange.
    pub async fn initialize(&mut self) -> Result<(), EngineError> {
        info!(symbol = %self.config.symbol, dry_run = self.config.dry_run, "initializing engine");

        if let Some(status) = self.store.load_status().await? {
            info!(
                position = status.position.direction.as_str(),
                size = %status.position.size,
                "resuming from persisted state"
            );
            self.position = status.position;
            self.last_price = status.price;
            self.last_signal = status.last_signal;
        }

        // In live mode the exchange is the source of truth for the position.
        if !self.config.dry_run {
            match self.exchange.get_live_position(&self.config.symbol).await {
                Ok(live) => {
                    let live = live.unwrap_or_else(Position::flat);
                    if live.direction != self.position.direction || live.size != self.position.size
                    {
                        warn!(
                            stored = self.position.direction.as_str(),
                            live = live.direction.as_str(),
                            "persisted position differs from exchange, adopting live state"
                        );
                        self.position = live;
                    }
                }
                Err(e) => warn!(error = %e, "could not reconcile live position"),
            }
            self.exchange
                .set_leverage(&self.config.symbol, self.config.leverage)
                .await?;
        }

        Ok(())
    }

    /// Main loop: one decision cycle per interval until shutdown.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        info!(
            interval_secs = self.config.interval_secs,
            "starting decision loop"
        );

        let mut tick_interval = interval(Duration::from_secs(self.config.interval_secs));

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            tick_interval.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.tick().await {
                if e.is_fatal() {
                    return Err(e);
                }
                error!(error = %e, "cycle failed, resuming next interval");
            }
        }

        self.persist_final_state().await;
        info!("engine stopped");
        Ok(())
    }

    /// One decision cycle.
    pub async fn tick(&mut self) -> Result<(), EngineError> {
        debug!("cycle start");

        // Market data first: without a price nothing can execute.
        let price = match self.exchange.get_price(&self.config.symbol).await {
            Ok(price) => price,
            Err(e) => {
                warn!(error = %e, "no market price this cycle");
                self.commit_degraded("market price unavailable").await;
                return Ok(());
            }
        };
        self.last_price = price;
        self.position.update_price(price);

        let equity = match self.exchange.get_equity().await {
            Ok(equity) => equity,
            Err(e) => {
                warn!(error = %e, "no account equity this cycle");
                self.commit_degraded("account equity unavailable").await;
                return Ok(());
            }
        };
        self.last_equity = equity;

        // Candle history feeds the technical source; its absence only
        // removes that source.
        match self
            .exchange
            .get_candles(&self.config.symbol, &self.config.timeframe, self.config.window)
            .await
        {
            Ok(candles) => {
                self.series = PriceSeries::from_candles(self.config.window, candles.into_iter());
            }
            Err(e) => warn!(error = %e, "candle fetch failed, keeping previous series"),
        }
        let snapshot = IndicatorSnapshot::compute(&self.series, &self.config.periods);

        let (opinion, sentiment) = self.gather_sources(price, snapshot.as_ref()).await;

        let signal = match fuse(
            snapshot.as_ref(),
            opinion.as_ref(),
            sentiment.as_ref(),
            &self.config.weights,
        ) {
            Ok(signal) => signal,
            Err(EngineError::InsufficientSignal) => {
                info!("no signal sources available, no-trade cycle");
                self.commit_degraded("all signal sources absent").await;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.last_signal = Some(signal);

        info!(
            direction = signal.direction.as_str(),
            score = signal.weighted_score,
            confidence = signal.confidence,
            "cycle signal"
        );

        let trend_strength = snapshot.as_ref().map_or(0.5, |s| s.trend_strength());
        let intents =
            self.manager
                .decide(&signal, &self.position, equity, price, trend_strength);

        let (recorded_intent, outcome, detail) = self.execute_intents(&intents, price).await;

        let record = SignalHistoryRecord {
            timestamp: Utc::now(),
            signal,
            intent: recorded_intent,
            position: self.position.clone(),
            outcome,
            detail: detail.clone(),
        };
        let status = match (outcome, detail) {
            (ExecutionOutcome::Failed, Some(reason)) => RobotStatus::degraded(
                price,
                equity,
                self.position.clone(),
                self.last_signal,
                reason,
            ),
            _ => RobotStatus::healthy(price, equity, self.position.clone(), self.last_signal),
        };

        self.store.commit(&status, Some(&record)).await?;
        Ok(())
    }

    /// Fetch the optional sources concurrently, each under its own timeout.
    /// A failed or stale source is absent, never fatal.
    async fn gather_sources(
        &self,
        price: Decimal,
        snapshot: Option<&IndicatorSnapshot>,
    ) -> (Option<Opinion>, Option<SentimentScore>) {
        let source_timeout = Duration::from_secs(self.config.source_timeout_secs);

        let (opinion, sentiment) = tokio::join!(
            timeout(
                source_timeout,
                self.advisor
                    .fetch(&self.config.symbol, price, snapshot, &self.position),
            ),
            timeout(source_timeout, self.sentiment.fetch()),
        );

        let opinion = match opinion {
            Ok(Ok(opinion)) => Some(opinion),
            Ok(Err(e)) => {
                warn!(error = %e, "advisor absent this cycle");
                None
            }
            Err(_) => {
                warn!("advisor timed out");
                None
            }
        };

        let max_age = chrono::Duration::seconds(self.config.interval_secs as i64);
        let sentiment = match sentiment {
            Ok(Ok(score)) => {
                if score.is_stale(Utc::now(), max_age) {
                    warn!(as_of = %score.as_of, "sentiment reading is stale, discarding");
                    None
                } else {
                    Some(score)
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "sentiment absent this cycle");
                None
            }
            Err(_) => {
                warn!("sentiment feed timed out");
                None
            }
        };

        (opinion, sentiment)
    }

    /// Execute intents in order. A reversal is close-then-open: the open leg
    /// runs only after the close is confirmed. Returns the intent to record,
    /// the outcome, and an operator-facing detail.
    async fn execute_intents(
        &mut self,
        intents: &[OrderIntent],
        price: Decimal,
    ) -> (OrderIntent, ExecutionOutcome, Option<String>) {
        let mut recorded = intents.first().copied().unwrap_or_else(OrderIntent::noop);

        for intent in intents {
            if intent.is_noop() {
                return (*intent, ExecutionOutcome::NoTrade, None);
            }
            recorded = *intent;

            let fill = match self.exchange.submit(&self.config.symbol, intent, price).await {
                Ok(fill) => fill,
                Err(e) => {
                    error!(
                        action = intent.action.as_str(),
                        error = %e,
                        "order failed, aborting remaining intents"
                    );
                    return (*intent, ExecutionOutcome::Failed, Some(e.to_string()));
                }
            };

            if let Err(e) = self.manager.apply(&mut self.position, intent, &fill) {
                error!(error = %e, "fill apply failed");
                return (*intent, ExecutionOutcome::Failed, Some(e.to_string()));
            }
        }

        let outcome = if self.config.dry_run {
            ExecutionOutcome::Simulated
        } else {
            ExecutionOutcome::Filled
        };
        (recorded, outcome, None)
    }

    /// Commit a degraded status without a history record. Persistence
    /// failures here are logged, not propagated.
    async fn commit_degraded(&self, reason: &str) {
        let status = RobotStatus::degraded(
            self.last_price,
            self.last_equity,
            self.position.clone(),
            self.last_signal,
            reason,
        );
        if let Err(e) = self.store.commit(&status, None).await {
            error!(error = %e, "could not persist degraded status");
        }
    }

    async fn persist_final_state(&self) {
        let status = RobotStatus::healthy(
            self.last_price,
            self.last_equity,
            self.position.clone(),
            self.last_signal,
        );
        if let Err(e) = self.store.commit(&status, None).await {
            error!(error = %e, "could not persist final state");
        }
    }
}
