//! Durable state: the latest-wins robot status snapshot and the capped
//! signal history.
//!
//! One SQLite file, written once per cycle inside a single transaction so a
//! crash never leaves the status and the history out of step. Decimals are
//! stored as TEXT to avoid float round-trips.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::EngineError;
use crate::models::{
    Direction, ExecutionOutcome, FusedSignal, OrderAction, OrderIntent, Position, PositionSide,
    RobotStatus, SignalHistoryRecord,
};

pub struct StateStore {
    pool: SqlitePool,
    history_cap: i64,
}

#[derive(sqlx::FromRow)]
struct StatusRow {
    timestamp: DateTime<Utc>,
    price: String,
    equity: String,
    pos_direction: String,
    pos_size: String,
    pos_entry_price: String,
    pos_unrealized_pnl: String,
    pos_accumulated_cost: String,
    sig_direction: Option<String>,
    sig_confidence: Option<f64>,
    sig_weighted_score: Option<f64>,
    healthy: bool,
    degraded_reason: Option<String>,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    timestamp: DateTime<Utc>,
    sig_direction: String,
    sig_confidence: f64,
    sig_weighted_score: f64,
    intent_action: String,
    intent_direction: String,
    intent_size_delta: String,
    pos_direction: String,
    pos_size: String,
    pos_entry_price: String,
    pos_unrealized_pnl: String,
    pos_accumulated_cost: String,
    outcome: String,
    detail: Option<String>,
}

impl StateStore {
    pub async fn new(database_url: &str, history_cap: i64) -> Result<Self, EngineError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(EngineError::Persistence)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool, history_cap };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), EngineError> {
        // Latest-wins status, always exactly one row.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS robot_status (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                timestamp TEXT NOT NULL,
                price TEXT NOT NULL,
                equity TEXT NOT NULL,
                pos_direction TEXT NOT NULL,
                pos_size TEXT NOT NULL,
                pos_entry_price TEXT NOT NULL,
                pos_unrealized_pnl TEXT NOT NULL,
                pos_accumulated_cost TEXT NOT NULL,
                sig_direction TEXT,
                sig_confidence REAL,
                sig_weighted_score REAL,
                healthy INTEGER NOT NULL,
                degraded_reason TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signal_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                sig_direction TEXT NOT NULL,
                sig_confidence REAL NOT NULL,
                sig_weighted_score REAL NOT NULL,
                intent_action TEXT NOT NULL,
                intent_direction TEXT NOT NULL,
                intent_size_delta TEXT NOT NULL,
                pos_direction TEXT NOT NULL,
                pos_size TEXT NOT NULL,
                pos_entry_price TEXT NOT NULL,
                pos_unrealized_pnl TEXT NOT NULL,
                pos_accumulated_cost TEXT NOT NULL,
                outcome TEXT NOT NULL,
                detail TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_signal_history_time ON signal_history(timestamp)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist one cycle's outcome: overwrite the status row and append the
    /// history record, trimming the oldest rows past the cap. All or nothing.
    pub async fn commit(
        &self,
        status: &RobotStatus,
        record: Option<&SignalHistoryRecord>,
    ) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO robot_status (
                id, timestamp, price, equity,
                pos_direction, pos_size, pos_entry_price, pos_unrealized_pnl, pos_accumulated_cost,
                sig_direction, sig_confidence, sig_weighted_score,
                healthy, degraded_reason
            ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                timestamp = excluded.timestamp,
                price = excluded.price,
                equity = excluded.equity,
                pos_direction = excluded.pos_direction,
                pos_size = excluded.pos_size,
                pos_entry_price = excluded.pos_entry_price,
                pos_unrealized_pnl = excluded.pos_unrealized_pnl,
                pos_accumulated_cost = excluded.pos_accumulated_cost,
                sig_direction = excluded.sig_direction,
                sig_confidence = excluded.sig_confidence,
                sig_weighted_score = excluded.sig_weighted_score,
                healthy = excluded.healthy,
                degraded_reason = excluded.degraded_reason
            "#,
        )
        .bind(status.timestamp)
        .bind(status.price.to_string())
        .bind(status.equity.to_string())
        .bind(status.position.direction.as_str())
        .bind(status.position.size.to_string())
        .bind(status.position.entry_price.to_string())
        .bind(status.position.unrealized_pnl.to_string())
        .bind(status.position.accumulated_cost.to_string())
        .bind(status.last_signal.as_ref().map(|s| s.direction.as_str()))
        .bind(status.last_signal.as_ref().map(|s| s.confidence))
        .bind(status.last_signal.as_ref().map(|s| s.weighted_score))
        .bind(status.healthy)
        .bind(status.degraded_reason.as_deref())
        .execute(&mut *tx)
        .await?;

        if let Some(record) = record {
            sqlx::query(
                r#"
                INSERT INTO signal_history (
                    timestamp,
                    sig_direction, sig_confidence, sig_weighted_score,
                    intent_action, intent_direction, intent_size_delta,
                    pos_direction, pos_size, pos_entry_price, pos_unrealized_pnl, pos_accumulated_cost,
                    outcome, detail
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.timestamp)
            .bind(record.signal.direction.as_str())
            .bind(record.signal.confidence)
            .bind(record.signal.weighted_score)
            .bind(record.intent.action.as_str())
            .bind(record.intent.direction.as_str())
            .bind(record.intent.size_delta.to_string())
            .bind(record.position.direction.as_str())
            .bind(record.position.size.to_string())
            .bind(record.position.entry_price.to_string())
            .bind(record.position.unrealized_pnl.to_string())
            .bind(record.position.accumulated_cost.to_string())
            .bind(record.outcome.as_str())
            .bind(record.detail.as_deref())
            .execute(&mut *tx)
            .await?;

            // FIFO trim past the cap.
            sqlx::query(
                r#"
                DELETE FROM signal_history WHERE id NOT IN (
                    SELECT id FROM signal_history ORDER BY id DESC LIMIT ?
                )
                "#,
            )
            .bind(self.history_cap)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("cycle state committed");
        Ok(())
    }

    /// Latest persisted status, `None` on first run.
    pub async fn load_status(&self) -> Result<Option<RobotStatus>, EngineError> {
        let row: Option<StatusRow> =
            sqlx::query_as("SELECT * FROM robot_status WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let last_signal = match (row.sig_direction, row.sig_confidence, row.sig_weighted_score) {
            (Some(direction), Some(confidence), Some(weighted_score)) => Some(FusedSignal {
                direction: parse_direction(&direction)?,
                confidence,
                weighted_score,
            }),
            _ => None,
        };

        Ok(Some(RobotStatus {
            timestamp: row.timestamp,
            price: parse_decimal(&row.price)?,
            equity: parse_decimal(&row.equity)?,
            position: Position {
                direction: parse_side(&row.pos_direction)?,
                size: parse_decimal(&row.pos_size)?,
                entry_price: parse_decimal(&row.pos_entry_price)?,
                unrealized_pnl: parse_decimal(&row.pos_unrealized_pnl)?,
                accumulated_cost: parse_decimal(&row.pos_accumulated_cost)?,
            },
            last_signal,
            healthy: row.healthy,
            degraded_reason: row.degraded_reason,
        }))
    }

    /// Most recent history records, newest first.
    pub async fn recent_history(
        &self,
        limit: i64,
    ) -> Result<Vec<SignalHistoryRecord>, EngineError> {
        let rows: Vec<HistoryRow> =
            sqlx::query_as("SELECT * FROM signal_history ORDER BY id DESC LIMIT ?")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|row| {
                Ok(SignalHistoryRecord {
                    timestamp: row.timestamp,
                    signal: FusedSignal {
                        direction: parse_direction(&row.sig_direction)?,
                        confidence: row.sig_confidence,
                        weighted_score: row.sig_weighted_score,
                    },
                    intent: OrderIntent {
                        action: OrderAction::parse(&row.intent_action)
                            .ok_or_else(|| decode_error("unknown intent action"))?,
                        direction: parse_direction(&row.intent_direction)?,
                        size_delta: parse_decimal(&row.intent_size_delta)?,
                    },
                    position: Position {
                        direction: parse_side(&row.pos_direction)?,
                        size: parse_decimal(&row.pos_size)?,
                        entry_price: parse_decimal(&row.pos_entry_price)?,
                        unrealized_pnl: parse_decimal(&row.pos_unrealized_pnl)?,
                        accumulated_cost: parse_decimal(&row.pos_accumulated_cost)?,
                    },
                    outcome: ExecutionOutcome::parse(&row.outcome)
                        .ok_or_else(|| decode_error("unknown execution outcome"))?,
                    detail: row.detail,
                })
            })
            .collect()
    }

    pub async fn history_len(&self) -> Result<i64, EngineError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM signal_history")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn parse_decimal(s: &str) -> Result<Decimal, EngineError> {
    Decimal::from_str(s).map_err(|e| decode_error(&format!("bad decimal '{s}': {e}")))
}

fn parse_direction(s: &str) -> Result<Direction, EngineError> {
    Direction::parse(s).ok_or_else(|| decode_error(&format!("bad direction '{s}'")))
}

fn parse_side(s: &str) -> Result<PositionSide, EngineError> {
    PositionSide::parse(s).ok_or_else(|| decode_error(&format!("bad position side '{s}'")))
}

fn decode_error(message: &str) -> EngineError {
    EngineError::Persistence(sqlx::Error::Decode(message.to_string().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn store_at(dir: &tempfile::TempDir, cap: i64) -> StateStore {
        let url = format!("sqlite://{}/state.db", dir.path().display());
        StateStore::new(&url, cap).await.unwrap()
    }

    fn status_with_price(price: Decimal) -> RobotStatus {
        RobotStatus::healthy(price, dec!(1000), Position::flat(), None)
    }

    fn record(detail: Option<String>) -> SignalHistoryRecord {
        SignalHistoryRecord {
            timestamp: Utc::now(),
            signal: FusedSignal {
                direction: Direction::Long,
                confidence: 0.8,
                weighted_score: 0.8,
            },
            intent: OrderIntent::open(Direction::Long, dec!(6)),
            position: Position::flat(),
            outcome: ExecutionOutcome::Simulated,
            detail,
        }
    }

    #[tokio::test]
    async fn status_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir, 10).await;

        assert!(store.load_status().await.unwrap().is_none());

        let status = status_with_price(dec!(101.5));
        store.commit(&status, None).await.unwrap();

        let loaded = store.load_status().await.unwrap().unwrap();
        assert_eq!(loaded.price, dec!(101.5));
        assert_eq!(loaded.equity, dec!(1000));
        assert!(loaded.healthy);
        assert!(loaded.position.is_flat());
    }

    #[tokio::test]
    async fn status_is_latest_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir, 10).await;

        store.commit(&status_with_price(dec!(100)), None).await.unwrap();
        store.commit(&status_with_price(dec!(200)), None).await.unwrap();

        let loaded = store.load_status().await.unwrap().unwrap();
        assert_eq!(loaded.price, dec!(200));
    }

    #[tokio::test]
    async fn history_cap_trims_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir, 3).await;

        for i in 0..5 {
            let status = status_with_price(dec!(100));
            store
                .commit(&status, Some(&record(Some(format!("cycle {i}")))))
                .await
                .unwrap();
        }

        assert_eq!(store.history_len().await.unwrap(), 3);
        let history = store.recent_history(10).await.unwrap();
        assert_eq!(history.len(), 3);
        // Newest first; the oldest two cycles were trimmed.
        assert_eq!(history[0].detail.as_deref(), Some("cycle 4"));
        assert_eq!(history[2].detail.as_deref(), Some("cycle 2"));
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store_at(&dir, 10).await;
            let mut status = status_with_price(dec!(100));
            status.position = Position {
                direction: PositionSide::Long,
                size: dec!(0.06),
                entry_price: dec!(100),
                unrealized_pnl: Decimal::ZERO,
                accumulated_cost: dec!(6),
            };
            store.commit(&status, Some(&record(None))).await.unwrap();
        }

        let store = store_at(&dir, 10).await;
        let loaded = store.load_status().await.unwrap().unwrap();
        assert_eq!(loaded.position.direction, PositionSide::Long);
        assert_eq!(loaded.position.accumulated_cost, dec!(6));
        assert_eq!(store.history_len().await.unwrap(), 1);
    }
}
