//! SQLite implementation of the threshold repository and the trade store.

use crate::domain::{
    AdjustmentReason, AdjustmentRecord, Direction, MetricSnapshot, PerformanceWindow, TradeRecord,
};
use crate::storage::{StorageError, ThresholdRepository, TradeStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// SqliteStorage implements the storage contracts using SQLite.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

/// SqliteStorageConfig holds SQLite storage configuration.
#[derive(Debug, Clone)]
pub struct SqliteStorageConfig {
    /// Path to the SQLite database file.
    pub path: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
}

impl Default for SqliteStorageConfig {
    fn default() -> Self {
        Self {
            path: "data/riskgate.db".to_string(),
            max_connections: 5,
        }
    }
}

impl SqliteStorage {
    /// Creates a new SQLite storage instance.
    pub async fn new(config: SqliteStorageConfig) -> Result<Self, StorageError> {
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let storage = Self { pool };

        storage.migrate().await?;

        info!(path = %config.path, "SQLite storage initialized");
        Ok(storage)
    }

    /// Runs database migrations to create the schema.
    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS threshold_adjustments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                old_threshold REAL NOT NULL,
                new_threshold REAL NOT NULL,
                reason TEXT NOT NULL,
                snapshot TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS threshold_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                current_threshold REAL,
                cycles_without_signal INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instrument TEXT NOT NULL,
                direction TEXT NOT NULL,
                confidence REAL NOT NULL,
                units REAL NOT NULL,
                entry_price REAL NOT NULL,
                stop REAL NOT NULL,
                target REAL NOT NULL,
                risk_fraction REAL NOT NULL,
                slippage_pips REAL NOT NULL,
                opened_at TEXT NOT NULL,
                exit_price REAL,
                profit_loss REAL,
                closed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_closed_at ON trades(closed_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ThresholdRepository for SqliteStorage {
    async fn append_adjustment(&self, record: &AdjustmentRecord) -> Result<(), StorageError> {
        let snapshot = serde_json::to_string(&record.snapshot)
            .map_err(|e| StorageError::InvalidData(format!("Invalid snapshot: {}", e)))?;
        let timestamp = record.timestamp.to_rfc3339();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO threshold_adjustments (
                timestamp, old_threshold, new_threshold, reason, snapshot
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&timestamp)
        .bind(record.old_threshold)
        .bind(record.new_threshold)
        .bind(record.reason.as_str())
        .bind(&snapshot)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO threshold_state (id, current_threshold, cycles_without_signal, updated_at)
            VALUES (1, ?1, 0, ?2)
            ON CONFLICT(id) DO UPDATE SET
                current_threshold = excluded.current_threshold,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.new_threshold)
        .bind(&timestamp)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            old = record.old_threshold,
            new = record.new_threshold,
            reason = %record.reason,
            "Threshold adjustment stored"
        );

        Ok(())
    }

    async fn last_threshold(&self) -> Result<Option<f64>, StorageError> {
        let row = sqlx::query("SELECT current_threshold FROM threshold_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get::<Option<f64>, _>("current_threshold")?),
            None => Ok(None),
        }
    }

    async fn save_no_signal_cycles(&self, cycles: u32) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO threshold_state (id, current_threshold, cycles_without_signal, updated_at)
            VALUES (1, NULL, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
                cycles_without_signal = excluded.cycles_without_signal,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(i64::from(cycles))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn no_signal_cycles(&self) -> Result<u32, StorageError> {
        let row = sqlx::query("SELECT cycles_without_signal FROM threshold_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let cycles: i64 = row.try_get("cycles_without_signal")?;
                u32::try_from(cycles).map_err(|_| {
                    StorageError::InvalidData(format!("Invalid cycles_without_signal: {}", cycles))
                })
            }
            None => Ok(0),
        }
    }

    async fn adjustments(&self, limit: usize) -> Result<Vec<AdjustmentRecord>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, old_threshold, new_threshold, reason, snapshot
            FROM threshold_adjustments ORDER BY id DESC LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_adjustment_row).collect()
    }
}

#[async_trait]
impl TradeStore for SqliteStorage {
    async fn store_trade(&self, trade: &TradeRecord) -> Result<i64, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO trades (
                instrument, direction, confidence, units, entry_price, stop, target,
                risk_fraction, slippage_pips, opened_at, exit_price, profit_loss, closed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&trade.instrument)
        .bind(trade.direction.to_string())
        .bind(trade.confidence)
        .bind(trade.units)
        .bind(trade.entry_price)
        .bind(trade.stop)
        .bind(trade.target)
        .bind(trade.risk_fraction)
        .bind(trade.slippage_pips)
        .bind(trade.opened_at.to_rfc3339())
        .bind(trade.exit_price)
        .bind(trade.profit_loss)
        .bind(trade.closed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(id = id, instrument = %trade.instrument, "Trade stored");
        Ok(id)
    }

    async fn close_trade(
        &self,
        id: i64,
        exit_price: Option<f64>,
        profit_loss: Option<f64>,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE trades SET exit_price = ?1, profit_loss = ?2, closed_at = ?3 WHERE id = ?4",
        )
        .bind(exit_price)
        .bind(profit_loss)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("trade {}", id)));
        }
        Ok(())
    }

    async fn performance(&self, window: usize) -> Result<PerformanceWindow, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT profit_loss FROM trades
            WHERE closed_at IS NOT NULL AND profit_loss IS NOT NULL
            ORDER BY closed_at DESC, id DESC LIMIT ?
            "#,
        )
        .bind(window as i64)
        .fetch_all(&self.pool)
        .await?;

        let pnls = rows
            .iter()
            .map(|row| row.try_get::<f64, _>("profit_loss"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PerformanceWindow::from_pnls(&pnls))
    }

    async fn recent_trades(&self, limit: usize) -> Result<Vec<TradeRecord>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT instrument, direction, confidence, units, entry_price, stop, target,
                risk_fraction, slippage_pips, opened_at, exit_price, profit_loss, closed_at
            FROM trades ORDER BY id DESC LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_trade_row).collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("SQLite pool closed");
    }
}

fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", field, e)))
}

/// Parses an adjustment record from a database row.
fn parse_adjustment_row(row: &sqlx::sqlite::SqliteRow) -> Result<AdjustmentRecord, StorageError> {
    let reason_str: String = row.try_get("reason")?;
    let reason = AdjustmentReason::from_str(&reason_str).map_err(StorageError::InvalidData)?;

    let snapshot_str: String = row.try_get("snapshot")?;
    let snapshot: MetricSnapshot = serde_json::from_str(&snapshot_str)
        .map_err(|e| StorageError::InvalidData(format!("Invalid snapshot: {}", e)))?;

    let timestamp_str: String = row.try_get("timestamp")?;

    Ok(AdjustmentRecord {
        timestamp: parse_timestamp(&timestamp_str, "timestamp")?,
        old_threshold: row.try_get("old_threshold")?,
        new_threshold: row.try_get("new_threshold")?,
        reason,
        snapshot,
    })
}

/// Parses a trade record from a database row.
fn parse_trade_row(row: &sqlx::sqlite::SqliteRow) -> Result<TradeRecord, StorageError> {
    let direction_str: String = row.try_get("direction")?;
    let direction = match direction_str.as_str() {
        "buy" => Direction::Buy,
        "sell" => Direction::Sell,
        other => {
            return Err(StorageError::InvalidData(format!(
                "Invalid direction: {}",
                other
            )));
        }
    };

    let opened_at_str: String = row.try_get("opened_at")?;
    let closed_at_str: Option<String> = row.try_get("closed_at")?;
    let closed_at = closed_at_str
        .as_deref()
        .map(|s| parse_timestamp(s, "closed_at"))
        .transpose()?;

    Ok(TradeRecord {
        instrument: row.try_get("instrument")?,
        direction,
        confidence: row.try_get("confidence")?,
        units: row.try_get("units")?,
        entry_price: row.try_get("entry_price")?,
        stop: row.try_get("stop")?,
        target: row.try_get("target")?,
        risk_fraction: row.try_get("risk_fraction")?,
        slippage_pips: row.try_get("slippage_pips")?,
        opened_at: parse_timestamp(&opened_at_str, "opened_at")?,
        exit_price: row.try_get("exit_price")?,
        profit_loss: row.try_get("profit_loss")?,
        closed_at,
    })
}
