//! Persistence contracts for the threshold controller and the trade history.

mod memory;
mod sqlite;

pub use memory::InMemoryStorage;
pub use sqlite::{SqliteStorage, SqliteStorageConfig};

use crate::domain::{AdjustmentRecord, PerformanceWindow, TradeRecord};
use async_trait::async_trait;

/// ThresholdRepository persists the adaptive threshold and its adjustment log.
#[async_trait]
pub trait ThresholdRepository: Send + Sync {
    /// Appends an adjustment and moves the "last threshold" pointer to its
    /// new value. Both writes commit together or not at all.
    async fn append_adjustment(&self, record: &AdjustmentRecord) -> Result<(), StorageError>;

    /// Returns the last committed threshold, if any adjustment was ever stored.
    async fn last_threshold(&self) -> Result<Option<f64>, StorageError>;

    /// Stores the cycles-without-signal counter.
    async fn save_no_signal_cycles(&self, cycles: u32) -> Result<(), StorageError>;

    /// Returns the stored cycles-without-signal counter (0 when absent).
    async fn no_signal_cycles(&self) -> Result<u32, StorageError>;

    /// Returns the most recent adjustments, newest first.
    async fn adjustments(&self, limit: usize) -> Result<Vec<AdjustmentRecord>, StorageError>;
}

/// TradeStore persists executed trades and serves the trailing performance window.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Stores a newly opened trade and returns its id.
    async fn store_trade(&self, trade: &TradeRecord) -> Result<i64, StorageError>;

    /// Marks a trade closed. Exit price and P/L are absent when the venue
    /// closed the position without reporting them.
    async fn close_trade(
        &self,
        id: i64,
        exit_price: Option<f64>,
        profit_loss: Option<f64>,
    ) -> Result<(), StorageError>;

    /// Performance over the last `window` closed trades with a known P/L.
    async fn performance(&self, window: usize) -> Result<PerformanceWindow, StorageError>;

    /// Most recent trades, newest first.
    async fn recent_trades(&self, limit: usize) -> Result<Vec<TradeRecord>, StorageError>;

    /// Releases held connections at shutdown.
    async fn close(&self) {}
}

/// StorageError represents errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
