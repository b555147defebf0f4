//! In-memory storage used in tests and when persistence is disabled.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{AdjustmentRecord, PerformanceWindow, TradeRecord};
use crate::storage::{StorageError, ThresholdRepository, TradeStore};

#[derive(Default)]
struct MemoryState {
    last_threshold: Option<f64>,
    no_signal_cycles: u32,
    adjustments: Vec<AdjustmentRecord>,
    trades: Vec<TradeRecord>,
}

/// InMemoryStorage implements both storage contracts without durability.
#[derive(Default)]
pub struct InMemoryStorage {
    state: Mutex<MemoryState>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThresholdRepository for InMemoryStorage {
    async fn append_adjustment(&self, record: &AdjustmentRecord) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state.adjustments.push(record.clone());
        state.last_threshold = Some(record.new_threshold);
        Ok(())
    }

    async fn last_threshold(&self) -> Result<Option<f64>, StorageError> {
        Ok(self.state.lock().await.last_threshold)
    }

    async fn save_no_signal_cycles(&self, cycles: u32) -> Result<(), StorageError> {
        self.state.lock().await.no_signal_cycles = cycles;
        Ok(())
    }

    async fn no_signal_cycles(&self) -> Result<u32, StorageError> {
        Ok(self.state.lock().await.no_signal_cycles)
    }

    async fn adjustments(&self, limit: usize) -> Result<Vec<AdjustmentRecord>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.adjustments.iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl TradeStore for InMemoryStorage {
    async fn store_trade(&self, trade: &TradeRecord) -> Result<i64, StorageError> {
        let mut state = self.state.lock().await;
        state.trades.push(trade.clone());
        Ok(state.trades.len() as i64)
    }

    async fn close_trade(
        &self,
        id: i64,
        exit_price: Option<f64>,
        profit_loss: Option<f64>,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        let index = usize::try_from(id - 1)
            .map_err(|_| StorageError::NotFound(format!("trade {}", id)))?;
        let trade = state
            .trades
            .get_mut(index)
            .ok_or_else(|| StorageError::NotFound(format!("trade {}", id)))?;
        trade.exit_price = exit_price;
        trade.profit_loss = profit_loss;
        trade.closed_at = Some(chrono::Utc::now());
        Ok(())
    }

    async fn performance(&self, window: usize) -> Result<PerformanceWindow, StorageError> {
        let state = self.state.lock().await;
        let pnls: Vec<f64> = state
            .trades
            .iter()
            .rev()
            .filter(|t| t.closed_at.is_some())
            .filter_map(|t| t.profit_loss)
            .take(window)
            .collect();
        Ok(PerformanceWindow::from_pnls(&pnls))
    }

    async fn recent_trades(&self, limit: usize) -> Result<Vec<TradeRecord>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.trades.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AdjustmentReason, Direction, MetricSnapshot};
    use chrono::Utc;

    fn trade() -> TradeRecord {
        TradeRecord {
            instrument: "EUR_USD".to_string(),
            direction: Direction::Buy,
            confidence: 0.9,
            units: 1000.0,
            entry_price: 1.1,
            stop: 1.098,
            target: 1.104,
            risk_fraction: 0.01,
            slippage_pips: 0.0,
            opened_at: Utc::now(),
            exit_price: None,
            profit_loss: None,
            closed_at: None,
        }
    }

    #[tokio::test]
    async fn test_pointer_follows_last_adjustment() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.last_threshold().await.unwrap(), None);

        storage
            .append_adjustment(&AdjustmentRecord {
                timestamp: Utc::now(),
                old_threshold: 0.8,
                new_threshold: 0.78,
                reason: AdjustmentReason::NoSignalPressure,
                snapshot: MetricSnapshot::default(),
            })
            .await
            .unwrap();

        assert_eq!(storage.last_threshold().await.unwrap(), Some(0.78));
        assert_eq!(storage.adjustments(5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_performance_window_is_trailing() {
        let storage = InMemoryStorage::new();
        for pnl in [-5.0, 10.0, 10.0] {
            let id = storage.store_trade(&trade()).await.unwrap();
            storage.close_trade(id, Some(1.1), Some(pnl)).await.unwrap();
        }

        let window = storage.performance(2).await.unwrap();
        assert_eq!(window.total_trades, 2);
        assert_eq!(window.win_rate, 1.0);
    }

    #[tokio::test]
    async fn test_close_unknown_trade() {
        let storage = InMemoryStorage::new();
        assert!(matches!(
            storage.close_trade(0, None, None).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
