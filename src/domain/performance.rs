//! Trade history and the trailing performance window derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Direction;

/// TradeRecord is a persisted trade, open or closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub instrument: String,
    pub direction: Direction,
    pub confidence: f64,
    pub units: f64,
    pub entry_price: f64,
    pub stop: f64,
    pub target: f64,
    pub risk_fraction: f64,
    pub slippage_pips: f64,
    pub opened_at: DateTime<Utc>,
    pub exit_price: Option<f64>,
    pub profit_loss: Option<f64>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Performance metrics over the most recent closed trades.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceWindow {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    /// Gross profit divided by gross loss.
    pub profit_factor: f64,
    pub average_win: f64,
    /// Average losing trade as a positive number.
    pub average_loss: f64,
}

impl PerformanceWindow {
    /// Builds the window from realized profit/loss values.
    pub fn from_pnls(pnls: &[f64]) -> Self {
        if pnls.is_empty() {
            return Self::default();
        }

        let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = pnls.iter().copied().filter(|p| *p < 0.0).map(f64::abs).collect();

        let gross_profit: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().sum();

        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        Self {
            total_trades: pnls.len(),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate: wins.len() as f64 / pnls.len() as f64,
            profit_factor,
            average_win: if wins.is_empty() { 0.0 } else { gross_profit / wins.len() as f64 },
            average_loss: if losses.is_empty() { 0.0 } else { gross_loss / losses.len() as f64 },
        }
    }

    /// Average win over average loss, when both sides have history.
    pub fn reward_risk_ratio(&self) -> Option<f64> {
        if self.average_loss > 0.0 && self.average_win > 0.0 {
            Some(self.average_win / self.average_loss)
        } else {
            None
        }
    }
}
