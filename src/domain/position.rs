//! Open position records owned by the risk manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Direction;

/// OpenPositionRecord is the ledger entry for one open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPositionRecord {
    pub instrument: String,
    pub direction: Direction,
    /// Signed unit quantity (negative for sells).
    pub units: f64,
    pub entry_price: f64,
    pub stop: f64,
    pub target: f64,
    /// Stop distance in pips at entry; drives trailing.
    pub stop_distance: f64,
    /// Fraction of balance at risk when the position was opened.
    pub risk_fraction: f64,
    /// Most favourable price seen since the trailing stop activated.
    pub best_price: Option<f64>,
    /// Trade row id in the trade store, when persisted.
    pub trade_id: Option<i64>,
    pub opened_at: DateTime<Utc>,
    /// A venue close is in flight. The record still counts toward every limit.
    #[serde(default)]
    pub closing: bool,
}

impl OpenPositionRecord {
    /// Base currency used for correlation grouping.
    pub fn base_currency(&self) -> &str {
        base_currency(&self.instrument)
    }

    /// Returns true when `price` reached the take-profit level.
    pub fn target_reached(&self, price: f64) -> bool {
        match self.direction {
            Direction::Buy => price >= self.target,
            Direction::Sell => price <= self.target,
        }
    }
}

/// Extracts "EUR" from "EUR_USD" (or "EUR/USD").
pub fn base_currency(instrument: &str) -> &str {
    instrument
        .split(['_', '/'])
        .next()
        .unwrap_or(instrument)
}
