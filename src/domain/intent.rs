//! Trade candidates produced by the signal generator.

use serde::{Deserialize, Serialize};

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// Sign applied to unit quantities: +1 for buys, -1 for sells.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Buy => 1.0,
            Direction::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "buy"),
            Direction::Sell => write!(f, "sell"),
        }
    }
}

/// Volatility regime reported alongside a signal batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityRegime {
    Low,
    Normal,
    High,
}

/// PositionIntent is a candidate trade requested at cycle time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionIntent {
    /// Instrument in "BASE_QUOTE" form (e.g. "EUR_USD").
    pub instrument: String,
    pub direction: Direction,
    /// Signal confidence in [0, 1].
    pub confidence: f64,
    /// Volatility-derived stop distance in pips.
    pub stop_distance: f64,
    /// Volatility-derived target distance in pips.
    pub target_distance: f64,
}

impl PositionIntent {
    /// Stop and target prices anchored at `price`.
    pub fn protection_levels(&self, price: f64, pip_size: f64) -> (f64, f64) {
        let stop_delta = self.stop_distance * pip_size;
        let target_delta = self.target_distance * pip_size;
        match self.direction {
            Direction::Buy => (price - stop_delta, price + target_delta),
            Direction::Sell => (price + stop_delta, price - target_delta),
        }
    }
}
