//! Account and instrument snapshots supplied by the venue.

use serde::{Deserialize, Serialize};

/// AccountState is the venue's view of the account for the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    /// Account balance in account currency.
    pub balance: f64,
    /// Margin still available for new positions.
    pub margin_available: f64,
    /// Margin locked by open positions.
    pub margin_used: f64,
}

/// InstrumentMetadata describes how an instrument is quoted and traded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentMetadata {
    /// Monetary value of one pip per unit, used to turn a pip distance into risk.
    pub pip_value: f64,
    /// Price increment of one pip (e.g. 0.0001 for EUR_USD).
    pub pip_size: f64,
    /// Fraction of notional the venue locks as margin.
    pub margin_rate: f64,
    /// Smallest order the venue accepts, in units.
    pub minimum_trade_size: f64,
    /// Number of decimals allowed in the unit quantity.
    pub precision: u32,
    /// Largest single order the venue accepts, if it publishes one.
    #[serde(default)]
    pub maximum_order_units: Option<f64>,
}

impl InstrumentMetadata {
    /// Rounds a unit quantity down to the instrument precision.
    pub fn round_units_down(&self, units: f64) -> f64 {
        let factor = 10f64.powi(self.precision as i32);
        (units * factor).floor() / factor
    }

    /// Rounds a unit quantity up to the instrument precision.
    pub fn round_units_up(&self, units: f64) -> f64 {
        let factor = 10f64.powi(self.precision as i32);
        (units * factor).ceil() / factor
    }

    /// Converts a price difference into pips.
    pub fn price_to_pips(&self, price_delta: f64) -> f64 {
        if self.pip_size > 0.0 {
            price_delta / self.pip_size
        } else {
            0.0
        }
    }
}
