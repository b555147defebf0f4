//! Risk management configuration.

use serde::Deserialize;

/// Portfolio-level admission limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Maximum concurrent open positions.
    pub max_open_positions: usize,
    /// Maximum risk of a single trade as a fraction of balance.
    pub max_risk_per_trade: f64,
    /// Maximum combined risk of all open positions as a fraction of balance.
    pub max_total_risk: f64,
    /// Maximum open positions sharing one base currency.
    pub max_correlation_positions: usize,
    /// Maximum units for one instrument.
    pub max_units_per_instrument: f64,
    /// Slippage above this many pips is flagged.
    pub max_slippage_pips: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_open_positions: 1,
            max_risk_per_trade: 0.5,
            max_total_risk: 0.15,
            max_correlation_positions: 2,
            max_units_per_instrument: 100_000.0,
            max_slippage_pips: 2.0,
        }
    }
}
