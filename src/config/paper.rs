//! Paper venue configuration.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::duration;

/// Simulated account used when no live venue is wired in.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub balance: f64,
    /// Leverage applied to margin requirements.
    pub leverage: f64,
    /// Share of each order that fills (1.0 fills everything).
    pub fill_ratio: f64,
    /// Instruments quoted by the paper venue.
    pub instruments: HashMap<String, PaperInstrument>,
    /// JSON price path replayed into the quotes. Without one, prices stay
    /// at their configured values.
    pub price_path: Option<String>,
    /// Time between price path ticks.
    #[serde(with = "duration")]
    pub tick_interval: Duration,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            balance: 10_000.0,
            leverage: 30.0,
            fill_ratio: 1.0,
            instruments: HashMap::new(),
            price_path: None,
            tick_interval: Duration::from_secs(30),
        }
    }
}

/// Quote and metadata for one paper instrument.
#[derive(Debug, Clone, Deserialize)]
pub struct PaperInstrument {
    pub price: f64,
    pub pip_value: f64,
    pub pip_size: f64,
    pub margin_rate: f64,
    #[serde(default = "default_minimum_trade_size")]
    pub minimum_trade_size: f64,
    #[serde(default)]
    pub precision: u32,
}

fn default_minimum_trade_size() -> f64 {
    1.0
}
