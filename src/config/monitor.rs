//! Position monitor configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Position monitor loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Fixed polling interval.
    #[serde(with = "duration")]
    pub interval: Duration,
    pub trailing: TrailingConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
            trailing: TrailingConfig::default(),
        }
    }
}

/// Trailing stop settings, expressed in multiples of the entry stop distance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrailingConfig {
    pub enabled: bool,
    /// Favourable move required before trailing starts.
    pub activation_multiplier: f64,
    /// How far the stop moves on each new favourable extreme.
    pub move_multiplier: f64,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            activation_multiplier: 1.0,
            move_multiplier: 0.5,
        }
    }
}
