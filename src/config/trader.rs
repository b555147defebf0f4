//! Decision loop and signal input configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Decision cycle settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TraderConfig {
    /// Interval between decision cycles.
    #[serde(with = "duration")]
    pub cycle_interval: Duration,
    /// Reconcile the ledger with the venue every N cycles (0 disables).
    pub reconcile_every: u64,
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(120),
            reconcile_every: 10,
        }
    }
}

/// Signal replay input.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignalsConfig {
    /// JSON file with signal batches to replay.
    pub path: Option<String>,
}
