//! Storage configuration.

use serde::Deserialize;

/// Persistence settings for thresholds and trades.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// When false, state is kept in memory and lost on restart.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path to the SQLite database file.
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_path() -> String {
    "data/riskgate.db".to_string()
}
