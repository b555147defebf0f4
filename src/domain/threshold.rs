//! Adjustment log entries for the adaptive confidence threshold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::VolatilityRegime;

/// Why the threshold moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// Too many cycles passed without an admissible signal.
    NoSignalPressure,
    /// Win rate and profit factor both high.
    StrongPerformance,
    /// Win rate and profit factor both low.
    PoorPerformance,
    /// Both metrics near parity.
    MarginalPerformance,
    /// Explicit reset to the base value.
    Reset,
}

impl AdjustmentReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentReason::NoSignalPressure => "no_signal_pressure",
            AdjustmentReason::StrongPerformance => "strong_performance",
            AdjustmentReason::PoorPerformance => "poor_performance",
            AdjustmentReason::MarginalPerformance => "marginal_performance",
            AdjustmentReason::Reset => "reset",
        }
    }
}

impl std::fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AdjustmentReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_signal_pressure" => Ok(AdjustmentReason::NoSignalPressure),
            "strong_performance" => Ok(AdjustmentReason::StrongPerformance),
            "poor_performance" => Ok(AdjustmentReason::PoorPerformance),
            "marginal_performance" => Ok(AdjustmentReason::MarginalPerformance),
            "reset" => Ok(AdjustmentReason::Reset),
            _ => Err(format!("Unknown adjustment reason: {}", s)),
        }
    }
}

/// Metrics that triggered an adjustment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub cycles_without_signal: Option<u32>,
    pub win_rate: Option<f64>,
    pub profit_factor: Option<f64>,
    pub trades_analyzed: Option<usize>,
    pub volatility: Option<VolatilityRegime>,
    /// Step actually applied (after volatility acceleration).
    pub step: f64,
}

/// AdjustmentRecord is an immutable, append-only log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentRecord {
    pub timestamp: DateTime<Utc>,
    pub old_threshold: f64,
    pub new_threshold: f64,
    pub reason: AdjustmentReason,
    pub snapshot: MetricSnapshot,
}
