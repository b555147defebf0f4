//! Position sizing configuration.

use serde::{Deserialize, Serialize};

/// Interchangeable sizing methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    /// Fixed fraction of balance at risk per trade.
    FixedFractional,
    /// Kelly fraction derived from trailing performance.
    Kelly,
    /// Units bounded by usable margin and leverage.
    Margin,
    /// Minimum of margin, risk and cap constraints.
    AutoScale,
}

impl SizingMethod {
    /// Margin-aware methods need available margin to run.
    pub fn is_margin_aware(&self) -> bool {
        matches!(self, SizingMethod::Margin | SizingMethod::AutoScale)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizingMethod::FixedFractional => "fixed_fractional",
            SizingMethod::Kelly => "kelly",
            SizingMethod::Margin => "margin",
            SizingMethod::AutoScale => "auto_scale",
        }
    }
}

impl std::fmt::Display for SizingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How usable margin is derived from the margin buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginFormula {
    /// available_margin × (1 − margin_buffer).
    Multiplicative,
    /// available_margin − balance × margin_buffer.
    Subtractive,
}

/// Position sizing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Configured sizing method.
    pub method: SizingMethod,
    /// Fraction of balance risked per trade (e.g. 0.02 for 2%).
    pub risk_per_trade: f64,
    /// Fraction of the clipped Kelly value actually used (0.25 = quarter Kelly).
    pub kelly_fraction: f64,
    /// Upper clip for the Kelly capital fraction.
    pub kelly_cap: f64,
    /// Closed trades required before Kelly is trusted.
    pub kelly_min_trades: usize,
    /// Trailing window of closed trades fed to Kelly.
    pub performance_window: usize,
    /// Share of available margin kept untouched.
    pub margin_buffer: f64,
    /// Cap on margin as a fraction of balance.
    pub max_margin_usage: f64,
    /// Leverage assumed when the venue margin rate is unknown.
    pub leverage_estimate: f64,
    /// Minimum trade value in account currency.
    pub min_trade_value: f64,
    /// Per-order unit cap.
    pub max_order_units: f64,
    /// Which usable-margin formula to apply.
    pub margin_formula: MarginFormula,
    /// Promote risk-based methods to auto-scale when margin is known.
    pub prefer_margin_aware: bool,
    /// Force legacy fixed/Kelly sizes up to the minimum floor.
    pub force_minimum: bool,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            method: SizingMethod::AutoScale,
            risk_per_trade: 0.02,
            kelly_fraction: 0.25,
            kelly_cap: 0.25,
            kelly_min_trades: 30,
            performance_window: 50,
            margin_buffer: 0.5,
            max_margin_usage: 0.5,
            leverage_estimate: 20.0,
            min_trade_value: 1.5,
            max_order_units: 100_000_000.0,
            margin_formula: MarginFormula::Multiplicative,
            prefer_margin_aware: true,
            force_minimum: true,
        }
    }
}
