//! Adaptive confidence threshold configuration.

use serde::Deserialize;

/// Adaptive threshold settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Threshold used when nothing was persisted yet, and by reset.
    pub base_threshold: f64,
    /// Safety floor.
    pub min_threshold: f64,
    /// Safety ceiling.
    pub max_threshold: f64,
    /// Cycles without an admissible signal before lowering the threshold.
    pub no_signal_cycles: u32,
    /// Size of one adjustment.
    pub adjustment_step: f64,
    /// Step multiplier applied during a low-volatility regime (2.0 to 3.0).
    pub low_volatility_acceleration: f64,
    /// Performance bands for trade feedback.
    pub performance: PerformanceBands,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            base_threshold: 0.8,
            min_threshold: 0.5,
            max_threshold: 0.95,
            no_signal_cycles: 5,
            adjustment_step: 0.02,
            low_volatility_acceleration: 2.0,
            performance: PerformanceBands::default(),
        }
    }
}

/// Win-rate and profit-factor bands driving performance feedback.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerformanceBands {
    /// Closed trades required in the window before feedback applies.
    pub min_trades: usize,
    /// Trailing window size in closed trades.
    pub window: usize,
    pub strong_win_rate: f64,
    pub strong_profit_factor: f64,
    pub poor_win_rate: f64,
    pub poor_profit_factor: f64,
    /// Step multiplier when raising on poor performance.
    pub poor_step_multiplier: f64,
    pub marginal_win_rate_low: f64,
    pub marginal_win_rate_high: f64,
    pub marginal_profit_factor_low: f64,
    pub marginal_profit_factor_high: f64,
}

impl Default for PerformanceBands {
    fn default() -> Self {
        Self {
            min_trades: 5,
            window: 20,
            strong_win_rate: 0.65,
            strong_profit_factor: 1.5,
            poor_win_rate: 0.45,
            poor_profit_factor: 0.8,
            poor_step_multiplier: 1.5,
            marginal_win_rate_low: 0.50,
            marginal_win_rate_high: 0.55,
            marginal_profit_factor_low: 0.9,
            marginal_profit_factor_high: 1.1,
        }
    }
}
