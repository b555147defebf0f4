//! Configuration loading and validation for the trader.
//!
//! Uses serde_yaml to load YAML configuration files. Every section except
//! `app` is optional and falls back to conservative defaults.

mod adaptive;
mod app;
mod duration;
mod error;
mod monitor;
mod paper;
mod resilience;
mod risk;
mod sizing;
mod storage;
mod trader;

pub use adaptive::{AdaptiveConfig, PerformanceBands};
pub use app::AppConfig;
pub use error::ConfigError;
pub use monitor::{MonitorConfig, TrailingConfig};
pub use paper::PaperConfig;
pub use resilience::{
    CircuitBreakerConfig, FillConfig, PartialFillPolicy, ResilienceConfig, RetryConfig,
};
pub use risk::RiskConfig;
pub use sizing::{MarginFormula, SizingConfig, SizingMethod};
pub use storage::StorageConfig;
pub use trader::{SignalsConfig, TraderConfig};

use serde::Deserialize;
use std::{env, fs};

/// Root configuration structure.
///
/// Required sections: app.
/// Optional sections: sizing, risk, adaptive, resilience, monitor, trader,
/// storage, paper, signals.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub adaptive: AdaptiveConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub trader: TraderConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Loads `.env` first (if present), then applies environment overrides:
    /// - `STORAGE_PATH` replaces `storage.path`
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_string(),
            source,
        })?;
        let mut config: Config = serde_yaml::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = env::var("STORAGE_PATH") {
            if !path.is_empty() {
                self.storage.path = path;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        self.validate_sizing()?;
        self.validate_risk()?;
        self.validate_adaptive()?;
        self.validate_resilience()?;

        if self.monitor.interval.is_zero() {
            return Err(ConfigError::Validation(
                "monitor.interval must be positive".into(),
            ));
        }
        if self.trader.cycle_interval.is_zero() {
            return Err(ConfigError::Validation(
                "trader.cycle_interval must be positive".into(),
            ));
        }
        if self.paper.price_path.is_some() && self.paper.tick_interval.is_zero() {
            return Err(ConfigError::Validation(
                "paper.tick_interval must be positive".into(),
            ));
        }

        Ok(())
    }

    fn validate_sizing(&self) -> Result<(), ConfigError> {
        let s = &self.sizing;
        unit_fraction("sizing.risk_per_trade", s.risk_per_trade, false)?;
        unit_fraction("sizing.kelly_fraction", s.kelly_fraction, false)?;
        unit_fraction("sizing.kelly_cap", s.kelly_cap, false)?;
        unit_fraction("sizing.margin_buffer", s.margin_buffer, true)?;
        unit_fraction("sizing.max_margin_usage", s.max_margin_usage, false)?;
        positive("sizing.leverage_estimate", s.leverage_estimate)?;
        positive("sizing.max_order_units", s.max_order_units)?;
        if !s.min_trade_value.is_finite() || s.min_trade_value < 0.0 {
            return Err(ConfigError::Validation(
                "sizing.min_trade_value must be non-negative".into(),
            ));
        }
        if s.margin_buffer >= 1.0 && s.margin_formula == MarginFormula::Multiplicative {
            return Err(ConfigError::Validation(
                "sizing.margin_buffer must be below 1 for the multiplicative formula".into(),
            ));
        }
        Ok(())
    }

    fn validate_risk(&self) -> Result<(), ConfigError> {
        let r = &self.risk;
        if r.max_open_positions == 0 {
            return Err(ConfigError::Validation(
                "risk.max_open_positions must be positive".into(),
            ));
        }
        if r.max_correlation_positions == 0 {
            return Err(ConfigError::Validation(
                "risk.max_correlation_positions must be positive".into(),
            ));
        }
        unit_fraction("risk.max_risk_per_trade", r.max_risk_per_trade, false)?;
        unit_fraction("risk.max_total_risk", r.max_total_risk, false)?;
        positive("risk.max_units_per_instrument", r.max_units_per_instrument)?;
        if !r.max_slippage_pips.is_finite() || r.max_slippage_pips < 0.0 {
            return Err(ConfigError::Validation(
                "risk.max_slippage_pips must be non-negative".into(),
            ));
        }
        Ok(())
    }

    fn validate_adaptive(&self) -> Result<(), ConfigError> {
        let a = &self.adaptive;
        unit_fraction("adaptive.min_threshold", a.min_threshold, false)?;
        unit_fraction("adaptive.max_threshold", a.max_threshold, false)?;
        if a.min_threshold >= a.max_threshold {
            return Err(ConfigError::Validation(format!(
                "adaptive.min_threshold ({}) must be below adaptive.max_threshold ({})",
                a.min_threshold, a.max_threshold
            )));
        }
        if !(a.min_threshold..=a.max_threshold).contains(&a.base_threshold) {
            return Err(ConfigError::Validation(format!(
                "adaptive.base_threshold ({}) must lie within [{}, {}]",
                a.base_threshold, a.min_threshold, a.max_threshold
            )));
        }
        if a.no_signal_cycles == 0 {
            return Err(ConfigError::Validation(
                "adaptive.no_signal_cycles must be positive".into(),
            ));
        }
        positive("adaptive.adjustment_step", a.adjustment_step)?;
        if !(2.0..=3.0).contains(&a.low_volatility_acceleration) {
            return Err(ConfigError::Validation(
                "adaptive.low_volatility_acceleration must be between 2 and 3".into(),
            ));
        }
        Ok(())
    }

    fn validate_resilience(&self) -> Result<(), ConfigError> {
        let r = &self.resilience;
        if r.call_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "resilience.call_timeout must be positive".into(),
            ));
        }
        if r.retry.base_delay > r.retry.max_delay {
            return Err(ConfigError::Validation(
                "resilience.retry.base_delay must not exceed max_delay".into(),
            ));
        }
        if r.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Validation(
                "resilience.circuit_breaker.failure_threshold must be positive".into(),
            ));
        }
        let pct = r.fills.min_partial_fill_pct;
        if !(0.0..=100.0).contains(&pct) {
            return Err(ConfigError::Validation(
                "resilience.fills.min_partial_fill_pct must be between 0 and 100".into(),
            ));
        }
        Ok(())
    }
}

/// Checks `value` lies in (0, 1], or [0, 1] when `allow_zero` is set.
fn unit_fraction(name: &str, value: f64, allow_zero: bool) -> Result<(), ConfigError> {
    let lower_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
    if !value.is_finite() || !lower_ok || value > 1.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be a fraction in {}0, 1], got {}",
            name,
            if allow_zero { "[" } else { "(" },
            value
        )));
    }
    Ok(())
}

fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be positive, got {}",
            name, value
        )));
    }
    Ok(())
}
