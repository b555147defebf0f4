//! Venue call resilience configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::duration;

/// Venue call settings: timeout, retries, circuit breaker and fill policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Upper bound on a single venue call.
    #[serde(with = "duration")]
    pub call_timeout: Duration,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub fills: FillConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            fills: FillConfig::default(),
        }
    }
}

/// Exponential backoff for retryable failures.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(with = "duration")]
    pub base_delay: Duration,
    /// Ceiling for any single delay.
    #[serde(with = "duration")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures inside the rolling window that open the circuit.
    pub failure_threshold: u32,
    /// Rolling window over which failures are counted.
    #[serde(with = "duration")]
    pub failure_window: Duration,
    /// Time spent OPEN before a single trial call is allowed.
    #[serde(with = "duration")]
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(300),
            cooldown: Duration::from_secs(60),
        }
    }
}

/// What to do with a partially filled order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartialFillPolicy {
    /// Keep the filled amount.
    Accept,
    /// Resubmit the remainder once when the fill ratio is too low.
    Retry,
    /// Flatten the partial and account it as a rejection.
    Cancel,
}

/// Partial fill handling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FillConfig {
    pub partial_fill_strategy: PartialFillPolicy,
    /// Minimum acceptable fill, in percent of the requested units.
    pub min_partial_fill_pct: f64,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            partial_fill_strategy: PartialFillPolicy::Accept,
            min_partial_fill_pct: 50.0,
        }
    }
}
