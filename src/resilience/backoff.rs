//! Exponential backoff between retries of a venue call.

use std::time::Duration;

use crate::config::RetryConfig;

/// Backoff computes `min(base_delay × 2^attempt, max_delay)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_delay: Duration,
    max_delay: Duration,
    max_retries: u32,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            max_retries: config.max_retries,
        }
    }

    /// Delay before retry number `attempt + 1` (attempt is 0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// True while another retry is allowed after `attempt` failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff(base_ms: u64, max_ms: u64, retries: u32) -> Backoff {
        Backoff::new(&RetryConfig {
            max_retries: retries,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
        })
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let b = backoff(1000, 60_000, 5);
        assert_eq!(b.delay(0), Duration::from_secs(1));
        assert_eq!(b.delay(1), Duration::from_secs(2));
        assert_eq!(b.delay(2), Duration::from_secs(4));
        assert_eq!(b.delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let b = backoff(1000, 5000, 10);
        assert_eq!(b.delay(3), Duration::from_secs(5));
        assert_eq!(b.delay(40), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_budget() {
        let b = backoff(10, 100, 2);
        assert!(b.should_retry(0));
        assert!(b.should_retry(1));
        assert!(!b.should_retry(2));
    }
}
