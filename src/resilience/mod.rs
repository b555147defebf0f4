//! Resilient access to the venue.
//!
//! Every call carries a timeout and passes through the circuit breaker.
//! Idempotent calls are retried with exponential backoff on transient
//! failures. Order submission and position close run once, since a timed
//! out attempt may still have executed at the venue.

mod backoff;
mod circuit_breaker;
mod fills;

pub use backoff::Backoff;
pub use circuit_breaker::{CircuitBreaker, CircuitPhase};
pub use fills::{
    FillClass, PartialFillAction, average_fill_price, classify, partial_fill_action,
};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::ResilienceConfig;
use crate::domain::{AccountState, InstrumentMetadata};
use crate::venue::{
    ClosedPosition, OrderRequest, OrderResponse, Result, Venue, VenueError, VenuePosition,
};

/// Timeout, retry and circuit breaking around a fallible async operation.
pub struct Resilience {
    call_timeout: Duration,
    backoff: Backoff,
    breaker: CircuitBreaker,
}

impl Resilience {
    pub fn new(config: &ResilienceConfig) -> Self {
        Self {
            call_timeout: config.call_timeout,
            backoff: Backoff::new(&config.retry),
            breaker: CircuitBreaker::new(&config.circuit_breaker),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Runs `op` with retries on retryable failures.
    pub async fn call<T, F, Fut>(&self, name: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(name, op, true).await
    }

    /// Runs `op` a single time. Timeout and breaker still apply.
    pub async fn call_once<T, F, Fut>(&self, name: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(name, op, false).await
    }

    async fn run<T, F, Fut>(&self, name: &str, mut op: F, retry: bool) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if !self.breaker.try_acquire() {
                debug!(operation = name, "Circuit open, venue call skipped");
                return Err(VenueError::CircuitOpen);
            }

            let outcome = match tokio::time::timeout(self.call_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(VenueError::Timeout),
            };

            match outcome {
                Ok(value) => {
                    self.breaker.record_success();
                    if attempt > 0 {
                        info!(
                            operation = name,
                            attempt = attempt + 1,
                            "Venue call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    self.breaker.record_failure();
                    if !retry || !self.backoff.should_retry(attempt) {
                        warn!(
                            operation = name,
                            attempts = attempt + 1,
                            breaker_failures = self.breaker.failure_count(),
                            error = %e,
                            "Venue call failed"
                        );
                        return Err(e);
                    }
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        operation = name,
                        attempt = attempt + 1,
                        max_retries = self.backoff.max_retries(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Venue call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    // A refusal still proves the venue is reachable.
                    self.breaker.record_success();
                    debug!(operation = name, error = %e, "Venue call refused, not retried");
                    return Err(e);
                }
            }
        }
    }
}

/// ResilientVenue wraps another venue with [`Resilience`].
pub struct ResilientVenue {
    inner: Arc<dyn Venue>,
    resilience: Resilience,
}

impl ResilientVenue {
    pub fn new(inner: Arc<dyn Venue>, config: &ResilienceConfig) -> Self {
        Self {
            inner,
            resilience: Resilience::new(config),
        }
    }

    pub fn circuit_phase(&self) -> CircuitPhase {
        self.resilience.breaker().phase()
    }
}

#[async_trait]
impl Venue for ResilientVenue {
    async fn get_account_state(&self) -> Result<AccountState> {
        self.resilience
            .call("get_account_state", || self.inner.get_account_state())
            .await
    }

    async fn get_instrument_metadata(&self, instrument: &str) -> Result<InstrumentMetadata> {
        self.resilience
            .call("get_instrument_metadata", || {
                self.inner.get_instrument_metadata(instrument)
            })
            .await
    }

    async fn current_price(&self, instrument: &str) -> Result<f64> {
        self.resilience
            .call("current_price", || self.inner.current_price(instrument))
            .await
    }

    async fn submit_order(&self, order: OrderRequest) -> Result<OrderResponse> {
        self.resilience
            .call_once("submit_order", || self.inner.submit_order(order.clone()))
            .await
    }

    async fn get_open_positions(&self) -> Result<Vec<VenuePosition>> {
        self.resilience
            .call("get_open_positions", || self.inner.get_open_positions())
            .await
    }

    async fn update_stop(&self, instrument: &str, stop: f64) -> Result<()> {
        self.resilience
            .call("update_stop", || self.inner.update_stop(instrument, stop))
            .await
    }

    async fn close_position(&self, instrument: &str) -> Result<ClosedPosition> {
        self.resilience
            .call_once("close_position", || self.inner.close_position(instrument))
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests;
