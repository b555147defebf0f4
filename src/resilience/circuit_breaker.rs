//! Circuit breaker guarding the venue.
//!
//! CLOSED counts failures in a rolling window. Reaching the threshold opens
//! the circuit and calls fail fast. After the cooldown exactly one trial call
//! is let through (HALF_OPEN): success closes the circuit, failure reopens it.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::CircuitBreakerConfig;

/// Breaker state with the data each phase needs.
#[derive(Debug, Clone, PartialEq)]
enum CircuitState {
    Closed { failures: VecDeque<Instant> },
    Open { opened_at: Instant },
    HalfOpen { trial_in_flight: bool },
}

/// State label without the attached data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitPhase {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitPhase::Closed => write!(f, "closed"),
            CircuitPhase::Open => write!(f, "open"),
            CircuitPhase::HalfOpen => write!(f, "half_open"),
        }
    }
}

impl CircuitState {
    fn closed() -> Self {
        CircuitState::Closed {
            failures: VecDeque::new(),
        }
    }

    fn phase(&self) -> CircuitPhase {
        match self {
            CircuitState::Closed { .. } => CircuitPhase::Closed,
            CircuitState::Open { .. } => CircuitPhase::Open,
            CircuitState::HalfOpen { .. } => CircuitPhase::HalfOpen,
        }
    }
}

pub struct CircuitBreaker {
    failure_threshold: usize,
    failure_window: Duration,
    cooldown: Duration,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1) as usize,
            failure_window: config.failure_window,
            cooldown: config.cooldown,
            state: Mutex::new(CircuitState::closed()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CircuitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> CircuitPhase {
        self.lock().phase()
    }

    /// Failures currently counted in the rolling window.
    pub fn failure_count(&self) -> usize {
        match &*self.lock() {
            CircuitState::Closed { failures } => failures.len(),
            _ => self.failure_threshold,
        }
    }

    /// Asks permission to call the venue.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut state = self.lock();
        match &mut *state {
            CircuitState::Closed { .. } => true,
            CircuitState::Open { opened_at } => {
                if now.saturating_duration_since(*opened_at) < self.cooldown {
                    return false;
                }
                info!("Circuit breaker half-open, allowing one trial call");
                *state = CircuitState::HalfOpen {
                    trial_in_flight: true,
                };
                true
            }
            CircuitState::HalfOpen { trial_in_flight } => {
                if *trial_in_flight {
                    false
                } else {
                    *trial_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.lock();
        match &mut *state {
            CircuitState::Closed { failures } => failures.clear(),
            CircuitState::HalfOpen { .. } => {
                info!("Circuit breaker closed after successful trial call");
                *state = CircuitState::closed();
            }
            CircuitState::Open { .. } => {}
        }
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&self, now: Instant) {
        let mut state = self.lock();
        match &mut *state {
            CircuitState::Closed { failures } => {
                while let Some(oldest) = failures.front() {
                    if now.saturating_duration_since(*oldest) > self.failure_window {
                        failures.pop_front();
                    } else {
                        break;
                    }
                }
                failures.push_back(now);

                if failures.len() >= self.failure_threshold {
                    warn!(
                        failures = failures.len(),
                        cooldown_ms = self.cooldown.as_millis() as u64,
                        "Circuit breaker opened"
                    );
                    *state = CircuitState::Open { opened_at: now };
                }
            }
            CircuitState::HalfOpen { .. } => {
                warn!("Trial call failed, circuit breaker reopened");
                *state = CircuitState::Open { opened_at: now };
            }
            CircuitState::Open { .. } => {}
        }
    }
}
