//! Adaptive confidence threshold.
//!
//! A single persisted gate value moved by signal scarcity and by trade
//! performance. Every transition is written to the repository before the
//! call returns. When a write fails the controller keeps running on its
//! in-memory value and reports itself as degraded until a write succeeds.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{AdaptiveConfig, PerformanceBands};
use crate::domain::{
    AdjustmentReason, AdjustmentRecord, MetricSnapshot, PerformanceWindow, VolatilityRegime,
};
use crate::storage::ThresholdRepository;

/// Controller status for logging and inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdStatus {
    pub current: f64,
    pub base: f64,
    pub min: f64,
    pub max: f64,
    pub cycles_without_signal: u32,
    pub persistence_degraded: bool,
}

struct ControllerState {
    current: f64,
    cycles_without_signal: u32,
    persistence_degraded: bool,
}

/// Performance band a window falls into, with the signed step multiplier.
pub fn classify_performance(
    bands: &PerformanceBands,
    window: &PerformanceWindow,
) -> Option<(AdjustmentReason, f64)> {
    if window.total_trades < bands.min_trades {
        return None;
    }
    let (win, pf) = (window.win_rate, window.profit_factor);

    if win >= bands.strong_win_rate && pf >= bands.strong_profit_factor {
        Some((AdjustmentReason::StrongPerformance, 1.0))
    } else if win < bands.poor_win_rate && pf < bands.poor_profit_factor {
        Some((AdjustmentReason::PoorPerformance, bands.poor_step_multiplier))
    } else if (bands.marginal_win_rate_low..bands.marginal_win_rate_high).contains(&win)
        && (bands.marginal_profit_factor_low..bands.marginal_profit_factor_high).contains(&pf)
    {
        Some((AdjustmentReason::MarginalPerformance, -1.0))
    } else {
        None
    }
}

/// ThresholdController owns the gate value and its no-signal counter.
pub struct ThresholdController {
    config: AdaptiveConfig,
    repo: Arc<dyn ThresholdRepository>,
    state: Mutex<ControllerState>,
}

impl ThresholdController {
    /// Loads the last persisted threshold (clamped into bounds) or starts at
    /// the base value. Must complete before the first gating decision.
    pub async fn load(config: AdaptiveConfig, repo: Arc<dyn ThresholdRepository>) -> Self {
        let mut persistence_degraded = false;

        let current = match repo.last_threshold().await {
            Ok(Some(last)) if last.is_finite() => {
                let clamped = last.clamp(config.min_threshold, config.max_threshold);
                info!(
                    stored = last,
                    current = clamped,
                    "Adaptive threshold loaded from storage"
                );
                clamped
            }
            Ok(_) => {
                info!(current = config.base_threshold, "Adaptive threshold starts at base value");
                config.base_threshold
            }
            Err(e) => {
                warn!(error = %e, "Failed to load threshold, starting at base value");
                persistence_degraded = true;
                config.base_threshold
            }
        };

        let cycles_without_signal = match repo.no_signal_cycles().await {
            Ok(cycles) => cycles.min(config.no_signal_cycles.saturating_sub(1)),
            Err(e) => {
                warn!(error = %e, "Failed to load no-signal counter");
                persistence_degraded = true;
                0
            }
        };

        info!(
            current = current,
            base = config.base_threshold,
            min = config.min_threshold,
            max = config.max_threshold,
            cycles_without_signal = cycles_without_signal,
            "Adaptive threshold initialized"
        );

        Self {
            config,
            repo,
            state: Mutex::new(ControllerState {
                current,
                cycles_without_signal,
                persistence_degraded,
            }),
        }
    }

    pub async fn current(&self) -> f64 {
        self.state.lock().await.current
    }

    pub async fn status(&self) -> ThresholdStatus {
        let state = self.state.lock().await;
        ThresholdStatus {
            current: state.current,
            base: self.config.base_threshold,
            min: self.config.min_threshold,
            max: self.config.max_threshold,
            cycles_without_signal: state.cycles_without_signal,
            persistence_degraded: state.persistence_degraded,
        }
    }

    /// Records the outcome of one decision cycle. After `no_signal_cycles`
    /// consecutive empty cycles the threshold drops by one step, accelerated
    /// in a low-volatility regime, and the counter starts over.
    pub async fn record_cycle(
        &self,
        signals_found: usize,
        volatility: Option<VolatilityRegime>,
    ) -> Option<AdjustmentRecord> {
        let mut state = self.state.lock().await;

        if signals_found > 0 {
            if state.cycles_without_signal > 0 {
                state.cycles_without_signal = 0;
                self.save_counter(&mut state).await;
            }
            return None;
        }

        state.cycles_without_signal += 1;
        debug!(
            cycles_without_signal = state.cycles_without_signal,
            limit = self.config.no_signal_cycles,
            "Cycle without signal"
        );

        if state.cycles_without_signal < self.config.no_signal_cycles {
            self.save_counter(&mut state).await;
            return None;
        }

        let step = match volatility {
            Some(VolatilityRegime::Low) => {
                self.config.adjustment_step * self.config.low_volatility_acceleration
            }
            _ => self.config.adjustment_step,
        };
        let snapshot = MetricSnapshot {
            cycles_without_signal: Some(state.cycles_without_signal),
            volatility,
            step,
            ..MetricSnapshot::default()
        };

        state.cycles_without_signal = 0;
        let target = state.current - step;
        let record = self
            .transition(&mut state, target, AdjustmentReason::NoSignalPressure, snapshot)
            .await;
        self.save_counter(&mut state).await;
        record
    }

    /// Applies performance feedback from the trailing trade window.
    pub async fn record_performance(&self, window: &PerformanceWindow) -> Option<AdjustmentRecord> {
        let (reason, multiplier) = classify_performance(&self.config.performance, window)?;
        let step = self.config.adjustment_step * multiplier;

        let snapshot = MetricSnapshot {
            win_rate: Some(window.win_rate),
            profit_factor: Some(window.profit_factor),
            trades_analyzed: Some(window.total_trades),
            step: step.abs(),
            ..MetricSnapshot::default()
        };

        let mut state = self.state.lock().await;
        let target = state.current + step;
        self.transition(&mut state, target, reason, snapshot).await
    }

    /// Returns the threshold to its base value. Always logged.
    pub async fn reset(&self) -> AdjustmentRecord {
        let mut state = self.state.lock().await;
        state.cycles_without_signal = 0;

        let record = AdjustmentRecord {
            timestamp: Utc::now(),
            old_threshold: state.current,
            new_threshold: self.config.base_threshold,
            reason: AdjustmentReason::Reset,
            snapshot: MetricSnapshot::default(),
        };
        self.commit(&mut state, &record).await;
        self.save_counter(&mut state).await;
        record
    }

    /// Clamps `target` and commits it unless the value would not change.
    async fn transition(
        &self,
        state: &mut ControllerState,
        target: f64,
        reason: AdjustmentReason,
        snapshot: MetricSnapshot,
    ) -> Option<AdjustmentRecord> {
        let new = target.clamp(self.config.min_threshold, self.config.max_threshold);
        if new == state.current {
            debug!(
                current = state.current,
                reason = %reason,
                "Threshold already at bound, no adjustment"
            );
            return None;
        }

        let record = AdjustmentRecord {
            timestamp: Utc::now(),
            old_threshold: state.current,
            new_threshold: new,
            reason,
            snapshot,
        };
        self.commit(state, &record).await;
        Some(record)
    }

    async fn commit(&self, state: &mut ControllerState, record: &AdjustmentRecord) {
        state.current = record.new_threshold;

        info!(
            old = record.old_threshold,
            new = record.new_threshold,
            reason = %record.reason,
            step = record.snapshot.step,
            "Adaptive threshold adjusted"
        );

        match self.repo.append_adjustment(record).await {
            Ok(()) => self.mark_persisted(state),
            Err(e) => {
                warn!(
                    error = %e,
                    new = record.new_threshold,
                    "Failed to persist threshold adjustment, continuing in memory"
                );
                state.persistence_degraded = true;
            }
        }
    }

    async fn save_counter(&self, state: &mut ControllerState) {
        // Only a committed adjustment clears the degraded flag.
        if let Err(e) = self.repo.save_no_signal_cycles(state.cycles_without_signal).await {
            warn!(error = %e, "Failed to persist no-signal counter");
            state.persistence_degraded = true;
        }
    }

    fn mark_persisted(&self, state: &mut ControllerState) {
        if state.persistence_degraded {
            info!("Threshold persistence recovered");
            state.persistence_degraded = false;
        }
    }
}
