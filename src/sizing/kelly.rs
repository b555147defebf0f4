//! Kelly criterion sizing.

use tracing::debug;

use super::{
    FixedFractional, SizingBreakdown, SizingInput, SizingLimits, SizingResult, SizingStrategy,
};
use crate::config::SizingMethod;
use crate::domain::PerformanceWindow;

/// Sizes from the Kelly fraction of the trailing performance window.
///
/// Falls back to fixed-fractional sizing until `kelly_min_trades` closed
/// trades with both wins and losses exist.
#[derive(Debug, Clone)]
pub struct Kelly {
    limits: SizingLimits,
    fallback: FixedFractional,
}

impl Kelly {
    pub fn new(limits: SizingLimits) -> Self {
        Self {
            fallback: FixedFractional::new(limits.clone()),
            limits,
        }
    }

    /// Clipped Kelly fraction: W − (1 − W) / R, within [0, kelly_cap].
    pub fn capital_fraction(&self, win_rate: f64, reward_risk_ratio: f64) -> f64 {
        let raw = win_rate - (1.0 - win_rate) / reward_risk_ratio;
        if raw.is_finite() {
            raw.clamp(0.0, self.limits.config().kelly_cap)
        } else {
            0.0
        }
    }

    fn usable_window<'a>(
        &self,
        window: Option<&'a PerformanceWindow>,
    ) -> Option<(&'a PerformanceWindow, f64)> {
        let window = window?;
        if window.total_trades < self.limits.config().kelly_min_trades {
            return None;
        }
        window.reward_risk_ratio().map(|rr| (window, rr))
    }
}

impl SizingStrategy for Kelly {
    fn method(&self) -> SizingMethod {
        SizingMethod::Kelly
    }

    fn size(&self, input: &SizingInput<'_>) -> SizingResult {
        let Some((window, rr)) = self.usable_window(input.performance) else {
            debug!("Not enough trade history for Kelly, using fixed fractional");
            return self.fallback.size(input);
        };

        if let Err(reason) = input.validate() {
            return SizingResult::skipped(self.method(), reason, SizingBreakdown::default());
        }

        let fraction = self.capital_fraction(window.win_rate, rr)
            * self.limits.config().kelly_fraction
            * input.confidence_scale();

        debug!(
            win_rate = window.win_rate,
            reward_risk = rr,
            fraction = fraction,
            "Kelly fraction computed"
        );

        self.fallback
            .size_for_risk(self.method(), input, input.balance * fraction)
    }
}
