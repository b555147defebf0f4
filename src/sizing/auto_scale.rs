//! Multi-constraint sizing.

use super::{
    Constraint, SizingBreakdown, SizingInput, SizingLimits, SizingResult, SizingStrategy,
    SkipReason,
};
use crate::config::SizingMethod;

/// Takes the smallest of the margin, risk and cap constraints and skips when
/// that cannot reach the minimum viable size.
#[derive(Debug, Clone)]
pub struct AutoScale {
    limits: SizingLimits,
}

impl AutoScale {
    pub fn new(limits: SizingLimits) -> Self {
        Self { limits }
    }
}

impl SizingStrategy for AutoScale {
    fn method(&self) -> SizingMethod {
        SizingMethod::AutoScale
    }

    fn size(&self, input: &SizingInput<'_>) -> SizingResult {
        let mut breakdown = SizingBreakdown::default();

        if let Err(reason) = input.validate() {
            return SizingResult::skipped(self.method(), reason, breakdown);
        }
        let available = match input.require_margin() {
            Ok(m) => m,
            Err(reason) => return SizingResult::skipped(self.method(), reason, breakdown),
        };

        let effective = self.limits.usable_margin(input.balance, available);
        breakdown.usable_margin = Some(effective);
        if effective <= 0.0 {
            return SizingResult::skipped(self.method(), SkipReason::InsufficientMargin, breakdown);
        }

        let margin_rate = self.limits.margin_rate(input.metadata);
        breakdown.consider(Constraint::Margin, effective / (input.price * margin_rate));

        let risk_amount =
            input.balance * self.limits.config().risk_per_trade * input.confidence_scale();
        if risk_amount <= 0.0 {
            return SizingResult::skipped(self.method(), SkipReason::ZeroRiskBudget, breakdown);
        }
        breakdown.consider(Constraint::Risk, risk_amount / input.risk_per_unit());

        self.limits.finish_margin_aware(self.method(), input, breakdown)
    }
}
