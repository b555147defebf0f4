//! Margin-based sizing.

use super::{
    Constraint, SizingBreakdown, SizingInput, SizingLimits, SizingResult, SizingStrategy,
    SkipReason,
};
use crate::config::SizingMethod;

/// Sizes from usable margin and the leverage estimate:
/// units = min(usable_margin, balance × max_margin_usage) × leverage / price.
#[derive(Debug, Clone)]
pub struct MarginBased {
    limits: SizingLimits,
}

impl MarginBased {
    pub fn new(limits: SizingLimits) -> Self {
        Self { limits }
    }

    /// Margin the method may commit for this trade.
    pub fn allowed_margin(&self, balance: f64, available: f64) -> f64 {
        let usable = self.limits.usable_margin(balance, available);
        let balance_cap = balance * self.limits.config().max_margin_usage;
        usable.min(balance_cap)
    }
}

impl SizingStrategy for MarginBased {
    fn method(&self) -> SizingMethod {
        SizingMethod::Margin
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

        let allowed = self.allowed_margin(input.balance, available);
        breakdown.usable_margin = Some(allowed);
        if allowed <= 0.0 {
            return SizingResult::skipped(self.method(), SkipReason::InsufficientMargin, breakdown);
        }

        let units = allowed * self.limits.config().leverage_estimate / input.price;
        breakdown.consider(Constraint::Margin, units);

        self.limits.finish_margin_aware(self.method(), input, breakdown)
    }
}
