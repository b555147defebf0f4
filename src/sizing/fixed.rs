//! Fixed-fractional sizing.

use super::{SizingBreakdown, SizingInput, SizingLimits, SizingResult, SizingStrategy, SkipReason};
use crate::config::SizingMethod;

/// Risks `risk_per_trade × confidence` of the balance at the stop.
#[derive(Debug, Clone)]
pub struct FixedFractional {
    limits: SizingLimits,
}

impl FixedFractional {
    pub fn new(limits: SizingLimits) -> Self {
        Self { limits }
    }

    /// Sizes for an explicit risk amount in account currency.
    pub(super) fn size_for_risk(
        &self,
        method: SizingMethod,
        input: &SizingInput<'_>,
        risk_amount: f64,
    ) -> SizingResult {
        if !risk_amount.is_finite() {
            return SizingResult::skipped(
                method,
                SkipReason::NonFiniteValue,
                SizingBreakdown::default(),
            );
        }
        if risk_amount <= 0.0 {
            return SizingResult::skipped(
                method,
                SkipReason::ZeroRiskBudget,
                SizingBreakdown::default(),
            );
        }
        let units = risk_amount / input.risk_per_unit();
        self.limits
            .finish_risk_based(method, input, units, SizingBreakdown::default())
    }
}

impl SizingStrategy for FixedFractional {
    fn method(&self) -> SizingMethod {
        SizingMethod::FixedFractional
    }

    fn size(&self, input: &SizingInput<'_>) -> SizingResult {
        if let Err(reason) = input.validate() {
            return SizingResult::skipped(self.method(), reason, SizingBreakdown::default());
        }

        let risk_amount =
            input.balance * self.limits.config().risk_per_trade * input.confidence_scale();
        self.size_for_risk(self.method(), input, risk_amount)
    }
}
