//! Order response classification and partial-fill policy.

use crate::config::{FillConfig, PartialFillPolicy};
use crate::venue::{OrderResponse, OrderStatus};

/// Outcome of an order submission.
#[derive(Debug, Clone, PartialEq)]
pub enum FillClass {
    FullFill,
    PartialFill,
    Rejected { reason: String },
    Cancelled,
}

impl FillClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillClass::FullFill => "full_fill",
            FillClass::PartialFill => "partial_fill",
            FillClass::Rejected { .. } => "rejected",
            FillClass::Cancelled => "cancelled",
        }
    }

    /// True when some quantity is held after the order.
    pub fn has_fill(&self) -> bool {
        matches!(self, FillClass::FullFill | FillClass::PartialFill)
    }
}

impl std::fmt::Display for FillClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FillClass::Rejected { reason } => write!(f, "rejected: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Classifies a venue response by comparing filled with requested quantity.
pub fn classify(requested_units: f64, response: &OrderResponse) -> FillClass {
    if let OrderStatus::Rejected { reason } = &response.status {
        return FillClass::Rejected {
            reason: reason.clone(),
        };
    }

    let requested = requested_units.abs();
    let filled = response.filled_units.abs();
    if filled <= 0.0 || !filled.is_finite() {
        return FillClass::Cancelled;
    }
    // Quantities are whole multiples of the instrument precision.
    if filled + 1e-9 < requested {
        FillClass::PartialFill
    } else {
        FillClass::FullFill
    }
}

/// What to do after a partial fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PartialFillAction {
    Accept,
    /// Resubmit the remaining magnitude once.
    RetryRemainder { remaining: f64 },
    /// Flatten the partial and account the order as rejected.
    Cancel,
}

/// Applies the configured partial-fill policy.
pub fn partial_fill_action(config: &FillConfig, requested: f64, filled: f64) -> PartialFillAction {
    let requested = requested.abs();
    let filled = filled.abs();
    match config.partial_fill_strategy {
        PartialFillPolicy::Accept => PartialFillAction::Accept,
        PartialFillPolicy::Cancel => PartialFillAction::Cancel,
        PartialFillPolicy::Retry => {
            let fill_pct = if requested > 0.0 {
                filled / requested * 100.0
            } else {
                100.0
            };
            if fill_pct < config.min_partial_fill_pct {
                PartialFillAction::RetryRemainder {
                    remaining: requested - filled,
                }
            } else {
                PartialFillAction::Accept
            }
        }
    }
}

/// Volume-weighted average price of two fills.
pub fn average_fill_price(
    first_units: f64,
    first_price: f64,
    second_units: f64,
    second_price: f64,
) -> f64 {
    let (a, b) = (first_units.abs(), second_units.abs());
    if a + b <= 0.0 {
        return first_price;
    }
    (a * first_price + b * second_price) / (a + b)
}
