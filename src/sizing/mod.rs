//! Position sizing.
//!
//! Every method implements [`SizingStrategy`] and turns the same
//! [`SizingInput`] into a [`SizingResult`]. [`PositionSizer`] picks the method
//! from configuration and data availability and applies the trade direction.

mod auto_scale;
mod fixed;
mod kelly;
mod margin;

pub use auto_scale::AutoScale;
pub use fixed::FixedFractional;
pub use kelly::Kelly;
pub use margin::MarginBased;

use tracing::{debug, info};

use crate::config::{MarginFormula, SizingConfig, SizingMethod};
use crate::domain::{Direction, InstrumentMetadata, PerformanceWindow};

/// Why the sizer declined to produce a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InvalidPrice,
    InvalidStopDistance,
    InvalidPipValue,
    InsufficientMargin,
    BelowMinimumViableSize,
    NonFiniteValue,
    ZeroRiskBudget,
}

impl SkipReason {
    /// Stable machine-checkable code.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::InvalidPrice => "invalid_price",
            SkipReason::InvalidStopDistance => "invalid_stop_distance",
            SkipReason::InvalidPipValue => "invalid_pip_value",
            SkipReason::InsufficientMargin => "insufficient_margin",
            SkipReason::BelowMinimumViableSize => "below_minimum_viable_size",
            SkipReason::NonFiniteValue => "non_finite_value",
            SkipReason::ZeroRiskBudget => "zero_risk_budget",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            SkipReason::InvalidPrice => "price must be positive",
            SkipReason::InvalidStopDistance => "stop distance must be positive",
            SkipReason::InvalidPipValue => "pip value must be positive",
            SkipReason::InsufficientMargin => "insufficient margin",
            SkipReason::BelowMinimumViableSize => "below minimum viable size",
            SkipReason::NonFiniteValue => "non-finite intermediate value",
            SkipReason::ZeroRiskBudget => "no risk budget",
        };
        f.write_str(msg)
    }
}

/// A constraint that proposes a unit quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// Units allowed by the risk budget.
    Risk,
    /// Units allowed by usable margin.
    Margin,
    /// Per-order cap from config and instrument.
    OrderCap,
    /// Per-instrument cap.
    InstrumentCap,
    /// Minimum viable size.
    Minimum,
}

impl Constraint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Constraint::Risk => "risk",
            Constraint::Margin => "margin",
            Constraint::OrderCap => "order_cap",
            Constraint::InstrumentCap => "instrument_cap",
            Constraint::Minimum => "minimum",
        }
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Units proposed by one constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintValue {
    pub constraint: Constraint,
    pub units: f64,
}

/// Diagnostic record of every constraint the sizer considered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SizingBreakdown {
    pub candidates: Vec<ConstraintValue>,
    /// Constraint that produced the final quantity.
    pub binding: Option<Constraint>,
    /// Margin the method treated as usable.
    pub usable_margin: Option<f64>,
    /// Minimum viable size for this trade.
    pub min_units: f64,
    /// Set when the legacy path raised the quantity to the minimum.
    pub forced_minimum: bool,
}

impl SizingBreakdown {
    fn consider(&mut self, constraint: Constraint, units: f64) {
        self.candidates.push(ConstraintValue { constraint, units });
    }

    /// Units proposed by `constraint`, if it was considered.
    #[cfg(test)]
    pub fn value(&self, constraint: Constraint) -> Option<f64> {
        self.candidates
            .iter()
            .find(|c| c.constraint == constraint)
            .map(|c| c.units)
    }

    /// Smallest upper-bound candidate; records which constraint bound it.
    fn bind_min(&mut self) -> f64 {
        let tightest = self
            .candidates
            .iter()
            .filter(|c| c.constraint != Constraint::Minimum)
            .min_by(|a, b| a.units.total_cmp(&b.units))
            .copied();

        match tightest {
            Some(c) => {
                self.binding = Some(c.constraint);
                c.units
            }
            None => 0.0,
        }
    }
}

/// SizingResult is the sizer's answer for one candidate.
///
/// `units` is zero exactly when `skip_reason` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingResult {
    units: f64,
    risk_fraction: f64,
    method: SizingMethod,
    skip_reason: Option<SkipReason>,
    breakdown: SizingBreakdown,
}

impl SizingResult {
    /// Builds a sized result. Non-finite or non-positive quantities become skips.
    fn sized(
        method: SizingMethod,
        units: f64,
        risk_fraction: f64,
        breakdown: SizingBreakdown,
    ) -> Self {
        if !units.is_finite() || !risk_fraction.is_finite() {
            return Self::skipped(method, SkipReason::NonFiniteValue, breakdown);
        }
        if units <= 0.0 {
            return Self::skipped(method, SkipReason::BelowMinimumViableSize, breakdown);
        }
        Self {
            units,
            risk_fraction,
            method,
            skip_reason: None,
            breakdown,
        }
    }

    fn skipped(method: SizingMethod, reason: SkipReason, breakdown: SizingBreakdown) -> Self {
        Self {
            units: 0.0,
            risk_fraction: 0.0,
            method,
            skip_reason: Some(reason),
            breakdown,
        }
    }

    /// Signed units (negative for sells); zero when skipped.
    pub fn units(&self) -> f64 {
        self.units
    }

    /// Realized fraction of balance at risk at the stop.
    pub fn risk_fraction(&self) -> f64 {
        self.risk_fraction
    }

    pub fn method(&self) -> SizingMethod {
        self.method
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        self.skip_reason
    }

    pub fn is_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }

    pub fn breakdown(&self) -> &SizingBreakdown {
        &self.breakdown
    }

    fn with_direction(mut self, direction: Direction) -> Self {
        self.units *= direction.sign();
        self
    }
}

/// Everything a sizing method may look at.
#[derive(Debug, Clone)]
pub struct SizingInput<'a> {
    pub balance: f64,
    /// Margin available at the venue, when known.
    pub available_margin: Option<f64>,
    pub price: f64,
    /// Stop distance in pips.
    pub stop_distance: f64,
    pub confidence: f64,
    pub metadata: &'a InstrumentMetadata,
    /// Trailing performance window, for Kelly.
    pub performance: Option<&'a PerformanceWindow>,
}

impl SizingInput<'_> {
    /// Confidence clamped into [0, 1].
    fn confidence_scale(&self) -> f64 {
        if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Account-currency loss per unit if the stop is hit.
    fn risk_per_unit(&self) -> f64 {
        self.stop_distance * self.metadata.pip_value
    }

    fn realized_risk(&self, units: f64) -> f64 {
        units * self.risk_per_unit() / self.balance
    }

    /// Rejects inputs no method can size.
    fn validate(&self) -> Result<(), SkipReason> {
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(SkipReason::InvalidPrice);
        }
        if !self.stop_distance.is_finite() || self.stop_distance <= 0.0 {
            return Err(SkipReason::InvalidStopDistance);
        }
        if !self.metadata.pip_value.is_finite() || self.metadata.pip_value <= 0.0 {
            return Err(SkipReason::InvalidPipValue);
        }
        if !self.balance.is_finite() {
            return Err(SkipReason::NonFiniteValue);
        }
        if self.balance <= 0.0 {
            return Err(SkipReason::ZeroRiskBudget);
        }
        Ok(())
    }

    /// Available margin for margin-aware methods.
    fn require_margin(&self) -> Result<f64, SkipReason> {
        match self.available_margin {
            Some(m) if !m.is_finite() => Err(SkipReason::NonFiniteValue),
            Some(m) if m > 0.0 => Ok(m),
            _ => Err(SkipReason::InsufficientMargin),
        }
    }
}

/// SizingStrategy turns a sizing input into a quantity.
pub trait SizingStrategy: Send + Sync {
    fn method(&self) -> SizingMethod;

    /// Unsigned sizing. Never panics; infeasible inputs yield a skip.
    fn size(&self, input: &SizingInput<'_>) -> SizingResult;
}

/// Limits shared by every sizing method.
#[derive(Debug, Clone)]
pub struct SizingLimits {
    config: SizingConfig,
    instrument_cap: f64,
}

impl SizingLimits {
    pub fn new(config: SizingConfig, instrument_cap: f64) -> Self {
        Self {
            config,
            instrument_cap,
        }
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// min_trade_value / (stop × pip value), raised to the instrument minimum.
    fn min_units(&self, input: &SizingInput<'_>) -> f64 {
        let by_value = self.config.min_trade_value / input.risk_per_unit();
        by_value.max(input.metadata.minimum_trade_size)
    }

    fn order_cap(&self, metadata: &InstrumentMetadata) -> f64 {
        match metadata.maximum_order_units {
            Some(max) if max > 0.0 => self.config.max_order_units.min(max),
            _ => self.config.max_order_units,
        }
    }

    /// Margin rate from metadata, or 1 / leverage estimate when unknown.
    fn margin_rate(&self, metadata: &InstrumentMetadata) -> f64 {
        if metadata.margin_rate.is_finite() && metadata.margin_rate > 0.0 {
            metadata.margin_rate
        } else {
            1.0 / self.config.leverage_estimate
        }
    }

    /// Margin left after the buffer, per the configured formula.
    fn usable_margin(&self, balance: f64, available: f64) -> f64 {
        match self.config.margin_formula {
            MarginFormula::Multiplicative => available * (1.0 - self.config.margin_buffer),
            MarginFormula::Subtractive => {
                (available - balance * self.config.margin_buffer).max(0.0)
            }
        }
    }

    fn consider_caps(&self, breakdown: &mut SizingBreakdown, metadata: &InstrumentMetadata) {
        breakdown.consider(Constraint::OrderCap, self.order_cap(metadata));
        breakdown.consider(Constraint::InstrumentCap, self.instrument_cap);
    }

    /// Shared tail of the fixed-fractional and Kelly methods: caps, rounding,
    /// then either a forced minimum or a skip.
    fn finish_risk_based(
        &self,
        method: SizingMethod,
        input: &SizingInput<'_>,
        risk_units: f64,
        mut breakdown: SizingBreakdown,
    ) -> SizingResult {
        breakdown.consider(Constraint::Risk, risk_units);
        self.consider_caps(&mut breakdown, input.metadata);

        let min_units = self.min_units(input);
        breakdown.min_units = min_units;

        let mut units = input.metadata.round_units_down(breakdown.bind_min());
        if !units.is_finite() || !min_units.is_finite() {
            return SizingResult::skipped(method, SkipReason::NonFiniteValue, breakdown);
        }

        if units < min_units {
            if !self.config.force_minimum {
                return SizingResult::skipped(
                    method,
                    SkipReason::BelowMinimumViableSize,
                    breakdown,
                );
            }
            // Margin is not consulted here.
            units = input.metadata.round_units_up(min_units);
            breakdown.forced_minimum = true;
            breakdown.binding = Some(Constraint::Minimum);
        }

        let risk_fraction = input.realized_risk(units);
        SizingResult::sized(method, units, risk_fraction, breakdown)
    }

    /// Shared tail of the margin-aware methods: rounding and a hard floor.
    fn finish_margin_aware(
        &self,
        method: SizingMethod,
        input: &SizingInput<'_>,
        mut breakdown: SizingBreakdown,
    ) -> SizingResult {
        self.consider_caps(&mut breakdown, input.metadata);

        let min_units = self.min_units(input);
        breakdown.min_units = min_units;

        let units = input.metadata.round_units_down(breakdown.bind_min());
        if !units.is_finite() || !min_units.is_finite() {
            return SizingResult::skipped(method, SkipReason::NonFiniteValue, breakdown);
        }
        if units < min_units {
            return SizingResult::skipped(method, SkipReason::BelowMinimumViableSize, breakdown);
        }

        let risk_fraction = input.realized_risk(units);
        SizingResult::sized(method, units, risk_fraction, breakdown)
    }
}

/// PositionSizer selects a sizing method and applies the trade direction.
pub struct PositionSizer {
    configured: SizingMethod,
    prefer_margin_aware: bool,
    fixed: FixedFractional,
    kelly: Kelly,
    margin: MarginBased,
    auto_scale: AutoScale,
}

impl PositionSizer {
    /// Creates a sizer; `instrument_cap` is the per-instrument unit limit.
    pub fn new(config: SizingConfig, instrument_cap: f64) -> Self {
        let limits = SizingLimits::new(config.clone(), instrument_cap);
        Self {
            configured: config.method,
            prefer_margin_aware: config.prefer_margin_aware,
            fixed: FixedFractional::new(limits.clone()),
            kelly: Kelly::new(limits.clone()),
            margin: MarginBased::new(limits.clone()),
            auto_scale: AutoScale::new(limits),
        }
    }

    /// Method that will run given whether available margin is known.
    pub fn select_method(&self, margin_known: bool) -> SizingMethod {
        match self.configured {
            m if m.is_margin_aware() && !margin_known => SizingMethod::FixedFractional,
            SizingMethod::FixedFractional | SizingMethod::Kelly
                if margin_known && self.prefer_margin_aware =>
            {
                SizingMethod::AutoScale
            }
            m => m,
        }
    }

    fn strategy(&self, method: SizingMethod) -> &dyn SizingStrategy {
        match method {
            SizingMethod::FixedFractional => &self.fixed,
            SizingMethod::Kelly => &self.kelly,
            SizingMethod::Margin => &self.margin,
            SizingMethod::AutoScale => &self.auto_scale,
        }
    }

    /// Sizes a candidate. The returned units carry the direction's sign.
    pub fn size(&self, direction: Direction, input: &SizingInput<'_>) -> SizingResult {
        let method = self.select_method(input.available_margin.is_some());
        if method != self.configured {
            debug!(
                configured = %self.configured,
                selected = %method,
                margin_known = input.available_margin.is_some(),
                "Sizing method substituted"
            );
        }

        let result = self.strategy(method).size(input).with_direction(direction);

        match result.skip_reason() {
            Some(reason) => info!(
                method = %result.method(),
                reason = reason.as_str(),
                min_units = result.breakdown().min_units,
                "Sizing skipped"
            ),
            None => info!(
                method = %result.method(),
                units = result.units(),
                risk_fraction = result.risk_fraction(),
                binding = ?result.breakdown().binding,
                forced_minimum = result.breakdown().forced_minimum,
                "Position sized"
            ),
        }

        result
    }
}
