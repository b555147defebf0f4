//! Order submission, partial-fill handling and position registration.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::FillConfig;
use crate::domain::{InstrumentMetadata, OpenPositionRecord, PositionIntent, TradeRecord};
use crate::resilience::{
    FillClass, PartialFillAction, average_fill_price, classify, partial_fill_action,
};
use crate::risk::{RiskManager, SlippageCheck};
use crate::storage::TradeStore;
use crate::venue::{OrderRequest, OrderStatus, Venue, VenueError};

/// An admitted, sized candidate ready for submission.
#[derive(Debug, Clone)]
pub struct ExecutionPlan<'a> {
    pub intent: &'a PositionIntent,
    /// Signed units.
    pub units: f64,
    /// Quote the candidate was sized against.
    pub price: f64,
    pub balance: f64,
    pub metadata: &'a InstrumentMetadata,
}

/// What happened to an order.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub class: FillClass,
    pub requested_units: f64,
    /// Signed units held after the order.
    pub filled_units: f64,
    pub fill_price: f64,
    pub slippage: SlippageCheck,
    /// The registered position, when something was kept.
    pub position: Option<OpenPositionRecord>,
}

pub struct OrderExecutor {
    venue: Arc<dyn Venue>,
    risk: Arc<RiskManager>,
    trades: Arc<dyn TradeStore>,
    fills: FillConfig,
}

impl OrderExecutor {
    pub fn new(
        venue: Arc<dyn Venue>,
        risk: Arc<RiskManager>,
        trades: Arc<dyn TradeStore>,
        fills: FillConfig,
    ) -> Self {
        Self {
            venue,
            risk,
            trades,
            fills,
        }
    }

    /// Submits the order, applies the partial-fill policy and registers
    /// whatever is kept. Rejections raised by the venue come back as errors.
    pub async fn execute(&self, plan: &ExecutionPlan<'_>) -> Result<ExecutionReport, VenueError> {
        let intent = plan.intent;
        let pip_size = plan.metadata.pip_size;
        let (stop, target) = intent.protection_levels(plan.price, pip_size);

        let response = self
            .venue
            .submit_order(OrderRequest {
                instrument: intent.instrument.clone(),
                units: plan.units,
                stop,
                target,
            })
            .await?;

        let mut class = classify(plan.units, &response);
        let mut filled = response.filled_units;
        let mut fill_price = response.fill_price;

        if class == FillClass::PartialFill {
            match partial_fill_action(&self.fills, plan.units, filled) {
                PartialFillAction::Accept => {
                    info!(
                        instrument = %intent.instrument,
                        requested = plan.units,
                        filled = filled,
                        "Partial fill accepted"
                    );
                }
                PartialFillAction::RetryRemainder { remaining } => {
                    let (units, price) = self
                        .retry_remainder(intent, remaining, stop, target, filled, fill_price)
                        .await;
                    filled = units;
                    fill_price = price;
                    if filled.abs() + 1e-9 >= plan.units.abs() {
                        class = FillClass::FullFill;
                    }
                }
                PartialFillAction::Cancel => {
                    self.flatten(&intent.instrument, filled).await;
                    class = FillClass::Rejected {
                        reason: "partial fill cancelled by policy".to_string(),
                    };
                }
            }
        }

        let slippage = if fill_price > 0.0 {
            self.risk.evaluate_slippage(plan.price, fill_price, pip_size)
        } else {
            SlippageCheck {
                pips: 0.0,
                exceeded: false,
            }
        };

        info!(
            instrument = %intent.instrument,
            class = class.as_str(),
            requested = plan.units,
            filled = filled,
            fill_price = fill_price,
            slippage_pips = slippage.pips,
            "Order completed"
        );

        let mut report = ExecutionReport {
            class,
            requested_units: plan.units,
            filled_units: filled,
            fill_price,
            slippage,
            position: None,
        };
        if report.class.has_fill() {
            report.position = Some(self.register(plan, filled, fill_price, stop, &slippage).await);
        } else {
            report.filled_units = 0.0;
        }
        Ok(report)
    }

    /// Resubmits the remainder once. Returns the combined signed units and
    /// average price; the first fill alone when the retry adds nothing.
    async fn retry_remainder(
        &self,
        intent: &PositionIntent,
        remaining: f64,
        stop: f64,
        target: f64,
        filled: f64,
        fill_price: f64,
    ) -> (f64, f64) {
        info!(
            instrument = %intent.instrument,
            remaining = remaining,
            "Partial fill below minimum, resubmitting remainder"
        );
        let order = OrderRequest {
            instrument: intent.instrument.clone(),
            units: remaining * intent.direction.sign(),
            stop,
            target,
        };
        match self.venue.submit_order(order).await {
            Ok(second)
                if second.filled_units != 0.0
                    && !matches!(second.status, OrderStatus::Rejected { .. }) =>
            {
                let price =
                    average_fill_price(filled, fill_price, second.filled_units, second.fill_price);
                (filled + second.filled_units, price)
            }
            Ok(second) => {
                info!(
                    instrument = %intent.instrument,
                    status = ?second.status,
                    "Remainder not filled, keeping partial"
                );
                (filled, fill_price)
            }
            Err(e) => {
                warn!(
                    instrument = %intent.instrument,
                    error = %e,
                    "Remainder submission failed, keeping partial"
                );
                (filled, fill_price)
            }
        }
    }

    async fn flatten(&self, instrument: &str, filled: f64) {
        match self.venue.close_position(instrument).await {
            Ok(closed) => info!(
                instrument = %instrument,
                units = filled,
                exit_price = closed.exit_price,
                "Partial fill flattened"
            ),
            Err(e) => warn!(
                instrument = %instrument,
                units = filled,
                error = %e,
                "Failed to flatten partial fill, reconciliation will adopt it"
            ),
        }
    }

    /// Recomputes protection from the actual fill and tracks the position.
    async fn register(
        &self,
        plan: &ExecutionPlan<'_>,
        filled: f64,
        fill_price: f64,
        submitted_stop: f64,
        slippage: &SlippageCheck,
    ) -> OpenPositionRecord {
        let intent = plan.intent;
        let (mut stop, target) = intent.protection_levels(fill_price, plan.metadata.pip_size);

        if (stop - submitted_stop).abs() > f64::EPSILON {
            if let Err(e) = self.venue.update_stop(&intent.instrument, stop).await {
                warn!(
                    instrument = %intent.instrument,
                    stop = stop,
                    error = %e,
                    "Failed to move stop to fill price, keeping submitted stop"
                );
                stop = submitted_stop;
            }
        }

        let risk_fraction = if plan.balance > 0.0 {
            filled.abs() * intent.stop_distance * plan.metadata.pip_value / plan.balance
        } else {
            0.0
        };
        let opened_at = Utc::now();

        let trade = TradeRecord {
            instrument: intent.instrument.clone(),
            direction: intent.direction,
            confidence: intent.confidence,
            units: filled,
            entry_price: fill_price,
            stop,
            target,
            risk_fraction,
            slippage_pips: slippage.pips,
            opened_at,
            exit_price: None,
            profit_loss: None,
            closed_at: None,
        };
        let trade_id = match self.trades.store_trade(&trade).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(instrument = %intent.instrument, error = %e, "Failed to store trade");
                None
            }
        };

        let record = OpenPositionRecord {
            instrument: intent.instrument.clone(),
            direction: intent.direction,
            units: filled,
            entry_price: fill_price,
            stop,
            target,
            stop_distance: intent.stop_distance,
            risk_fraction,
            best_price: None,
            trade_id,
            opened_at,
            closing: false,
        };
        self.risk.register(record.clone()).await;
        record
    }
}
