//! Position monitor.
//!
//! Polls open positions on a fixed interval, trails stops and closes
//! positions whose take-profit level was reached. Runs concurrently with the
//! decision cycle; every ledger change goes through the risk manager.

mod trailing;

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::adaptive::ThresholdController;
use crate::config::MonitorConfig;
use crate::domain::OpenPositionRecord;
use crate::risk::RiskManager;
use crate::storage::TradeStore;
use crate::trader::Stats;
use crate::venue::{MetadataCache, Venue, VenueError};

/// Outcome of one pass over the open positions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorReport {
    pub checked: usize,
    pub trailed: Vec<String>,
    pub closed: Vec<String>,
    pub errors: usize,
}

enum PositionAction {
    None,
    Trailed,
    Closed,
}

/// PositionMonitor owns the polling loop.
pub struct PositionMonitor {
    config: MonitorConfig,
    venue: Arc<dyn Venue>,
    metadata: Arc<MetadataCache>,
    risk: Arc<RiskManager>,
    trades: Arc<dyn TradeStore>,
    controller: Arc<ThresholdController>,
    stats: Arc<Mutex<Stats>>,
    performance_window: usize,
}

impl PositionMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: MonitorConfig,
        venue: Arc<dyn Venue>,
        metadata: Arc<MetadataCache>,
        risk: Arc<RiskManager>,
        trades: Arc<dyn TradeStore>,
        controller: Arc<ThresholdController>,
        stats: Arc<Mutex<Stats>>,
        performance_window: usize,
    ) -> Self {
        Self {
            config,
            venue,
            metadata,
            risk,
            trades,
            controller,
            stats,
            performance_window,
        }
    }

    /// Polls until `shutdown` flips to true. A pass in progress always
    /// finishes before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.interval);
        info!(
            interval = ?self.config.interval,
            trailing = self.config.trailing.enabled,
            "Position monitor started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.check_positions().await;
                    if !report.trailed.is_empty() || !report.closed.is_empty() {
                        debug!(
                            checked = report.checked,
                            trailed = report.trailed.len(),
                            closed = report.closed.len(),
                            errors = report.errors,
                            "Monitor pass complete"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Position monitor stopped");
    }

    /// Runs one pass over a snapshot of the open positions.
    pub async fn check_positions(&self) -> MonitorReport {
        let mut report = MonitorReport::default();

        for record in self.risk.positions().await {
            if record.closing {
                continue;
            }
            report.checked += 1;
            match self.check_position(&record).await {
                Ok(PositionAction::Trailed) => report.trailed.push(record.instrument),
                Ok(PositionAction::Closed) => report.closed.push(record.instrument),
                Ok(PositionAction::None) => {}
                Err(VenueError::CircuitOpen) => {
                    debug!("Circuit open, monitor pass cut short");
                    report.errors += 1;
                    break;
                }
                Err(e) => {
                    warn!(instrument = %record.instrument, error = %e, "Position check failed");
                    report.errors += 1;
                }
            }
        }

        report
    }

    async fn check_position(
        &self,
        record: &OpenPositionRecord,
    ) -> Result<PositionAction, VenueError> {
        let price = self.venue.current_price(&record.instrument).await?;

        if record.target_reached(price) {
            return self.take_profit(record, price).await;
        }

        let metadata = self.metadata.get(&record.instrument).await?;
        let Some(update) =
            trailing::evaluate(&self.config.trailing, record, price, metadata.pip_size)
        else {
            return Ok(PositionAction::None);
        };

        if !update.moved() {
            self.risk
                .update_stop(&record.instrument, record.stop, Some(update.best_price))
                .await;
            return Ok(PositionAction::None);
        }

        self.venue.update_stop(&record.instrument, update.stop).await?;
        if !self
            .risk
            .update_stop(&record.instrument, update.stop, Some(update.best_price))
            .await
        {
            debug!(instrument = %record.instrument, "Position closed while trailing");
            return Ok(PositionAction::None);
        }

        info!(
            instrument = %record.instrument,
            old_stop = record.stop,
            new_stop = update.stop,
            moved_pips = update.moved_pips,
            price = price,
            "Trailing stop moved"
        );
        self.stats.lock().await.stops_trailed += 1;
        Ok(PositionAction::Trailed)
    }

    async fn take_profit(
        &self,
        record: &OpenPositionRecord,
        price: f64,
    ) -> Result<PositionAction, VenueError> {
        let Some(closing) = self.risk.begin_close(&record.instrument).await else {
            return Ok(PositionAction::None);
        };

        let (exit_price, pnl) = match self.venue.close_position(&record.instrument).await {
            Ok(closed) => (closed.exit_price, Some(closed.realized_pnl)),
            Err(VenueError::PositionNotFound(_)) => {
                warn!(
                    instrument = %record.instrument,
                    "Position already closed at venue"
                );
                (price, None)
            }
            Err(e) => {
                self.risk.abort_close(&record.instrument).await;
                return Err(e);
            }
        };
        self.risk.release(&record.instrument).await;

        info!(
            instrument = %record.instrument,
            entry_price = record.entry_price,
            exit_price = exit_price,
            target = record.target,
            pnl = ?pnl,
            "Take-profit reached, position closed"
        );

        {
            let mut stats = self.stats.lock().await;
            stats.positions_closed += 1;
            stats.realized_pnl += pnl.unwrap_or(0.0);
        }

        if let Some(trade_id) = closing.trade_id {
            if let Err(e) = self.trades.close_trade(trade_id, Some(exit_price), pnl).await {
                warn!(trade_id = trade_id, error = %e, "Failed to record closed trade");
            }
        }
        self.feed_performance().await;

        Ok(PositionAction::Closed)
    }

    async fn feed_performance(&self) {
        match self.trades.performance(self.performance_window).await {
            Ok(window) => {
                self.controller.record_performance(&window).await;
            }
            Err(e) => warn!(error = %e, "Failed to load performance window"),
        }
    }
}

#[cfg(test)]
mod tests;
