//! Decision loop.
//!
//! Coordinates all components: signals, sizing, admission, execution, the
//! adaptive threshold and the position monitor.

mod error;
mod executor;
mod stats;

pub use error::TraderError;
pub use executor::{ExecutionPlan, ExecutionReport, OrderExecutor};
pub use stats::Stats;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::adaptive::ThresholdController;
use crate::config::Config;
use crate::domain::PositionIntent;
use crate::monitor::PositionMonitor;
use crate::risk::{Admission, AdmissionRequest, RiskManager};
use crate::signal::{QueuedSignals, SignalSource, load_replay};
use crate::sizing::{PositionSizer, SizingInput};
use crate::resilience::ResilientVenue;
use crate::storage::{
    InMemoryStorage, SqliteStorage, SqliteStorageConfig, ThresholdRepository, TradeStore,
};
use crate::venue::{MetadataCache, PaperVenue, PricePath, Venue, VenueError};

/// How a decision cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    /// No candidate cleared the threshold.
    Idle,
    /// The book is full; signals were not consumed.
    AtCapacity,
    /// The venue circuit is open.
    Paused,
    /// Candidates cleared the threshold but none was sized and admitted.
    NoneAdmitted,
    /// An order was submitted.
    Executed(ExecutionReport),
    Failed(TraderError),
}

/// Trader runs the decision cycle and the position monitor.
pub struct Trader {
    cfg: Config,
    resilient: Arc<ResilientVenue>,
    venue: Arc<dyn Venue>,
    signals: Arc<dyn SignalSource>,
    metadata: Arc<MetadataCache>,
    sizer: PositionSizer,
    risk: Arc<RiskManager>,
    controller: Arc<ThresholdController>,
    trades: Arc<dyn TradeStore>,
    executor: OrderExecutor,
    monitor: Arc<PositionMonitor>,
    price_path: Option<Arc<PricePath>>,

    // Runtime state
    started_at: Mutex<Option<Instant>>,
    running: Mutex<bool>,
    stats: Arc<Mutex<Stats>>,
    shutdown: watch::Sender<bool>,
}

impl Trader {
    /// Wires the trader around a raw venue, which gets wrapped with
    /// timeouts, retries and the circuit breaker. Loads the persisted
    /// threshold before returning.
    pub async fn new(
        cfg: Config,
        venue: Arc<dyn Venue>,
        signals: Arc<dyn SignalSource>,
        thresholds: Arc<dyn ThresholdRepository>,
        trades: Arc<dyn TradeStore>,
    ) -> Self {
        let resilient = Arc::new(ResilientVenue::new(venue, &cfg.resilience));
        let venue: Arc<dyn Venue> = resilient.clone();
        let metadata = Arc::new(MetadataCache::new(venue.clone()));
        let risk = Arc::new(RiskManager::new(cfg.risk.clone()));
        let controller =
            Arc::new(ThresholdController::load(cfg.adaptive.clone(), thresholds).await);
        let sizer = PositionSizer::new(cfg.sizing.clone(), cfg.risk.max_units_per_instrument);
        let stats = Arc::new(Mutex::new(Stats::default()));

        let executor = OrderExecutor::new(
            venue.clone(),
            risk.clone(),
            trades.clone(),
            cfg.resilience.fills.clone(),
        );
        let monitor = Arc::new(PositionMonitor::new(
            cfg.monitor.clone(),
            venue.clone(),
            metadata.clone(),
            risk.clone(),
            trades.clone(),
            controller.clone(),
            stats.clone(),
            cfg.adaptive.performance.window,
        ));
        let (shutdown, _) = watch::channel(false);

        Self {
            cfg,
            resilient,
            venue,
            signals,
            metadata,
            sizer,
            risk,
            controller,
            trades,
            executor,
            monitor,
            price_path: None,
            started_at: Mutex::new(None),
            running: Mutex::new(false),
            stats,
            shutdown,
        }
    }

    /// Replays `path` into the venue quotes while the trader runs.
    pub fn with_price_path(mut self, path: PricePath) -> Self {
        self.price_path = Some(Arc::new(path));
        self
    }

    /// Builds a paper-trading setup: paper venue, replayed signals and
    /// prices, SQLite or in-memory storage.
    pub async fn from_config(cfg: Config) -> Result<Self, TraderError> {
        let paper = Arc::new(PaperVenue::from_config(&cfg.paper));
        let price_path = match &cfg.paper.price_path {
            Some(path) => Some(PricePath::load(path, paper.clone(), cfg.paper.tick_interval)?),
            None => {
                info!("No price path configured, paper quotes stay fixed");
                None
            }
        };
        let venue: Arc<dyn Venue> = paper;

        let signals: Arc<dyn SignalSource> = match &cfg.signals.path {
            Some(path) => Arc::new(load_replay(path)?),
            None => {
                warn!("No signal file configured, every cycle will be idle");
                Arc::new(QueuedSignals::new("none", Vec::new()))
            }
        };

        let thresholds: Arc<dyn ThresholdRepository>;
        let trades: Arc<dyn TradeStore>;
        if cfg.storage.enabled {
            let storage = Arc::new(
                SqliteStorage::new(SqliteStorageConfig {
                    path: cfg.storage.path.clone(),
                    ..SqliteStorageConfig::default()
                })
                .await?,
            );
            thresholds = storage.clone();
            trades = storage;
        } else {
            warn!("Storage disabled, threshold and trades are kept in memory only");
            let storage = Arc::new(InMemoryStorage::new());
            thresholds = storage.clone();
            trades = storage;
        }

        let trader = Self::new(cfg, venue, signals, thresholds, trades).await;
        Ok(match price_path {
            Some(path) => trader.with_price_path(path),
            None => trader,
        })
    }

    /// Starts the decision loop and the monitor; returns after `stop`.
    pub async fn start(&self) -> Result<(), TraderError> {
        {
            let mut running = self.running.lock().await;
            if *running {
                return Err(TraderError::AlreadyRunning);
            }
            *running = true;
        }
        *self.started_at.lock().await = Some(Instant::now());
        self.shutdown.send_replace(false);

        let threshold = self.controller.status().await;
        info!(
            app = %self.cfg.app.name,
            env = %self.cfg.app.env,
            live = self.cfg.app.is_live(),
            venue = self.venue.name(),
            signals = self.signals.name(),
            sizing = %self.cfg.sizing.method,
            threshold = threshold.current,
            cycle_interval = ?self.cfg.trader.cycle_interval,
            "Starting trader"
        );

        self.reconcile().await;

        let monitor = if self.cfg.monitor.enabled {
            let monitor = self.monitor.clone();
            let shutdown = self.shutdown.subscribe();
            Some(tokio::spawn(async move { monitor.run(shutdown).await }))
        } else {
            None
        };

        let prices = self.price_path.clone().map(|path| {
            let shutdown = self.shutdown.subscribe();
            tokio::spawn(async move { path.run(shutdown).await })
        });

        let result = self.run_main_loop().await;

        if let Some(handle) = monitor {
            if let Err(e) = handle.await {
                warn!(error = %e, "Position monitor task failed");
            }
        }
        if let Some(handle) = prices {
            if let Err(e) = handle.await {
                warn!(error = %e, "Price path task failed");
            }
        }
        result
    }

    /// Signals both loops to stop after their current iteration.
    pub async fn stop(&self) -> Result<(), TraderError> {
        {
            let mut running = self.running.lock().await;
            if !*running {
                return Err(TraderError::NotRunning);
            }
            *running = false;
        }

        info!("Stopping trader...");
        self.shutdown.send_replace(true);

        let uptime = self.uptime().await;
        let stats = self.stats().await;
        let summary = self.risk.summary().await;
        let threshold = self.controller.status().await;
        info!(
            uptime = ?uptime,
            cycles = stats.cycles,
            idle_cycles = stats.idle_cycles,
            capacity_cycles = stats.capacity_cycles,
            paused_cycles = stats.paused_cycles,
            candidates = stats.candidates_evaluated,
            sizing_skips = stats.sizing_skips,
            denials = stats.denials,
            orders = stats.orders_submitted,
            full_fills = stats.full_fills,
            partial_fills = stats.partial_fills,
            rejected = stats.rejected_orders,
            cancelled = stats.cancelled_orders,
            slippage_samples = stats.slippage_samples,
            max_slippage_pips = stats.max_slippage_pips,
            stops_trailed = stats.stops_trailed,
            closed = stats.positions_closed,
            realized_pnl = stats.realized_pnl,
            reconciliations = stats.reconciliations,
            open_positions = summary.open_positions,
            total_risk = summary.total_risk,
            threshold = threshold.current,
            persistence_degraded = threshold.persistence_degraded,
            circuit = %self.resilient.circuit_phase(),
            "Trader stopped"
        );

        Ok(())
    }

    /// Releases storage once `start` has returned.
    pub async fn close(&self) {
        if *self.running.lock().await {
            warn!("Closing storage while the trader is still running");
        }
        self.trades.close().await;
    }

    /// Returns a copy of the current statistics.
    pub async fn stats(&self) -> Stats {
        self.stats.lock().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    pub async fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .await
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Puts the adaptive threshold back at its base value.
    pub async fn reset_threshold(&self) -> f64 {
        let record = self.controller.reset().await;
        info!(
            old_threshold = record.old_threshold,
            new_threshold = record.new_threshold,
            "Adaptive threshold reset"
        );
        record.new_threshold
    }

    async fn run_main_loop(&self) -> Result<(), TraderError> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Ok(());
        }
        let mut interval = tokio::time::interval(self.cfg.trader.cycle_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let outcome = self.run_cycle().await;
                    self.log_outcome(&outcome);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Runs one decision cycle: gate, rank, size, admit, execute.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let cycle = {
            let mut stats = self.stats.lock().await;
            stats.cycles += 1;
            stats.cycles
        };

        let every = self.cfg.trader.reconcile_every;
        if every > 0 && cycle % every == 0 {
            self.reconcile().await;
        }

        if self.risk.at_capacity().await {
            self.stats.lock().await.capacity_cycles += 1;
            debug!(cycle = cycle, "Book full, cycle skipped");
            return CycleOutcome::AtCapacity;
        }

        let batch = match self.signals.next_batch().await {
            Ok(batch) => batch,
            Err(e) => return CycleOutcome::Failed(e.into()),
        };

        let threshold = self.controller.current().await;
        let ranked = rank_candidates(&batch.candidates, threshold);
        debug!(
            cycle = cycle,
            candidates = batch.candidates.len(),
            passing = ranked.len(),
            threshold = threshold,
            volatility = ?batch.volatility,
            "Signals gated"
        );
        self.controller
            .record_cycle(ranked.len(), batch.volatility)
            .await;

        if ranked.is_empty() {
            self.stats.lock().await.idle_cycles += 1;
            return CycleOutcome::Idle;
        }

        let account = match self.venue.get_account_state().await {
            Ok(account) => account,
            Err(e) => return self.venue_failure(e).await,
        };
        let window = self.cfg.sizing.performance_window;
        let performance = match self.trades.performance(window).await {
            Ok(window) => Some(window),
            Err(e) => {
                warn!(error = %e, "Failed to load performance window");
                None
            }
        };
        let available_margin = Some(account.margin_available).filter(|m| m.is_finite());

        for intent in ranked {
            self.stats.lock().await.candidates_evaluated += 1;

            let metadata = match self.metadata.get(&intent.instrument).await {
                Ok(metadata) => metadata,
                Err(VenueError::CircuitOpen) => return self.paused().await,
                Err(e) => {
                    warn!(
                        instrument = %intent.instrument,
                        error = %e,
                        "No metadata, candidate skipped"
                    );
                    continue;
                }
            };
            let price = match self.venue.current_price(&intent.instrument).await {
                Ok(price) => price,
                Err(VenueError::CircuitOpen) => return self.paused().await,
                Err(e) => {
                    warn!(
                        instrument = %intent.instrument,
                        error = %e,
                        "No price, candidate skipped"
                    );
                    continue;
                }
            };

            let input = SizingInput {
                balance: account.balance,
                available_margin,
                price,
                stop_distance: intent.stop_distance,
                confidence: intent.confidence,
                metadata: &metadata,
                performance: performance.as_ref(),
            };
            let sizing = self.sizer.size(intent.direction, &input);
            if sizing.is_skipped() {
                self.stats.lock().await.sizing_skips += 1;
                continue;
            }

            let request = AdmissionRequest {
                instrument: intent.instrument.clone(),
                units: sizing.units(),
                risk_fraction: sizing.risk_fraction(),
            };
            if let Admission::Deny(_) = self.risk.admit(&request).await {
                self.stats.lock().await.denials += 1;
                continue;
            }

            info!(
                instrument = %intent.instrument,
                direction = %intent.direction,
                confidence = intent.confidence,
                units = sizing.units(),
                risk_fraction = sizing.risk_fraction(),
                method = %sizing.method(),
                "Candidate admitted"
            );
            self.stats.lock().await.orders_submitted += 1;

            let plan = ExecutionPlan {
                intent,
                units: sizing.units(),
                price,
                balance: account.balance,
                metadata: &metadata,
            };
            return match self.executor.execute(&plan).await {
                Ok(report) => {
                    let mut stats = self.stats.lock().await;
                    stats.record_fill(&report.class);
                    stats.record_slippage(report.slippage.pips);
                    CycleOutcome::Executed(report)
                }
                Err(e) => {
                    if !matches!(e, VenueError::CircuitOpen) {
                        self.stats.lock().await.rejected_orders += 1;
                    }
                    self.venue_failure(e).await
                }
            };
        }

        CycleOutcome::NoneAdmitted
    }

    /// Aligns the ledger with the venue and closes trades of released records.
    pub async fn reconcile(&self) {
        let positions = match self.venue.get_open_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                warn!(error = %e, "Reconciliation skipped");
                return;
            }
        };

        let report = self.risk.reconcile(&positions).await;
        self.stats.lock().await.reconciliations += 1;

        for record in &report.released {
            if let Some(trade_id) = record.trade_id {
                if let Err(e) = self.trades.close_trade(trade_id, None, None).await {
                    warn!(trade_id = trade_id, error = %e, "Failed to close orphaned trade");
                }
            }
        }

        if !report.released.is_empty() || !report.adopted.is_empty() {
            info!(
                released = report.released.len(),
                adopted = ?report.adopted,
                "Ledger reconciled with venue"
            );
        }
    }

    async fn venue_failure(&self, error: VenueError) -> CycleOutcome {
        match error {
            VenueError::CircuitOpen => self.paused().await,
            error => CycleOutcome::Failed(error.into()),
        }
    }

    async fn paused(&self) -> CycleOutcome {
        self.stats.lock().await.paused_cycles += 1;
        CycleOutcome::Paused
    }

    fn log_outcome(&self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Paused => warn!("{}", VenueError::CircuitOpen),
            CycleOutcome::Failed(e) => warn!(error = %e, "Decision cycle failed"),
            CycleOutcome::Executed(report) => debug!(
                class = report.class.as_str(),
                requested_units = report.requested_units,
                fill_price = report.fill_price,
                "Cycle executed"
            ),
            CycleOutcome::Idle | CycleOutcome::AtCapacity | CycleOutcome::NoneAdmitted => {}
        }
    }
}

/// Candidates clearing `threshold`, highest confidence first. Ties break on
/// instrument name so the order is deterministic.
pub fn rank_candidates(candidates: &[PositionIntent], threshold: f64) -> Vec<&PositionIntent> {
    let mut passing: Vec<&PositionIntent> = candidates
        .iter()
        .filter(|c| c.confidence >= threshold)
        .collect();
    passing.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.instrument.cmp(&b.instrument))
    });
    passing
}

#[cfg(test)]
mod tests;
