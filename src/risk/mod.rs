//! Portfolio risk manager.
//!
//! Owns the open-position records. All mutations go through one mutex shared
//! by the decision cycle and the position monitor.

mod ledger;

pub use ledger::ExposureLedger;

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::RiskConfig;
use crate::domain::{Direction, OpenPositionRecord, base_currency};
use crate::venue::VenuePosition;

/// Why a candidate was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    MaxOpenPositions,
    DuplicateInstrument,
    CorrelationLimit,
    TotalRiskExceeded,
    TradeRiskExceeded,
    UnitsExceeded,
}

impl DenyReason {
    /// Stable machine-checkable code.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::MaxOpenPositions => "max_open_positions",
            DenyReason::DuplicateInstrument => "duplicate_instrument",
            DenyReason::CorrelationLimit => "correlation_limit",
            DenyReason::TotalRiskExceeded => "total_risk_exceeded",
            DenyReason::TradeRiskExceeded => "trade_risk_exceeded",
            DenyReason::UnitsExceeded => "units_exceeded",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            DenyReason::MaxOpenPositions => "maximum open positions reached",
            DenyReason::DuplicateInstrument => "position already open on instrument",
            DenyReason::CorrelationLimit => "too many positions sharing the base currency",
            DenyReason::TotalRiskExceeded => "projected total risk exceeds limit",
            DenyReason::TradeRiskExceeded => "trade risk exceeds per-trade limit",
            DenyReason::UnitsExceeded => "units exceed per-instrument limit",
        };
        f.write_str(msg)
    }
}

/// Admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny(DenyReason),
}

/// A sized candidate awaiting admission.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionRequest {
    pub instrument: String,
    /// Signed units.
    pub units: f64,
    /// Fraction of balance at risk at the stop.
    pub risk_fraction: f64,
}

/// Slippage check outcome; advisory only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlippageCheck {
    /// Absolute distance between requested and fill price, in pips.
    pub pips: f64,
    pub exceeded: bool,
}

/// Point-in-time view of the book.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskSummary {
    pub open_positions: usize,
    pub max_positions: usize,
    pub capacity_left: usize,
    pub total_risk: f64,
    pub max_total_risk: f64,
    pub instruments: Vec<String>,
    pub per_base_currency: BTreeMap<String, usize>,
}

/// Result of reconciling the ledger against the venue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Local records with no venue position, now released.
    pub released: Vec<OpenPositionRecord>,
    /// Venue positions unknown locally, now tracked.
    pub adopted: Vec<String>,
}

/// Pure admission check over a ledger snapshot.
///
/// Checks run in a fixed order and the first failing limit is reported.
pub fn evaluate(
    config: &RiskConfig,
    ledger: &ExposureLedger,
    already_open: bool,
    request: &AdmissionRequest,
) -> Admission {
    if ledger.open_positions >= config.max_open_positions {
        return Admission::Deny(DenyReason::MaxOpenPositions);
    }
    if already_open {
        return Admission::Deny(DenyReason::DuplicateInstrument);
    }
    if ledger.correlated(base_currency(&request.instrument)) >= config.max_correlation_positions {
        return Admission::Deny(DenyReason::CorrelationLimit);
    }
    if ledger.total_risk + request.risk_fraction > config.max_total_risk {
        return Admission::Deny(DenyReason::TotalRiskExceeded);
    }
    if request.risk_fraction > config.max_risk_per_trade {
        return Admission::Deny(DenyReason::TradeRiskExceeded);
    }
    if request.units.abs() > config.max_units_per_instrument {
        return Admission::Deny(DenyReason::UnitsExceeded);
    }
    Admission::Allow
}

/// RiskManager grants or denies new positions and owns the open records.
pub struct RiskManager {
    config: RiskConfig,
    positions: Mutex<HashMap<String, OpenPositionRecord>>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        info!(
            max_open_positions = config.max_open_positions,
            max_risk_per_trade = config.max_risk_per_trade,
            max_total_risk = config.max_total_risk,
            max_correlation_positions = config.max_correlation_positions,
            "Risk manager initialized"
        );
        Self {
            config,
            positions: Mutex::new(HashMap::new()),
        }
    }

    /// Decides whether `request` may open. Does not reserve capacity.
    pub async fn admit(&self, request: &AdmissionRequest) -> Admission {
        let positions = self.positions.lock().await;
        let ledger = ExposureLedger::from_positions(positions.values());
        let decision = evaluate(
            &self.config,
            &ledger,
            positions.contains_key(&request.instrument),
            request,
        );
        drop(positions);

        if let Admission::Deny(reason) = decision {
            info!(
                instrument = %request.instrument,
                units = request.units,
                risk_fraction = request.risk_fraction,
                open_positions = ledger.open_positions,
                total_risk = ledger.total_risk,
                reason = reason.as_str(),
                "Candidate denied"
            );
        }
        decision
    }

    /// Tracks a confirmed fill. An existing record for the instrument is replaced.
    pub async fn register(&self, record: OpenPositionRecord) {
        let mut positions = self.positions.lock().await;
        if positions.contains_key(&record.instrument) {
            warn!(instrument = %record.instrument, "Position already tracked, replacing");
        }
        info!(
            instrument = %record.instrument,
            units = record.units,
            entry_price = record.entry_price,
            stop = record.stop,
            target = record.target,
            risk_fraction = record.risk_fraction,
            "Position registered"
        );
        positions.insert(record.instrument.clone(), record);
    }

    /// Marks a position as closing and returns a snapshot of it. Returns
    /// `None` when the position is untracked or already closing, so only one
    /// caller ever closes a given position. The record keeps its capacity
    /// and risk until `release` or `abort_close`.
    pub async fn begin_close(&self, instrument: &str) -> Option<OpenPositionRecord> {
        let mut positions = self.positions.lock().await;
        match positions.get_mut(instrument) {
            Some(record) if !record.closing => {
                record.closing = true;
                debug!(instrument = %instrument, "Position closing");
                Some(record.clone())
            }
            Some(_) => {
                debug!(instrument = %instrument, "Position already closing");
                None
            }
            None => None,
        }
    }

    /// Returns a closing position to normal tracking after a failed close.
    pub async fn abort_close(&self, instrument: &str) {
        if let Some(record) = self.positions.lock().await.get_mut(instrument) {
            record.closing = false;
            warn!(instrument = %instrument, "Close failed, position still tracked");
        }
    }

    /// Stops tracking a position. Returns `None` if it was already released.
    pub async fn release(&self, instrument: &str) -> Option<OpenPositionRecord> {
        let removed = self.positions.lock().await.remove(instrument);
        match &removed {
            Some(record) => info!(
                instrument = %instrument,
                units = record.units,
                "Position released"
            ),
            None => debug!(instrument = %instrument, "Release of untracked position ignored"),
        }
        removed
    }

    /// Moves the stop of a tracked position and records the favourable extreme.
    /// Returns false when the position is no longer tracked.
    pub async fn update_stop(&self, instrument: &str, stop: f64, best_price: Option<f64>) -> bool {
        let mut positions = self.positions.lock().await;
        match positions.get_mut(instrument) {
            Some(record) => {
                record.stop = stop;
                if best_price.is_some() {
                    record.best_price = best_price;
                }
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub async fn position(&self, instrument: &str) -> Option<OpenPositionRecord> {
        self.positions.lock().await.get(instrument).cloned()
    }

    /// Snapshot of all open records.
    pub async fn positions(&self) -> Vec<OpenPositionRecord> {
        self.positions.lock().await.values().cloned().collect()
    }

    pub async fn open_count(&self) -> usize {
        self.positions.lock().await.len()
    }

    /// True when no further position can be opened.
    pub async fn at_capacity(&self) -> bool {
        self.open_count().await >= self.config.max_open_positions
    }

    #[cfg(test)]
    pub async fn exposure(&self) -> ExposureLedger {
        ExposureLedger::from_positions(self.positions.lock().await.values())
    }

    pub async fn summary(&self) -> RiskSummary {
        let positions = self.positions.lock().await;
        let ledger = ExposureLedger::from_positions(positions.values());
        let mut instruments: Vec<String> = positions.keys().cloned().collect();
        instruments.sort();

        RiskSummary {
            open_positions: ledger.open_positions,
            max_positions: self.config.max_open_positions,
            capacity_left: self
                .config
                .max_open_positions
                .saturating_sub(ledger.open_positions),
            total_risk: ledger.total_risk,
            max_total_risk: self.config.max_total_risk,
            instruments,
            per_base_currency: ledger.per_base_currency,
        }
    }

    /// Aligns the ledger with the venue's open positions. The venue wins:
    /// local orphans are released and unknown positions adopted with zero
    /// known risk and trailing disabled. Records with a close in flight are
    /// left to the closer.
    pub async fn reconcile(&self, venue_positions: &[VenuePosition]) -> ReconcileReport {
        let mut positions = self.positions.lock().await;
        let mut report = ReconcileReport::default();

        let orphans: Vec<String> = positions
            .iter()
            .filter(|(instrument, record)| {
                !record.closing && !venue_positions.iter().any(|p| &p.instrument == *instrument)
            })
            .map(|(instrument, _)| instrument.clone())
            .collect();
        for instrument in orphans {
            if let Some(record) = positions.remove(&instrument) {
                warn!(instrument = %instrument, "Orphaned position released during reconciliation");
                report.released.push(record);
            }
        }

        for venue_position in venue_positions {
            if venue_position.units == 0.0 || positions.contains_key(&venue_position.instrument) {
                continue;
            }
            let direction = venue_position.direction();
            // A missing target must never look reached.
            let unreachable_target = match direction {
                Direction::Buy => f64::INFINITY,
                Direction::Sell => 0.0,
            };
            warn!(
                instrument = %venue_position.instrument,
                units = venue_position.units,
                "Untracked venue position adopted during reconciliation"
            );
            positions.insert(
                venue_position.instrument.clone(),
                OpenPositionRecord {
                    instrument: venue_position.instrument.clone(),
                    direction,
                    units: venue_position.units,
                    entry_price: venue_position.entry_price,
                    stop: venue_position.stop.unwrap_or(venue_position.entry_price),
                    target: venue_position.target.unwrap_or(unreachable_target),
                    stop_distance: 0.0,
                    risk_fraction: 0.0,
                    best_price: None,
                    trade_id: None,
                    opened_at: Utc::now(),
                    closing: false,
                },
            );
            report.adopted.push(venue_position.instrument.clone());
        }

        report
    }

    /// Flags fills that slipped more than `max_slippage_pips`. Never unwinds.
    pub fn evaluate_slippage(
        &self,
        requested_price: f64,
        fill_price: f64,
        pip_size: f64,
    ) -> SlippageCheck {
        let pips = if pip_size > 0.0 {
            (fill_price - requested_price).abs() / pip_size
        } else {
            0.0
        };
        let exceeded = pips > self.config.max_slippage_pips;
        if exceeded {
            warn!(
                requested_price = requested_price,
                fill_price = fill_price,
                slippage_pips = pips,
                max_slippage_pips = self.config.max_slippage_pips,
                "Slippage above limit"
            );
        }
        SlippageCheck { pips, exceeded }
    }
}
