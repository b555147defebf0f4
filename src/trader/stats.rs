//! Runtime statistics for the trader.

use crate::resilience::FillClass;

/// Runtime statistics for the trader.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub cycles: u64,
    /// Cycles where no candidate cleared the threshold.
    pub idle_cycles: u64,
    /// Cycles skipped because the book was full.
    pub capacity_cycles: u64,
    /// Cycles skipped because the venue circuit was open.
    pub paused_cycles: u64,
    pub candidates_evaluated: u64,
    pub sizing_skips: u64,
    pub denials: u64,
    pub orders_submitted: u64,
    pub full_fills: u64,
    pub partial_fills: u64,
    pub rejected_orders: u64,
    pub cancelled_orders: u64,
    pub slippage_samples: u64,
    pub max_slippage_pips: f64,
    pub stops_trailed: u64,
    pub positions_closed: u64,
    pub realized_pnl: f64,
    pub reconciliations: u64,
}

impl Stats {
    pub fn record_fill(&mut self, class: &FillClass) {
        match class {
            FillClass::FullFill => self.full_fills += 1,
            FillClass::PartialFill => self.partial_fills += 1,
            FillClass::Rejected { .. } => self.rejected_orders += 1,
            FillClass::Cancelled => self.cancelled_orders += 1,
        }
    }

    pub fn record_slippage(&mut self, pips: f64) {
        self.slippage_samples += 1;
        if pips > self.max_slippage_pips {
            self.max_slippage_pips = pips;
        }
    }
}
