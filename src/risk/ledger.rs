//! Exposure aggregates derived from the open-position set.

use std::collections::BTreeMap;

use crate::domain::OpenPositionRecord;

/// ExposureLedger is recomputed from the open records on every read and never
/// stored, so it cannot drift from them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExposureLedger {
    pub open_positions: usize,
    /// Sum of risk fractions of the open records.
    pub total_risk: f64,
    /// Open positions per base currency.
    pub per_base_currency: BTreeMap<String, usize>,
}

impl ExposureLedger {
    pub fn from_positions<'a, I>(positions: I) -> Self
    where
        I: IntoIterator<Item = &'a OpenPositionRecord>,
    {
        let mut ledger = Self::default();
        for position in positions {
            ledger.open_positions += 1;
            ledger.total_risk += position.risk_fraction;
            *ledger
                .per_base_currency
                .entry(position.base_currency().to_string())
                .or_insert(0) += 1;
        }
        ledger
    }

    /// Open positions sharing `base`.
    pub fn correlated(&self, base: &str) -> usize {
        self.per_base_currency.get(base).copied().unwrap_or(0)
    }
}
