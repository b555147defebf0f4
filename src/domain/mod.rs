//! Domain models shared by the sizing, risk and adaptive components.

mod account;
mod intent;
mod performance;
mod position;
mod threshold;

pub use account::{AccountState, InstrumentMetadata};
pub use intent::{Direction, PositionIntent, VolatilityRegime};
pub use performance::{PerformanceWindow, TradeRecord};
pub use position::{OpenPositionRecord, base_currency};
pub use threshold::{AdjustmentReason, AdjustmentRecord, MetricSnapshot};
