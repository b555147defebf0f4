//! Trading venue abstraction and the in-process paper venue.

mod cache;
#[cfg(test)]
pub mod mock;
mod paper;
mod price_path;

use crate::domain::{AccountState, Direction, InstrumentMetadata};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cache::MetadataCache;
pub use paper::PaperVenue;
pub use price_path::{PricePath, PricePathError};

/// Venue errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VenueError {
    /// The call did not complete within its time budget.
    #[error("venue call timed out")]
    Timeout,

    /// The venue throttled the request.
    #[error("rate limited by venue")]
    RateLimited,

    /// The venue reported an internal failure.
    #[error("venue server error: {0}")]
    Server(String),

    /// The connection to the venue failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The venue refused the order for a non-margin reason.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// The venue refused the order for lack of margin.
    #[error("insufficient margin")]
    InsufficientMargin,

    /// Instrument is unknown to the venue.
    #[error("instrument {0} is not supported")]
    InstrumentNotSupported(String),

    /// No open position exists for the instrument.
    #[error("no open position for {0}")]
    PositionNotFound(String),

    /// The circuit breaker is open and no call was attempted.
    #[error("venue degraded, trading paused: circuit open")]
    CircuitOpen,
}

impl VenueError {
    /// Transient failures are retried with backoff and count against the breaker.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VenueError::Timeout
                | VenueError::RateLimited
                | VenueError::Server(_)
                | VenueError::Connection(_)
        )
    }
}

/// Result type for venue operations.
pub type Result<T> = std::result::Result<T, VenueError>;

/// Terminal order state reported by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Filled,
    PartiallyFilled,
    Cancelled,
    Rejected { reason: String },
}

/// Market order with attached protection levels.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub instrument: String,
    /// Signed units (negative sells).
    pub units: f64,
    pub stop: f64,
    pub target: f64,
}

/// Venue answer to an order submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderResponse {
    /// Signed filled units.
    pub filled_units: f64,
    /// Average fill price; zero when nothing filled.
    pub fill_price: f64,
    pub status: OrderStatus,
}

/// Open position as the venue sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct VenuePosition {
    pub instrument: String,
    /// Signed units.
    pub units: f64,
    pub entry_price: f64,
    pub stop: Option<f64>,
    pub target: Option<f64>,
}

impl VenuePosition {
    pub fn direction(&self) -> Direction {
        if self.units < 0.0 {
            Direction::Sell
        } else {
            Direction::Buy
        }
    }
}

/// Result of closing a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosedPosition {
    pub exit_price: f64,
    pub realized_pnl: f64,
}

/// Venue defines the operations the trader consumes from a trading venue.
#[async_trait]
pub trait Venue: Send + Sync {
    /// Current balance and margin figures.
    async fn get_account_state(&self) -> Result<AccountState>;

    /// Quoting and sizing metadata for an instrument.
    async fn get_instrument_metadata(&self, instrument: &str) -> Result<InstrumentMetadata>;

    /// Latest mid price for an instrument.
    async fn current_price(&self, instrument: &str) -> Result<f64>;

    /// Submits a market order with stop and target attached.
    /// A rejected order is reported through `OrderResponse::status`, or as
    /// `VenueError::Rejected`/`InsufficientMargin`.
    async fn submit_order(&self, order: OrderRequest) -> Result<OrderResponse>;

    /// Authoritative list of open positions.
    async fn get_open_positions(&self) -> Result<Vec<VenuePosition>>;

    /// Moves the stop loss of an open position.
    async fn update_stop(&self, instrument: &str, stop: f64) -> Result<()>;

    /// Closes an open position at market.
    async fn close_position(&self, instrument: &str) -> Result<ClosedPosition>;

    /// Venue name used in logs.
    fn name(&self) -> &str;
}
