//! Trader error types.

use crate::signal::SignalError;
use crate::storage::StorageError;
use crate::venue::{PricePathError, VenueError};

/// Trader error type.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error("trader is already running")]
    AlreadyRunning,
    #[error("trader is not running")]
    NotRunning,
    #[error("venue error: {0}")]
    Venue(#[from] VenueError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("signal error: {0}")]
    Signal(#[from] SignalError),
    #[error("price path error: {0}")]
    PricePath(#[from] PricePathError),
}
