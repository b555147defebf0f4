//! Trade candidates consumed by the decision cycle.
//!
//! Signal generation itself lives outside this crate. A source hands over one
//! batch per cycle: the candidates plus the volatility regime observed while
//! producing them.

mod replay;

pub use replay::load_replay;

use std::collections::VecDeque;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::{PositionIntent, VolatilityRegime};

/// Signal source errors.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("failed to read signal file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse signal file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Candidates produced for one decision cycle.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SignalBatch {
    #[serde(default)]
    pub candidates: Vec<PositionIntent>,
    #[serde(default)]
    pub volatility: Option<VolatilityRegime>,
}

impl SignalBatch {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// SignalSource yields the candidates for the next cycle.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Next batch; an empty batch when nothing is pending.
    async fn next_batch(&self) -> Result<SignalBatch, SignalError>;

    /// Source name used in logs.
    fn name(&self) -> &str;
}

/// QueuedSignals serves pre-built batches in order, then empty batches.
#[derive(Debug)]
pub struct QueuedSignals {
    name: String,
    batches: Mutex<VecDeque<SignalBatch>>,
}

impl QueuedSignals {
    pub fn new(name: impl Into<String>, batches: Vec<SignalBatch>) -> Self {
        Self {
            name: name.into(),
            batches: Mutex::new(batches.into()),
        }
    }

    /// Batches not yet served.
    pub async fn pending(&self) -> usize {
        self.batches.lock().await.len()
    }
}

#[async_trait]
impl SignalSource for QueuedSignals {
    async fn next_batch(&self) -> Result<SignalBatch, SignalError> {
        Ok(self.batches.lock().await.pop_front().unwrap_or_default())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
