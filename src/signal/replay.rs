//! Signal replay from a JSON file of batches.

use std::fs;

use tracing::{info, warn};

use super::{QueuedSignals, SignalBatch, SignalError};
use crate::domain::PositionIntent;

/// Loads a JSON array of batches. Candidates that could never be traded
/// are dropped with a warning.
pub fn load_replay(path: &str) -> Result<QueuedSignals, SignalError> {
    let content = fs::read_to_string(path).map_err(|source| SignalError::Read {
        path: path.to_string(),
        source,
    })?;
    let mut batches: Vec<SignalBatch> = serde_json::from_str(&content)?;

    let mut dropped = 0;
    for batch in &mut batches {
        batch.candidates.retain(|candidate| {
            let usable = is_usable(candidate);
            if !usable {
                warn!(
                    instrument = %candidate.instrument,
                    confidence = candidate.confidence,
                    stop_distance = candidate.stop_distance,
                    "Dropping malformed signal"
                );
                dropped += 1;
            }
            usable
        });
    }

    info!(
        path = %path,
        batches = batches.len(),
        dropped = dropped,
        "Signal replay loaded"
    );
    Ok(QueuedSignals::new(format!("replay:{}", path), batches))
}

fn is_usable(candidate: &PositionIntent) -> bool {
    !candidate.instrument.is_empty()
        && (0.0..=1.0).contains(&candidate.confidence)
        && candidate.stop_distance.is_finite()
        && candidate.stop_distance > 0.0
        && candidate.target_distance.is_finite()
        && candidate.target_distance > 0.0
}
