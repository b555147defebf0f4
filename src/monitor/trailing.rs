//! Trailing stop computation.

use crate::config::TrailingConfig;
use crate::domain::{Direction, OpenPositionRecord};

/// New favourable extreme and, if it tightens, the new stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingUpdate {
    pub best_price: f64,
    pub stop: f64,
    /// Distance the stop moved, in pips; zero when it stayed put.
    pub moved_pips: f64,
}

impl TrailingUpdate {
    pub fn moved(&self) -> bool {
        self.moved_pips > 0.0
    }
}

/// Evaluates the trailing stop of `record` at `price`.
///
/// Trailing starts once the favourable move reaches
/// `activation_multiplier × stop_distance`. Each new favourable extreme moves
/// the stop by `move_multiplier × stop_distance`, but never closer to price
/// than half that move, and never backwards. Records without a stop distance
/// do not trail.
pub fn evaluate(
    config: &TrailingConfig,
    record: &OpenPositionRecord,
    price: f64,
    pip_size: f64,
) -> Option<TrailingUpdate> {
    if !config.enabled || record.stop_distance <= 0.0 || pip_size <= 0.0 || !price.is_finite() {
        return None;
    }

    let sign = record.direction.sign();
    let distance = record.stop_distance * pip_size;
    let favourable = (price - record.entry_price) * sign;
    if favourable < config.activation_multiplier * distance {
        return None;
    }
    if let Some(best) = record.best_price {
        if (price - best) * sign <= 0.0 {
            return None;
        }
    }

    let step = config.move_multiplier * distance;
    let candidate = record.stop + sign * step;
    let limit = price - sign * step * 0.5;
    let proposed = match record.direction {
        Direction::Buy => candidate.min(limit),
        Direction::Sell => candidate.max(limit),
    };

    let stop = if (proposed - record.stop) * sign > 0.0 {
        proposed
    } else {
        record.stop
    };
    Some(TrailingUpdate {
        best_price: price,
        stop,
        moved_pips: (stop - record.stop).abs() / pip_size,
    })
}
