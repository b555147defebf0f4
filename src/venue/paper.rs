//! In-process paper venue that fills market orders at the configured quote.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    ClosedPosition, OrderRequest, OrderResponse, OrderStatus, Result, Venue, VenueError,
    VenuePosition,
};
use crate::config::PaperConfig;
use crate::domain::{AccountState, InstrumentMetadata};

struct PaperInstrumentState {
    price: f64,
    metadata: InstrumentMetadata,
}

struct PaperState {
    balance: f64,
    margin_used: f64,
    instruments: HashMap<String, PaperInstrumentState>,
    positions: HashMap<String, PaperPosition>,
}

struct PaperPosition {
    position: VenuePosition,
    margin: f64,
}

/// PaperVenue simulates an account without touching a real venue.
pub struct PaperVenue {
    fill_ratio: f64,
    state: Mutex<PaperState>,
}

impl PaperVenue {
    /// Creates a paper venue from the `paper` config section.
    pub fn from_config(config: &PaperConfig) -> Self {
        let instruments = config
            .instruments
            .iter()
            .map(|(name, inst)| {
                let margin_rate = if inst.margin_rate > 0.0 {
                    inst.margin_rate
                } else {
                    1.0 / config.leverage
                };
                (
                    name.clone(),
                    PaperInstrumentState {
                        price: inst.price,
                        metadata: InstrumentMetadata {
                            pip_value: inst.pip_value,
                            pip_size: inst.pip_size,
                            margin_rate,
                            minimum_trade_size: inst.minimum_trade_size,
                            precision: inst.precision,
                            maximum_order_units: None,
                        },
                    },
                )
            })
            .collect();

        info!(
            balance = config.balance,
            instruments = config.instruments.len(),
            "Paper venue created"
        );

        Self {
            fill_ratio: config.fill_ratio.clamp(0.0, 1.0),
            state: Mutex::new(PaperState {
                balance: config.balance,
                margin_used: 0.0,
                instruments,
                positions: HashMap::new(),
            }),
        }
    }

    /// Moves the quote of an instrument.
    pub fn set_price(&self, instrument: &str, price: f64) -> Result<()> {
        let mut state = self.lock();
        let inst = state
            .instruments
            .get_mut(instrument)
            .ok_or_else(|| VenueError::InstrumentNotSupported(instrument.to_string()))?;
        inst.price = price;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PaperState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Venue for PaperVenue {
    async fn get_account_state(&self) -> Result<AccountState> {
        let state = self.lock();
        Ok(AccountState {
            balance: state.balance,
            margin_available: (state.balance - state.margin_used).max(0.0),
            margin_used: state.margin_used,
        })
    }

    async fn get_instrument_metadata(&self, instrument: &str) -> Result<InstrumentMetadata> {
        let state = self.lock();
        state
            .instruments
            .get(instrument)
            .map(|inst| inst.metadata.clone())
            .ok_or_else(|| VenueError::InstrumentNotSupported(instrument.to_string()))
    }

    async fn current_price(&self, instrument: &str) -> Result<f64> {
        let state = self.lock();
        state
            .instruments
            .get(instrument)
            .map(|inst| inst.price)
            .ok_or_else(|| VenueError::InstrumentNotSupported(instrument.to_string()))
    }

    async fn submit_order(&self, order: OrderRequest) -> Result<OrderResponse> {
        let mut state = self.lock();

        let (price, metadata) = match state.instruments.get(&order.instrument) {
            Some(inst) => (inst.price, inst.metadata.clone()),
            None => return Err(VenueError::InstrumentNotSupported(order.instrument)),
        };

        if state.positions.contains_key(&order.instrument) {
            return Ok(OrderResponse {
                filled_units: 0.0,
                fill_price: 0.0,
                status: OrderStatus::Rejected {
                    reason: "position already open".to_string(),
                },
            });
        }

        let magnitude = metadata.round_units_down(order.units.abs() * self.fill_ratio);
        if magnitude <= 0.0 {
            return Ok(OrderResponse {
                filled_units: 0.0,
                fill_price: 0.0,
                status: OrderStatus::Cancelled,
            });
        }

        let margin = magnitude * price * metadata.margin_rate;
        let margin_available = state.balance - state.margin_used;
        if margin > margin_available {
            return Err(VenueError::InsufficientMargin);
        }

        let filled_units = magnitude.copysign(order.units);
        state.margin_used += margin;
        state.positions.insert(
            order.instrument.clone(),
            PaperPosition {
                position: VenuePosition {
                    instrument: order.instrument.clone(),
                    units: filled_units,
                    entry_price: price,
                    stop: Some(order.stop),
                    target: Some(order.target),
                },
                margin,
            },
        );

        debug!(
            instrument = %order.instrument,
            requested = order.units,
            filled = filled_units,
            price = price,
            "Paper order filled"
        );

        let status = if magnitude < order.units.abs() {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Filled
        };

        Ok(OrderResponse {
            filled_units,
            fill_price: price,
            status,
        })
    }

    async fn get_open_positions(&self) -> Result<Vec<VenuePosition>> {
        let state = self.lock();
        Ok(state
            .positions
            .values()
            .map(|p| p.position.clone())
            .collect())
    }

    async fn update_stop(&self, instrument: &str, stop: f64) -> Result<()> {
        let mut state = self.lock();
        let paper = state
            .positions
            .get_mut(instrument)
            .ok_or_else(|| VenueError::PositionNotFound(instrument.to_string()))?;
        paper.position.stop = Some(stop);
        Ok(())
    }

    async fn close_position(&self, instrument: &str) -> Result<ClosedPosition> {
        let mut state = self.lock();

        let (price, metadata) = match state.instruments.get(instrument) {
            Some(inst) => (inst.price, inst.metadata.clone()),
            None => return Err(VenueError::InstrumentNotSupported(instrument.to_string())),
        };

        let paper = state
            .positions
            .remove(instrument)
            .ok_or_else(|| VenueError::PositionNotFound(instrument.to_string()))?;

        let pips = metadata.price_to_pips(price - paper.position.entry_price);
        let realized_pnl = pips * metadata.pip_value * paper.position.units;

        state.margin_used = (state.margin_used - paper.margin).max(0.0);
        state.balance += realized_pnl;

        Ok(ClosedPosition {
            exit_price: price,
            realized_pnl,
        })
    }

    fn name(&self) -> &str {
        "paper"
    }
}
