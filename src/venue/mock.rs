//! Scriptable venue used by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    ClosedPosition, OrderRequest, OrderResponse, OrderStatus, Result, Venue, VenueError,
    VenuePosition,
};
use crate::domain::{AccountState, InstrumentMetadata};

pub struct MockVenue {
    calls: AtomicUsize,
    scripted_errors: Mutex<VecDeque<VenueError>>,
    failing: Mutex<Option<VenueError>>,
    delay: Mutex<Option<Duration>>,
    account: Mutex<AccountState>,
    metadata: InstrumentMetadata,
    prices: Mutex<HashMap<String, f64>>,
    fill_ratios: Mutex<VecDeque<f64>>,
    slippage: Mutex<f64>,
    orders: Mutex<Vec<OrderRequest>>,
    positions: Mutex<HashMap<String, VenuePosition>>,
    stop_updates: Mutex<Vec<(String, f64)>>,
    close_failure: Mutex<Option<VenueError>>,
    close_delay: Mutex<Option<Duration>>,
}

impl MockVenue {
    /// Account of 10000 with 9000 margin available; EUR_USD and GBP_USD quoted.
    pub fn new() -> Self {
        let mut prices = HashMap::new();
        prices.insert("EUR_USD".to_string(), 1.1);
        prices.insert("GBP_USD".to_string(), 1.25);
        Self {
            calls: AtomicUsize::new(0),
            scripted_errors: Mutex::new(VecDeque::new()),
            failing: Mutex::new(None),
            delay: Mutex::new(None),
            account: Mutex::new(AccountState {
                balance: 10_000.0,
                margin_available: 9_000.0,
                margin_used: 0.0,
            }),
            metadata: InstrumentMetadata {
                pip_value: 0.0001,
                pip_size: 0.0001,
                margin_rate: 0.05,
                minimum_trade_size: 1.0,
                precision: 0,
                maximum_order_units: None,
            },
            prices: Mutex::new(prices),
            fill_ratios: Mutex::new(VecDeque::new()),
            slippage: Mutex::new(0.0),
            orders: Mutex::new(Vec::new()),
            positions: Mutex::new(HashMap::new()),
            stop_updates: Mutex::new(Vec::new()),
            close_failure: Mutex::new(None),
            close_delay: Mutex::new(None),
        }
    }

    /// Errors returned, in order, by the next calls.
    pub fn fail_next(&self, errors: impl IntoIterator<Item = VenueError>) {
        self.scripted_errors.lock().unwrap().extend(errors);
    }

    /// Error returned by every call until cleared.
    pub fn set_failing(&self, error: Option<VenueError>) {
        *self.failing.lock().unwrap() = error;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_account(&self, account: AccountState) {
        *self.account.lock().unwrap() = account;
    }

    pub fn set_price(&self, instrument: &str, price: f64) {
        self.prices
            .lock()
            .unwrap()
            .insert(instrument.to_string(), price);
    }

    /// Fill ratios applied to the next orders; full fills afterwards.
    pub fn set_fill_ratios(&self, ratios: impl IntoIterator<Item = f64>) {
        *self.fill_ratios.lock().unwrap() = ratios.into_iter().collect();
    }

    /// Adverse price move applied to every fill.
    pub fn set_slippage(&self, price_delta: f64) {
        *self.slippage.lock().unwrap() = price_delta;
    }

    /// Error returned by `close_position` only.
    pub fn set_close_failure(&self, error: Option<VenueError>) {
        *self.close_failure.lock().unwrap() = error;
    }

    /// Delay applied to `close_position` only.
    pub fn set_close_delay(&self, delay: Option<Duration>) {
        *self.close_delay.lock().unwrap() = delay;
    }

    pub fn insert_position(&self, position: VenuePosition) {
        self.positions
            .lock()
            .unwrap()
            .insert(position.instrument.clone(), position);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }

    pub fn stop_updates(&self) -> Vec<(String, f64)> {
        self.stop_updates.lock().unwrap().clone()
    }

    pub fn venue_position(&self, instrument: &str) -> Option<VenuePosition> {
        self.positions.lock().unwrap().get(instrument).cloned()
    }

    async fn check(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.scripted_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        if let Some(error) = self.failing.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(())
    }

    fn price(&self, instrument: &str) -> Result<f64> {
        self.prices
            .lock()
            .unwrap()
            .get(instrument)
            .copied()
            .ok_or_else(|| VenueError::InstrumentNotSupported(instrument.to_string()))
    }
}

#[async_trait]
impl Venue for MockVenue {
    async fn get_account_state(&self) -> Result<AccountState> {
        self.check().await?;
        Ok(*self.account.lock().unwrap())
    }

    async fn get_instrument_metadata(&self, instrument: &str) -> Result<InstrumentMetadata> {
        self.check().await?;
        self.price(instrument)?;
        Ok(self.metadata.clone())
    }

    async fn current_price(&self, instrument: &str) -> Result<f64> {
        self.check().await?;
        self.price(instrument)
    }

    async fn submit_order(&self, order: OrderRequest) -> Result<OrderResponse> {
        self.check().await?;
        let quote = self.price(&order.instrument)?;
        self.orders.lock().unwrap().push(order.clone());

        let ratio = self.fill_ratios.lock().unwrap().pop_front().unwrap_or(1.0);
        let magnitude = (order.units.abs() * ratio).floor();
        if magnitude <= 0.0 {
            return Ok(OrderResponse {
                filled_units: 0.0,
                fill_price: 0.0,
                status: OrderStatus::Cancelled,
            });
        }
        let filled = magnitude * order.units.signum();
        let fill_price = quote + *self.slippage.lock().unwrap() * order.units.signum();

        let mut positions = self.positions.lock().unwrap();
        let position = positions
            .entry(order.instrument.clone())
            .or_insert_with(|| VenuePosition {
                instrument: order.instrument.clone(),
                units: 0.0,
                entry_price: fill_price,
                stop: Some(order.stop),
                target: Some(order.target),
            });
        let total = position.units + filled;
        position.entry_price =
            (position.units.abs() * position.entry_price + magnitude * fill_price) / total.abs();
        position.units = total;

        let status = if magnitude < order.units.abs() {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Filled
        };
        Ok(OrderResponse {
            filled_units: filled,
            fill_price,
            status,
        })
    }

    async fn get_open_positions(&self) -> Result<Vec<VenuePosition>> {
        self.check().await?;
        Ok(self.positions.lock().unwrap().values().cloned().collect())
    }

    async fn update_stop(&self, instrument: &str, stop: f64) -> Result<()> {
        self.check().await?;
        let mut positions = self.positions.lock().unwrap();
        let position = positions
            .get_mut(instrument)
            .ok_or_else(|| VenueError::PositionNotFound(instrument.to_string()))?;
        position.stop = Some(stop);
        self.stop_updates
            .lock()
            .unwrap()
            .push((instrument.to_string(), stop));
        Ok(())
    }

    async fn close_position(&self, instrument: &str) -> Result<ClosedPosition> {
        self.check().await?;
        let delay = *self.close_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.close_failure.lock().unwrap().clone() {
            return Err(error);
        }
        let price = self.price(instrument)?;
        let position = self
            .positions
            .lock()
            .unwrap()
            .remove(instrument)
            .ok_or_else(|| VenueError::PositionNotFound(instrument.to_string()))?;
        Ok(ClosedPosition {
            exit_price: price,
            realized_pnl: (price - position.entry_price) * position.units,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
