//! Tests for the position monitor.

use super::*;
use crate::config::{AdaptiveConfig, RiskConfig, TrailingConfig};
use crate::domain::{Direction, TradeRecord};
use crate::storage::InMemoryStorage;
use crate::venue::VenuePosition;
use crate::venue::mock::MockVenue;
use chrono::Utc;
use std::time::Duration;

struct Harness {
    mock: Arc<MockVenue>,
    storage: Arc<InMemoryStorage>,
    risk: Arc<RiskManager>,
    controller: Arc<ThresholdController>,
    stats: Arc<Mutex<Stats>>,
    monitor: Arc<PositionMonitor>,
}

async fn harness() -> Harness {
    let mock = Arc::new(MockVenue::new());
    let venue: Arc<dyn Venue> = mock.clone();
    let storage = Arc::new(InMemoryStorage::new());
    let controller =
        Arc::new(ThresholdController::load(AdaptiveConfig::default(), storage.clone()).await);
    let risk = Arc::new(RiskManager::new(RiskConfig {
        max_open_positions: 3,
        ..RiskConfig::default()
    }));
    let stats = Arc::new(Mutex::new(Stats::default()));

    let config = MonitorConfig {
        enabled: true,
        interval: Duration::from_millis(10),
        trailing: TrailingConfig::default(),
    };
    let monitor = Arc::new(PositionMonitor::new(
        config,
        venue.clone(),
        Arc::new(MetadataCache::new(venue)),
        risk.clone(),
        storage.clone(),
        controller.clone(),
        stats.clone(),
        20,
    ));

    Harness {
        mock,
        storage,
        risk,
        controller,
        stats,
        monitor,
    }
}

fn trade(pnl: Option<f64>) -> TradeRecord {
    TradeRecord {
        instrument: "EUR_USD".into(),
        direction: Direction::Buy,
        confidence: 0.9,
        units: 10_000.0,
        entry_price: 1.1,
        stop: 1.098,
        target: 1.104,
        risk_fraction: 0.01,
        slippage_pips: 0.0,
        opened_at: Utc::now(),
        exit_price: pnl.map(|_| 1.104),
        profit_loss: pnl,
        closed_at: pnl.map(|_| Utc::now()),
    }
}

/// Opens a long EUR_USD at 1.1000, stop 20 pips, target 40 pips.
async fn open_long(h: &Harness) -> i64 {
    let trade_id = h.storage.store_trade(&trade(None)).await.unwrap();
    h.mock.insert_position(VenuePosition {
        instrument: "EUR_USD".into(),
        units: 10_000.0,
        entry_price: 1.1,
        stop: Some(1.098),
        target: Some(1.104),
    });
    h.risk
        .register(OpenPositionRecord {
            instrument: "EUR_USD".into(),
            direction: Direction::Buy,
            units: 10_000.0,
            entry_price: 1.1,
            stop: 1.098,
            target: 1.104,
            stop_distance: 20.0,
            risk_fraction: 0.01,
            best_price: None,
            trade_id: Some(trade_id),
            opened_at: Utc::now(),
            closing: false,
        })
        .await;
    trade_id
}

// ==================== Take-profit tests ====================

#[tokio::test]
async fn test_take_profit_closes_position() {
    let h = harness().await;
    open_long(&h).await;
    h.mock.set_price("EUR_USD", 1.1045);

    let report = h.monitor.check_positions().await;

    assert_eq!(report.closed, vec!["EUR_USD".to_string()]);
    assert_eq!(h.risk.open_count().await, 0);
    assert!(h.mock.venue_position("EUR_USD").is_none());

    let stored = &h.storage.recent_trades(1).await.unwrap()[0];
    assert_eq!(stored.exit_price, Some(1.1045));
    assert!((stored.profit_loss.unwrap() - 45.0).abs() < 1e-6);
    assert!(stored.closed_at.is_some());
    assert_eq!(h.stats.lock().await.positions_closed, 1);
}

#[tokio::test]
async fn test_take_profit_feeds_threshold_controller() {
    let h = harness().await;
    for _ in 0..4 {
        let id = h.storage.store_trade(&trade(None)).await.unwrap();
        h.storage
            .close_trade(id, Some(1.104), Some(40.0))
            .await
            .unwrap();
    }
    open_long(&h).await;
    h.mock.set_price("EUR_USD", 1.1041);

    h.monitor.check_positions().await;

    // Five winners in the window: strong performance raises the gate.
    assert!((h.controller.current().await - 0.82).abs() < 1e-9);
}

#[tokio::test]
async fn test_failed_close_keeps_position_tracked() {
    let h = harness().await;
    open_long(&h).await;
    h.mock.set_price("EUR_USD", 1.1050);
    h.mock
        .set_close_failure(Some(VenueError::Server("maintenance".into())));

    let report = h.monitor.check_positions().await;

    assert!(report.closed.is_empty());
    assert_eq!(report.errors, 1);
    let record = h.risk.position("EUR_USD").await.unwrap();
    assert!(!record.closing);
    assert!(h.storage.recent_trades(1).await.unwrap()[0].closed_at.is_none());

    // Retried on the next pass once the venue recovers
    h.mock.set_close_failure(None);
    let report = h.monitor.check_positions().await;
    assert_eq!(report.closed.len(), 1);
    assert!(h.risk.position("EUR_USD").await.is_none());
}

#[tokio::test]
async fn test_position_gone_at_venue_still_closes_trade() {
    let h = harness().await;
    open_long(&h).await;
    h.mock
        .set_close_failure(Some(VenueError::PositionNotFound("EUR_USD".into())));
    h.mock.set_price("EUR_USD", 1.1042);

    let report = h.monitor.check_positions().await;

    assert_eq!(report.closed.len(), 1);
    let stored = &h.storage.recent_trades(1).await.unwrap()[0];
    assert_eq!(stored.exit_price, Some(1.1042));
    assert_eq!(stored.profit_loss, None);
}

// ==================== Trailing tests ====================

#[tokio::test]
async fn test_trailing_moves_stop_at_venue_and_ledger() {
    let h = harness().await;
    open_long(&h).await;
    h.mock.set_price("EUR_USD", 1.1025);

    let report = h.monitor.check_positions().await;
    assert_eq!(report.trailed, vec!["EUR_USD".to_string()]);

    let updates = h.mock.stop_updates();
    assert_eq!(updates.len(), 1);
    assert!((updates[0].1 - 1.099).abs() < 1e-9);

    let record = h.risk.position("EUR_USD").await.unwrap();
    assert!((record.stop - 1.099).abs() < 1e-9);
    assert_eq!(record.best_price, Some(1.1025));
    assert_eq!(h.stats.lock().await.stops_trailed, 1);

    // Same price again is not a new extreme
    let report = h.monitor.check_positions().await;
    assert!(report.trailed.is_empty());
    assert_eq!(h.mock.stop_updates().len(), 1);
}

#[tokio::test]
async fn test_no_trailing_below_activation() {
    let h = harness().await;
    open_long(&h).await;
    h.mock.set_price("EUR_USD", 1.1010);

    let report = h.monitor.check_positions().await;
    assert_eq!(report.checked, 1);
    assert!(report.trailed.is_empty());
    assert!(h.mock.stop_updates().is_empty());
}

// ==================== Loop tests ====================

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let h = harness().await;
    open_long(&h).await;
    h.mock.set_price("EUR_USD", 1.1045);

    let (tx, rx) = watch::channel(false);
    let monitor = h.monitor.clone();
    let handle = tokio::spawn(async move { monitor.run(rx).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.risk.open_count().await, 0);
}
