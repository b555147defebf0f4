//! Tests for the decision cycle.

use super::*;
use crate::config::{
    AdaptiveConfig, AppConfig, CircuitBreakerConfig, FillConfig, MonitorConfig, PaperConfig,
    PartialFillPolicy, ResilienceConfig, RetryConfig, RiskConfig, SignalsConfig, SizingConfig,
    StorageConfig, TraderConfig,
};
use crate::domain::{AdjustmentReason, Direction, OpenPositionRecord, TradeRecord};
use crate::resilience::FillClass;
use crate::signal::SignalBatch;
use crate::storage::InMemoryStorage;
use crate::venue::mock::MockVenue;
use chrono::Utc;

fn test_config() -> Config {
    Config {
        app: AppConfig {
            name: "riskgate-test".into(),
            env: "test".into(),
            log_level: None,
        },
        sizing: SizingConfig::default(),
        risk: RiskConfig::default(),
        adaptive: AdaptiveConfig::default(),
        resilience: ResilienceConfig {
            call_timeout: Duration::from_millis(200),
            retry: RetryConfig {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 2,
                failure_window: Duration::from_secs(60),
                cooldown: Duration::from_secs(60),
            },
            fills: FillConfig::default(),
        },
        monitor: MonitorConfig {
            interval: Duration::from_millis(10),
            ..MonitorConfig::default()
        },
        trader: TraderConfig {
            cycle_interval: Duration::from_millis(10),
            reconcile_every: 0,
        },
        storage: StorageConfig {
            enabled: false,
            ..StorageConfig::default()
        },
        paper: PaperConfig::default(),
        signals: SignalsConfig::default(),
    }
}

fn intent(instrument: &str, confidence: f64) -> PositionIntent {
    PositionIntent {
        instrument: instrument.into(),
        direction: Direction::Buy,
        confidence,
        stop_distance: 20.0,
        target_distance: 40.0,
    }
}

fn batch(candidates: Vec<PositionIntent>) -> SignalBatch {
    SignalBatch {
        candidates,
        volatility: None,
    }
}

struct Harness {
    mock: Arc<MockVenue>,
    signals: Arc<QueuedSignals>,
    storage: Arc<InMemoryStorage>,
    trader: Arc<Trader>,
}

async fn harness_with(cfg: Config, batches: Vec<SignalBatch>) -> Harness {
    let mock = Arc::new(MockVenue::new());
    let signals = Arc::new(QueuedSignals::new("test", batches));
    let storage = Arc::new(InMemoryStorage::new());
    let trader = Trader::new(
        cfg,
        mock.clone(),
        signals.clone(),
        storage.clone(),
        storage.clone(),
    )
    .await;

    Harness {
        mock,
        signals,
        storage,
        trader: Arc::new(trader),
    }
}

async fn harness(batches: Vec<SignalBatch>) -> Harness {
    harness_with(test_config(), batches).await
}

fn with_fill_policy(policy: PartialFillPolicy) -> Config {
    let mut cfg = test_config();
    cfg.resilience.fills = FillConfig {
        partial_fill_strategy: policy,
        min_partial_fill_pct: 50.0,
    };
    cfg
}

fn tracked(instrument: &str, trade_id: Option<i64>) -> OpenPositionRecord {
    OpenPositionRecord {
        instrument: instrument.into(),
        direction: Direction::Buy,
        units: 10_000.0,
        entry_price: 1.1,
        stop: 1.098,
        target: 1.104,
        stop_distance: 20.0,
        risk_fraction: 0.02,
        best_price: None,
        trade_id,
        opened_at: Utc::now(),
        closing: false,
    }
}

// ==================== Ranking tests ====================

#[test]
fn test_rank_candidates_filters_and_orders() {
    let candidates = vec![
        intent("GBP_USD", 0.85),
        intent("EUR_USD", 0.92),
        intent("AUD_USD", 0.70),
        intent("EUR_GBP", 0.85),
    ];

    let ranked = rank_candidates(&candidates, 0.8);
    let names: Vec<&str> = ranked.iter().map(|c| c.instrument.as_str()).collect();
    assert_eq!(names, vec!["EUR_USD", "EUR_GBP", "GBP_USD"]);
}

// ==================== Execution tests ====================

#[tokio::test]
async fn test_highest_confidence_candidate_executes() {
    let h = harness(vec![batch(vec![
        intent("EUR_USD", 0.85),
        intent("GBP_USD", 0.92),
    ])])
    .await;

    let outcome = h.trader.run_cycle().await;
    let CycleOutcome::Executed(report) = outcome else {
        panic!("expected execution, got {:?}", outcome);
    };

    assert_eq!(report.class, FillClass::FullFill);
    let orders = h.mock.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].instrument, "GBP_USD");
    assert!(h.trader.risk.position("GBP_USD").await.is_some());
    assert!(h.trader.risk.position("EUR_USD").await.is_none());

    let stats = h.trader.stats().await;
    assert_eq!(stats.orders_submitted, 1);
    assert_eq!(stats.full_fills, 1);
}

#[tokio::test]
async fn test_partial_fill_accepted() {
    let h = harness_with(
        with_fill_policy(PartialFillPolicy::Accept),
        vec![batch(vec![intent("EUR_USD", 0.9)])],
    )
    .await;
    h.mock.set_fill_ratios([0.6]);

    let CycleOutcome::Executed(report) = h.trader.run_cycle().await else {
        panic!("expected execution");
    };

    let requested = h.mock.orders()[0].units;
    let expected = (requested * 0.6).floor();
    assert_eq!(report.class, FillClass::PartialFill);
    assert_eq!(report.requested_units, requested);
    assert_eq!(report.filled_units, expected);

    let record = h.trader.risk.position("EUR_USD").await.unwrap();
    assert_eq!(record.units, expected);
    assert!((record.risk_fraction - expected * 20.0 * 0.0001 / 10_000.0).abs() < 1e-12);

    let stored = &h.storage.recent_trades(1).await.unwrap()[0];
    assert_eq!(stored.units, expected);
    assert_eq!(record.trade_id, Some(1));

    let stats = h.trader.stats().await;
    assert_eq!(stats.partial_fills, 1);
    assert_eq!(stats.slippage_samples, 1);
}

#[tokio::test]
async fn test_partial_fill_remainder_resubmitted() {
    let h = harness_with(
        with_fill_policy(PartialFillPolicy::Retry),
        vec![batch(vec![intent("EUR_USD", 0.9)])],
    )
    .await;
    h.mock.set_fill_ratios([0.3]);

    let CycleOutcome::Executed(report) = h.trader.run_cycle().await else {
        panic!("expected execution");
    };

    let orders = h.mock.orders();
    assert_eq!(orders.len(), 2);
    let requested = orders[0].units;
    let first = (requested * 0.3).floor();
    assert_eq!(orders[1].units, requested - first);

    assert_eq!(report.class, FillClass::FullFill);
    assert_eq!(report.filled_units, requested);
    let record = h.trader.risk.position("EUR_USD").await.unwrap();
    assert_eq!(record.units, requested);
}

#[tokio::test]
async fn test_partial_fill_above_minimum_not_resubmitted() {
    let h = harness_with(
        with_fill_policy(PartialFillPolicy::Retry),
        vec![batch(vec![intent("EUR_USD", 0.9)])],
    )
    .await;
    h.mock.set_fill_ratios([0.8]);

    let CycleOutcome::Executed(report) = h.trader.run_cycle().await else {
        panic!("expected execution");
    };
    assert_eq!(report.class, FillClass::PartialFill);
    assert_eq!(h.mock.orders().len(), 1);
}

#[tokio::test]
async fn test_partial_fill_cancelled_is_flattened() {
    let h = harness_with(
        with_fill_policy(PartialFillPolicy::Cancel),
        vec![batch(vec![intent("EUR_USD", 0.9)])],
    )
    .await;
    h.mock.set_fill_ratios([0.3]);

    let CycleOutcome::Executed(report) = h.trader.run_cycle().await else {
        panic!("expected execution");
    };

    assert!(matches!(report.class, FillClass::Rejected { .. }));
    assert_eq!(report.filled_units, 0.0);
    assert!(report.position.is_none());
    assert!(h.mock.venue_position("EUR_USD").is_none());
    assert_eq!(h.trader.risk.open_count().await, 0);
    assert_eq!(h.trader.stats().await.rejected_orders, 1);
}

#[tokio::test]
async fn test_stop_moved_to_fill_price_after_slippage() {
    let h = harness(vec![batch(vec![intent("EUR_USD", 0.9)])]).await;
    h.mock.set_slippage(0.0002);

    let CycleOutcome::Executed(report) = h.trader.run_cycle().await else {
        panic!("expected execution");
    };

    assert!((report.slippage.pips - 2.0).abs() < 1e-6);
    let updates = h.mock.stop_updates();
    assert_eq!(updates.len(), 1);
    assert!((updates[0].1 - 1.0982).abs() < 1e-9);

    let record = h.trader.risk.position("EUR_USD").await.unwrap();
    assert!((record.stop - 1.0982).abs() < 1e-9);
    assert!((record.target - 1.1042).abs() < 1e-9);
    assert!((h.trader.stats().await.max_slippage_pips - 2.0).abs() < 1e-6);
}

// ==================== Gating tests ====================

#[tokio::test]
async fn test_cycle_skipped_at_capacity() {
    let h = harness(vec![batch(vec![intent("GBP_USD", 0.95)])]).await;
    h.trader.risk.register(tracked("EUR_USD", None)).await;

    let outcome = h.trader.run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::AtCapacity));

    // Signals stay queued and the idle counter does not move
    assert_eq!(h.signals.pending().await, 1);
    assert_eq!(h.trader.controller.status().await.cycles_without_signal, 0);
    assert!(h.mock.orders().is_empty());
}

#[tokio::test]
async fn test_idle_cycles_lower_threshold() {
    let h = harness(Vec::new()).await;

    for _ in 0..4 {
        assert!(matches!(h.trader.run_cycle().await, CycleOutcome::Idle));
    }
    assert!((h.trader.controller.current().await - 0.8).abs() < 1e-9);

    assert!(matches!(h.trader.run_cycle().await, CycleOutcome::Idle));
    assert!((h.trader.controller.current().await - 0.78).abs() < 1e-9);
    assert_eq!(h.trader.stats().await.idle_cycles, 5);
}

#[tokio::test]
async fn test_candidates_below_threshold_are_idle() {
    let h = harness(vec![batch(vec![intent("EUR_USD", 0.6)])]).await;

    assert!(matches!(h.trader.run_cycle().await, CycleOutcome::Idle));
    assert!(h.mock.orders().is_empty());
    assert_eq!(h.trader.controller.status().await.cycles_without_signal, 1);
}

#[tokio::test]
async fn test_denied_candidate_falls_through_to_next() {
    let mut cfg = test_config();
    cfg.risk = RiskConfig {
        max_open_positions: 3,
        ..RiskConfig::default()
    };
    let h = harness_with(
        cfg,
        vec![batch(vec![intent("EUR_USD", 0.95), intent("GBP_USD", 0.9)])],
    )
    .await;
    h.trader.risk.register(tracked("EUR_USD", None)).await;

    let CycleOutcome::Executed(_) = h.trader.run_cycle().await else {
        panic!("expected execution");
    };
    assert_eq!(h.mock.orders()[0].instrument, "GBP_USD");
    assert_eq!(h.trader.stats().await.denials, 1);
}

#[tokio::test]
async fn test_open_circuit_pauses_trading() {
    let batches = (0..3)
        .map(|_| batch(vec![intent("EUR_USD", 0.9)]))
        .collect();
    let h = harness(batches).await;
    h.mock.set_failing(Some(VenueError::Server("503".into())));

    assert!(matches!(h.trader.run_cycle().await, CycleOutcome::Failed(_)));
    assert!(matches!(h.trader.run_cycle().await, CycleOutcome::Failed(_)));
    assert!(matches!(h.trader.run_cycle().await, CycleOutcome::Paused));

    assert_eq!(h.mock.calls(), 2);
    assert_eq!(h.trader.stats().await.paused_cycles, 1);
    assert!(h.mock.orders().is_empty());
}

#[tokio::test]
async fn test_book_stays_full_while_take_profit_close_fails() {
    let h = harness(vec![batch(vec![intent("GBP_USD", 0.95)])]).await;
    h.trader.risk.register(tracked("EUR_USD", None)).await;
    h.mock.insert_position(crate::venue::VenuePosition {
        instrument: "EUR_USD".into(),
        units: 10_000.0,
        entry_price: 1.1,
        stop: Some(1.098),
        target: Some(1.104),
    });
    h.mock.set_price("EUR_USD", 1.105);
    h.mock.set_close_delay(Some(Duration::from_millis(100)));
    h.mock
        .set_close_failure(Some(VenueError::Server("maintenance".into())));

    let monitor = h.trader.monitor.clone();
    let closer = tokio::spawn(async move { monitor.check_positions().await });
    tokio::time::sleep(Duration::from_millis(30)).await;

    // The close is still in flight; the slot it holds is not free yet
    let outcome = h.trader.run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::AtCapacity));

    let report = closer.await.unwrap();
    assert!(report.closed.is_empty());
    assert_eq!(report.errors, 1);

    assert_eq!(h.trader.risk.open_count().await, 1);
    let record = h.trader.risk.position("EUR_USD").await.unwrap();
    assert!(!record.closing);
    assert!(h.mock.orders().is_empty());
    assert_eq!(h.signals.pending().await, 1);
}

// ==================== Reconciliation tests ====================

#[tokio::test]
async fn test_reconcile_closes_orphaned_trade() {
    let h = harness(Vec::new()).await;
    let trade = TradeRecord {
        instrument: "EUR_USD".into(),
        direction: Direction::Buy,
        confidence: 0.9,
        units: 10_000.0,
        entry_price: 1.1,
        stop: 1.098,
        target: 1.104,
        risk_fraction: 0.02,
        slippage_pips: 0.0,
        opened_at: Utc::now(),
        exit_price: None,
        profit_loss: None,
        closed_at: None,
    };
    let trade_id = h.storage.store_trade(&trade).await.unwrap();
    h.trader.risk.register(tracked("EUR_USD", Some(trade_id))).await;

    h.trader.reconcile().await;

    assert_eq!(h.trader.risk.open_count().await, 0);
    let stored = &h.storage.recent_trades(1).await.unwrap()[0];
    assert!(stored.closed_at.is_some());
    assert_eq!(stored.profit_loss, None);
    assert_eq!(h.trader.stats().await.reconciliations, 1);
}

#[tokio::test]
async fn test_reconcile_adopts_unknown_venue_position() {
    let h = harness(Vec::new()).await;
    h.mock.insert_position(crate::venue::VenuePosition {
        instrument: "GBP_USD".into(),
        units: -5_000.0,
        entry_price: 1.25,
        stop: Some(1.252),
        target: None,
    });

    h.trader.reconcile().await;

    let adopted = h.trader.risk.position("GBP_USD").await.unwrap();
    assert_eq!(adopted.direction, Direction::Sell);
    assert_eq!(adopted.risk_fraction, 0.0);
}

// ==================== Performance feedback tests ====================

fn open_trade() -> TradeRecord {
    TradeRecord {
        instrument: "EUR_USD".into(),
        direction: Direction::Buy,
        confidence: 0.9,
        units: 10_000.0,
        entry_price: 1.1,
        stop: 1.098,
        target: 1.104,
        risk_fraction: 0.02,
        slippage_pips: 0.0,
        opened_at: Utc::now(),
        exit_price: None,
        profit_loss: None,
        closed_at: None,
    }
}

#[tokio::test]
async fn test_take_profit_feedback_uses_adaptive_window() {
    let mut cfg = test_config();
    cfg.sizing.performance_window = 50;
    cfg.adaptive.performance.window = 5;
    let h = harness_with(cfg, Vec::new()).await;

    // Oldest first: five losers, then four winners
    for pnl in [-10.0, -10.0, -10.0, -10.0, -10.0, 40.0, 40.0, 40.0, 40.0] {
        let id = h.storage.store_trade(&open_trade()).await.unwrap();
        h.storage.close_trade(id, Some(1.104), Some(pnl)).await.unwrap();
    }

    let trade_id = h.storage.store_trade(&open_trade()).await.unwrap();
    h.trader.risk.register(tracked("EUR_USD", Some(trade_id))).await;
    h.mock.insert_position(crate::venue::VenuePosition {
        instrument: "EUR_USD".into(),
        units: 10_000.0,
        entry_price: 1.1,
        stop: Some(1.098),
        target: Some(1.104),
    });
    h.mock.set_price("EUR_USD", 1.1045);

    let report = h.trader.monitor.check_positions().await;
    assert_eq!(report.closed, vec!["EUR_USD".to_string()]);

    // Only the five newest closes are scored: all winners, a strong band.
    // Over the sizing window the mix is 50/50 and no band would apply.
    assert!((h.trader.controller.current().await - 0.82).abs() < 1e-9);
}

// ==================== Lifecycle tests ====================

#[tokio::test]
async fn test_start_and_stop() {
    let h = harness(vec![batch(vec![intent("EUR_USD", 0.9)])]).await;

    let trader = h.trader.clone();
    let handle = tokio::spawn(async move { trader.start().await });
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(h.trader.is_running().await);
    assert!(matches!(
        h.trader.start().await,
        Err(TraderError::AlreadyRunning)
    ));
    assert!(h.trader.uptime().await > Duration::ZERO);

    h.trader.stop().await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert!(!h.trader.is_running().await);

    let stats = h.trader.stats().await;
    assert!(stats.cycles >= 1);
    assert_eq!(stats.orders_submitted, 1);
}

#[tokio::test]
async fn test_stop_when_not_running() {
    let h = harness(Vec::new()).await;
    assert!(matches!(
        h.trader.stop().await,
        Err(TraderError::NotRunning)
    ));
}

#[tokio::test]
async fn test_reset_threshold_returns_to_base() {
    let h = harness(Vec::new()).await;
    for _ in 0..5 {
        h.trader.run_cycle().await;
    }
    assert!((h.trader.controller.current().await - 0.78).abs() < 1e-9);

    let threshold = h.trader.reset_threshold().await;

    assert_eq!(threshold, 0.8);
    assert_eq!(h.trader.controller.current().await, 0.8);
    let log = h.storage.adjustments(1).await.unwrap();
    assert_eq!(log[0].reason, AdjustmentReason::Reset);
    assert_eq!(h.storage.last_threshold().await.unwrap(), Some(0.8));
}

#[tokio::test]
async fn test_close_releases_sqlite_storage() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut cfg = test_config();
    cfg.storage = StorageConfig {
        enabled: true,
        path: dir.path().join("trader.db").to_string_lossy().into_owned(),
    };
    let trader = Trader::from_config(cfg).await.unwrap();
    trader.trades.store_trade(&open_trade()).await.unwrap();

    trader.close().await;

    assert!(trader.trades.store_trade(&open_trade()).await.is_err());
}

#[tokio::test]
async fn test_price_path_moves_paper_quotes_while_running() {
    let dir = tempfile::TempDir::new().unwrap();
    let prices = dir.path().join("prices.json");
    std::fs::write(&prices, r#"[{"EUR_USD": 1.101}, {"EUR_USD": 1.102}]"#).unwrap();

    let mut cfg = test_config();
    cfg.paper = serde_yaml::from_str(
        r#"
instruments:
  EUR_USD:
    price: 1.1
    pip_value: 0.0001
    pip_size: 0.0001
    margin_rate: 0.0333
tick_interval: 5ms
"#,
    )
    .unwrap();
    cfg.paper.price_path = Some(prices.to_string_lossy().into_owned());
    let trader = Arc::new(Trader::from_config(cfg).await.unwrap());

    let runner = trader.clone();
    let handle = tokio::spawn(async move { runner.start().await });
    tokio::time::sleep(Duration::from_millis(60)).await;
    trader.stop().await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(trader.venue.current_price("EUR_USD").await.unwrap(), 1.102);
}

#[tokio::test]
async fn test_missing_price_path_fails_construction() {
    let mut cfg = test_config();
    cfg.paper.price_path = Some("/nonexistent/prices.json".into());

    assert!(matches!(
        Trader::from_config(cfg).await,
        Err(TraderError::PricePath(_))
    ));
}
