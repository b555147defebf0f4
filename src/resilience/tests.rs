//! Tests for the resilient venue wrapper.

use super::*;
use crate::config::{CircuitBreakerConfig, FillConfig, RetryConfig};
use crate::venue::mock::MockVenue;

fn config(max_retries: u32) -> ResilienceConfig {
    ResilienceConfig {
        call_timeout: Duration::from_millis(200),
        retry: RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            cooldown: Duration::from_millis(50),
        },
        fills: FillConfig::default(),
    }
}

fn wrap(mock: &Arc<MockVenue>, max_retries: u32) -> ResilientVenue {
    ResilientVenue::new(mock.clone(), &config(max_retries))
}

// ==================== Retry tests ====================

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let mock = Arc::new(MockVenue::new());
    mock.fail_next([VenueError::Timeout, VenueError::Server("502".into())]);
    let venue = wrap(&mock, 3);

    let account = venue.get_account_state().await.unwrap();
    assert_eq!(account.balance, 10_000.0);
    assert_eq!(mock.calls(), 3);
    assert_eq!(venue.circuit_phase(), CircuitPhase::Closed);
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    let mock = Arc::new(MockVenue::new());
    mock.set_failing(Some(VenueError::Connection("reset".into())));
    let venue = wrap(&mock, 2);

    let err = venue.current_price("EUR_USD").await.unwrap_err();
    assert_eq!(err, VenueError::Connection("reset".into()));
    assert_eq!(mock.calls(), 3);
}

#[tokio::test]
async fn test_non_retryable_error_surfaces_immediately() {
    let mock = Arc::new(MockVenue::new());
    let venue = wrap(&mock, 3);

    let err = venue.get_instrument_metadata("XAU_USD").await.unwrap_err();
    assert!(matches!(err, VenueError::InstrumentNotSupported(_)));
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn test_order_submission_is_not_retried() {
    let mock = Arc::new(MockVenue::new());
    mock.fail_next([VenueError::Timeout]);
    let venue = wrap(&mock, 3);

    let order = OrderRequest {
        instrument: "EUR_USD".into(),
        units: 1_000.0,
        stop: 1.098,
        target: 1.104,
    };
    assert_eq!(venue.submit_order(order).await.unwrap_err(), VenueError::Timeout);
    assert_eq!(mock.calls(), 1);
    assert!(mock.orders().is_empty());
}

#[tokio::test]
async fn test_slow_call_times_out() {
    let mock = Arc::new(MockVenue::new());
    mock.set_delay(Some(Duration::from_millis(500)));
    let venue = wrap(&mock, 0);

    assert_eq!(venue.get_account_state().await.unwrap_err(), VenueError::Timeout);
}

// ==================== Circuit breaker tests ====================

#[tokio::test]
async fn test_breaker_opens_and_fails_fast() {
    let mock = Arc::new(MockVenue::new());
    mock.set_failing(Some(VenueError::Server("503".into())));
    let venue = wrap(&mock, 0);

    for _ in 0..5 {
        assert!(venue.get_account_state().await.is_err());
    }
    assert_eq!(mock.calls(), 5);
    assert_eq!(venue.circuit_phase(), CircuitPhase::Open);

    let err = venue.get_account_state().await.unwrap_err();
    assert_eq!(err, VenueError::CircuitOpen);
    assert_eq!(err.to_string(), "venue degraded, trading paused: circuit open");
    assert_eq!(mock.calls(), 5);
}

#[tokio::test]
async fn test_single_trial_after_cooldown() {
    let mock = Arc::new(MockVenue::new());
    mock.set_failing(Some(VenueError::Server("503".into())));
    let venue = wrap(&mock, 0);
    for _ in 0..5 {
        let _ = venue.get_account_state().await;
    }

    tokio::time::sleep(Duration::from_millis(70)).await;

    // Trial fails and the circuit reopens without a second venue call
    assert!(venue.get_account_state().await.is_err());
    assert_eq!(mock.calls(), 6);
    assert_eq!(
        venue.get_account_state().await.unwrap_err(),
        VenueError::CircuitOpen
    );
    assert_eq!(mock.calls(), 6);

    tokio::time::sleep(Duration::from_millis(70)).await;
    mock.set_failing(None);

    assert!(venue.get_account_state().await.is_ok());
    assert_eq!(venue.circuit_phase(), CircuitPhase::Closed);
    assert_eq!(mock.calls(), 7);
}

#[tokio::test]
async fn test_rejections_do_not_trip_breaker() {
    let mock = Arc::new(MockVenue::new());
    let venue = wrap(&mock, 0);

    for _ in 0..10 {
        let _ = venue.close_position("EUR_USD").await;
    }
    assert_eq!(venue.circuit_phase(), CircuitPhase::Closed);
    assert_eq!(mock.calls(), 10);
}
