use super::*;
use sched_core::FakeClock;
use std::time::Duration;

fn breaker() -> CircuitBreaker<FakeClock> {
    CircuitBreaker::new(
        CircuitBreakerConfig {
            failure_threshold: 3,
            window: Duration::from_secs(30),
            cooldown: Duration::from_secs(10),
        },
        FakeClock::new(),
    )
}

async fn fail() -> Result<(), &'static str> {
    Err("boom")
}

async fn ok() -> Result<(), &'static str> {
    Ok(())
}

#[tokio::test]
async fn starts_closed() {
    let cb = breaker();
    assert_eq!(cb.state(), BreakerState::Closed);
}

#[tokio::test]
async fn opens_after_threshold_consecutive_failures() {
    let cb = breaker();
    for _ in 0..2 {
        let _ = cb.call(fail).await;
        assert_eq!(cb.state(), BreakerState::Closed);
    }
    let _ = cb.call(fail).await;
    assert_eq!(cb.state(), BreakerState::Open);
    assert_eq!(cb.failure_count(), 3);
}

#[tokio::test]
async fn open_rejects_fast_without_running_the_op() {
    let cb = breaker();
    for _ in 0..3 {
        let _ = cb.call(fail).await;
    }
    assert_eq!(cb.state(), BreakerState::Open);

    let ops_before = cb.total_ops();
    let result = cb.call(ok).await;
    assert!(matches!(result, Err(CircuitError::Open)));
    assert_eq!(cb.total_ops(), ops_before, "rejected calls must not count as an op");
}

#[tokio::test]
async fn half_open_probe_succeeding_closes_the_breaker() {
    // Real clock so cooldown actually elapses without a FakeClock::advance,
    // proving the state machine transitions on wall time too.
    let cb = CircuitBreaker::new(
        CircuitBreakerConfig {
            failure_threshold: 1,
            window: Duration::from_secs(30),
            cooldown: Duration::from_millis(1),
        },
        sched_core::SystemClock,
    );
    let _ = cb.call(fail).await;
    assert_eq!(cb.state(), BreakerState::Open);

    tokio::time::sleep(Duration::from_millis(20)).await;

    let result = cb.call(ok).await;
    assert!(result.is_ok());
    assert_eq!(cb.state(), BreakerState::Closed);
}

#[tokio::test]
async fn half_open_probe_failing_reopens_the_breaker() {
    let cb = CircuitBreaker::new(
        CircuitBreakerConfig {
            failure_threshold: 1,
            window: Duration::from_secs(30),
            cooldown: Duration::from_millis(1),
        },
        sched_core::SystemClock,
    );
    let _ = cb.call(fail).await;
    assert_eq!(cb.state(), BreakerState::Open);

    tokio::time::sleep(Duration::from_millis(20)).await;

    let result = cb.call(fail).await;
    assert!(result.is_err());
    assert_eq!(cb.state(), BreakerState::Open);
}

#[tokio::test]
async fn success_rate_tracks_total_ops_and_successes() {
    let cb = breaker();
    let _ = cb.call(ok).await;
    let _ = cb.call(ok).await;
    let _ = cb.call(fail).await;
    assert_eq!(cb.total_ops(), 3);
    assert!((cb.success_rate() - (2.0 / 3.0)).abs() < 1e-9);
}

#[tokio::test]
async fn failures_outside_the_window_do_not_count() {
    let clock = FakeClock::new();
    let cb = CircuitBreaker::new(
        CircuitBreakerConfig {
            failure_threshold: 3,
            window: Duration::from_secs(10),
            cooldown: Duration::from_secs(10),
        },
        clock.clone(),
    );
    let _ = cb.call(fail).await;
    clock.advance(Duration::from_secs(20));
    let _ = cb.call(fail).await;
    let _ = cb.call(fail).await;
    // Only the last two failures are inside the window; threshold is 3.
    assert_eq!(cb.state(), BreakerState::Closed);
}
