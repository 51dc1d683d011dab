//! Circuit breaker for the durable store.
//!
//! Stops calling a failing store for a cool-down period so a slow or dead
//! database cannot drag every caller down with it.
//!
//! # State Machine
//!
//! ```text
//!                    success
//!            ┌─────────────────────┐
//!            │                     │
//!            ▼                     │
//!      ┌──────────┐          ┌──────────┐          ┌──────────┐
//!      │  CLOSED  │ ───────► │   OPEN   │ ───────► │HALF-OPEN │
//!      │ (normal) │ failures │ (reject) │ cooldown │ (1 probe)│
//!      └──────────┘          └──────────┘          └──────────┘
//!            ▲                     ▲                     │
//!            │     probe success   │    probe failure    │
//!            └─────────────────────┼─────────────────────┘
//! ```
//!
//! While `Open`, no real call is attempted until the cool-down elapses; the
//! transition to `HalfOpen` admits exactly one trial call. Concurrent callers
//! during the probe are rejected with `CircuitOpen` until the probe reports.

use crate::error::{DbError, DbResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operation; calls pass through.
    Closed,
    /// Store presumed down; calls are rejected immediately.
    Open,
    /// Cool-down elapsed; one probe call is in flight.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a probe.
    pub cool_down: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(30),
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// True while the single half-open probe has been handed out but has not
    /// reported back yet.
    probe_in_flight: bool,
}

/// Shared circuit breaker guarding one downstream dependency.
///
/// Callers must pair every successful [`CircuitBreaker::acquire`] with
/// exactly one [`CircuitBreaker::on_success`] or
/// [`CircuitBreaker::on_failure`].
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a breaker in the `Closed` state.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
            config,
        }
    }

    /// Ask permission to make one call to the store.
    ///
    /// Returns `Err(CircuitOpen)` without touching the store when the
    /// circuit is open or another probe already holds the half-open slot.
    pub fn acquire(&self) -> DbResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.cool_down);
                if elapsed >= self.config.cool_down {
                    info!("circuit breaker admitting half-open probe");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    Ok(())
                } else {
                    Err(DbError::CircuitOpen {
                        retry_after_ms: (self.config.cool_down - elapsed).as_millis() as u64,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(DbError::CircuitOpen {
                        retry_after_ms: self.config.cool_down.as_millis() as u64,
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Report that the acquired call succeeded.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                info!("circuit breaker closing after successful probe");
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.probe_in_flight = false;
            }
            CircuitState::Open => {
                // Late report from a call admitted before the circuit opened.
                inner.consecutive_failures = 0;
            }
        }
    }

    /// Report that the acquired call failed against the store.
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        failures = inner.consecutive_failures,
                        cool_down_secs = self.config.cool_down.as_secs(),
                        "circuit breaker opening"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!("circuit breaker reopening after failed probe");
                inner.consecutive_failures += 1;
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
            }
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
            }
        }
    }

    /// Report that the acquired call never reached the store (local pool
    /// exhaustion). Proves nothing about store health: the failure counter
    /// is untouched and a half-open probe slot is handed back so the next
    /// caller can probe instead.
    pub fn on_abort(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Consecutive failures since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Point-in-time view for operator statistics.
    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            open_for_ms: inner
                .opened_at
                .map(|at| at.elapsed().as_millis() as u64),
        }
    }
}

/// Observable breaker state, reported alongside registry statistics so an
/// operator can spot a degrading store before it causes widespread denials.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub open_for_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            cool_down: Duration::from_millis(100),
        }
    }

    fn trip(breaker: &CircuitBreaker) {
        for _ in 0..3 {
            breaker.acquire().unwrap();
            breaker.on_failure();
        }
    }

    #[test]
    fn test_starts_closed() {
        let breaker = CircuitBreaker::new(test_config());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.acquire().is_ok());
    }

    #[test]
    fn test_opens_at_exact_threshold() {
        let breaker = CircuitBreaker::new(test_config());
        for i in 0..3 {
            assert!(breaker.acquire().is_ok());
            breaker.on_failure();
            if i < 2 {
                assert_eq!(breaker.state(), CircuitState::Closed);
            }
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_rejects_while_open() {
        let breaker = CircuitBreaker::new(test_config());
        trip(&breaker);
        match breaker.acquire() {
            Err(DbError::CircuitOpen { .. }) => {}
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(test_config());
        breaker.acquire().unwrap();
        breaker.on_failure();
        breaker.acquire().unwrap();
        breaker.on_failure();
        breaker.acquire().unwrap();
        breaker.on_success();
        assert_eq!(breaker.consecutive_failures(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cool_down_admits_single_probe() {
        let breaker = CircuitBreaker::new(test_config());
        trip(&breaker);

        tokio::time::advance(Duration::from_millis(150)).await;

        // First caller gets the probe slot.
        assert!(breaker.acquire().is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // Second caller is rejected while the probe is in flight.
        assert!(matches!(
            breaker.acquire(),
            Err(DbError::CircuitOpen { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_success_closes_and_resets() {
        let breaker = CircuitBreaker::new(test_config());
        trip(&breaker);
        tokio::time::advance(Duration::from_millis(150)).await;

        breaker.acquire().unwrap();
        breaker.on_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
        assert!(breaker.acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_reopens_and_restarts_cool_down() {
        let breaker = CircuitBreaker::new(test_config());
        trip(&breaker);
        tokio::time::advance(Duration::from_millis(150)).await;

        breaker.acquire().unwrap();
        breaker.on_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // Cool-down restarted; still rejecting before it elapses again.
        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(matches!(
            breaker.acquire(),
            Err(DbError::CircuitOpen { .. })
        ));

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(breaker.acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_probe_returns_slot() {
        let breaker = CircuitBreaker::new(test_config());
        trip(&breaker);
        tokio::time::advance(Duration::from_millis(150)).await;

        breaker.acquire().unwrap();
        breaker.on_abort();
        // Slot handed back without closing or reopening.
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.acquire().is_ok());
    }

    #[test]
    fn test_snapshot_reports_open_duration() {
        let breaker = CircuitBreaker::new(test_config());
        trip(&breaker);
        let snapshot = breaker.snapshot();
        // Snapshots are plain values; health reporters pass them around
        // by copy.
        let copied = snapshot;
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(copied.consecutive_failures, 3);
        assert!(copied.open_for_ms.is_some());
    }
}
