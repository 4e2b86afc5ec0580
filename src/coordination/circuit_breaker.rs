//! Execution circuit breaker
//!
//! Supervises gateway health across order sessions: after a run of
//! consecutive terminal failures all submissions are suspended for a
//! cooldown, then a single half-open probe decides whether to resume.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::CircuitBreakerConfig;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - submissions allowed
    Closed,
    /// Failure threshold exceeded - submissions blocked
    Open,
    /// Cooldown elapsed - exactly one probe submission allowed
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

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_transition: DateTime<Utc>,
    /// A half-open probe session has been admitted and has not reported yet.
    probe_in_flight: bool,
}

/// Process-wide breaker over order-session outcomes.
///
/// Only the terminal outcome of a full retry session is reported here, and
/// exactly once per session; intermediate transient failures never count.
pub struct ExecutionCircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
    total_trips: AtomicU64,
}

/// Snapshot for monitoring
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_transition: DateTime<Utc>,
    pub total_trips: u64,
}

impl ExecutionCircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            config,
            clock,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_transition: now,
                probe_in_flight: false,
            }),
            total_trips: AtomicU64::new(0),
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    /// Admission check. In `Open`, the cooldown elapsing transitions to
    /// `HalfOpen` as a side effect; `HalfOpen` admits exactly one in-flight
    /// probe until it reports.
    pub async fn can_execute(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = (now - inner.last_transition)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.recovery_timeout() {
                    inner.state = CircuitState::HalfOpen;
                    inner.last_transition = now;
                    inner.probe_in_flight = true;
                    info!("circuit breaker half-open, admitting probe");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Report a successful session. Resets the failure run and closes the
    /// circuit regardless of prior state.
    pub async fn record_success(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;

        inner.consecutive_failures = 0;
        inner.probe_in_flight = false;
        if inner.state != CircuitState::Closed {
            inner.state = CircuitState::Closed;
            inner.last_transition = now;
            info!("circuit breaker closed, normal operation resumed");
        }
        debug!("session success recorded");
    }

    /// Report a failed session terminal outcome.
    pub async fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;

        inner.consecutive_failures += 1;
        let failures = inner.consecutive_failures;

        match inner.state {
            CircuitState::HalfOpen => {
                // Failed probe: reopen and restart the cooldown timer.
                inner.state = CircuitState::Open;
                inner.last_transition = now;
                inner.probe_in_flight = false;
                self.total_trips.fetch_add(1, Ordering::Relaxed);
                warn!(failures, "half-open probe failed, circuit reopened");
            }
            CircuitState::Closed if failures >= self.config.failure_threshold => {
                inner.state = CircuitState::Open;
                inner.last_transition = now;
                self.total_trips.fetch_add(1, Ordering::Relaxed);
                warn!(failures, "circuit breaker tripped");
            }
            _ => {
                warn!(failures, "session failure recorded");
            }
        }
    }

    /// Release an admitted probe slot without a verdict, for sessions that
    /// were admitted but never dispatched to the gateway.
    pub async fn abandon_probe(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == CircuitState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    /// Manually trip the circuit.
    pub async fn trip(&self, reason: &str) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        if inner.state != CircuitState::Open {
            inner.state = CircuitState::Open;
            inner.last_transition = now;
            inner.probe_in_flight = false;
            self.total_trips.fetch_add(1, Ordering::Relaxed);
            warn!(reason, "circuit breaker manually tripped");
        }
    }

    /// Manual reset to `Closed`.
    pub async fn force_close(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.probe_in_flight = false;
        inner.last_transition = now;
        warn!("circuit breaker force-closed");
    }

    /// Remaining cooldown before the next probe is admitted. Zero outside
    /// `Open`.
    pub async fn time_until_recovery(&self) -> Duration {
        let now = self.clock.now();
        let inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Open => {
                let elapsed = (now - inner.last_transition)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                self.recovery_timeout().saturating_sub(elapsed)
            }
            _ => Duration::ZERO,
        }
    }

    pub async fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock().await;
        CircuitBreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_transition: inner.last_transition,
            total_trips: self.total_trips.load(Ordering::Relaxed),
        }
    }

    fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.config.recovery_timeout_secs)
    }
}
