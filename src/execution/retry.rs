//! Bounded-backoff retry controller
//!
//! Drives one order session: repeated passes through the fill-policy
//! sequencer separated by capped exponential backoff with jitter, bounded by
//! both an attempt count and a wall-clock budget. The session's terminal
//! outcome is reported to the circuit breaker exactly once.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::coordination::{ExecutionCircuitBreaker, ShutdownHandle};
use crate::domain::{FillPolicy, OrderRequest, Outcome, RetryAttempt};
use crate::execution::fallback::{FallbackResult, FillPolicySequencer};
use crate::gateway::{is_connectivity_flavored, GatewayClient};

/// Terminal result of one order session.
#[derive(Debug, Clone)]
pub struct SessionResult {
    pub outcome: Outcome,
    pub policy_used: Option<FillPolicy>,
    /// Per-attempt trace, in order.
    pub attempts: Vec<RetryAttempt>,
    /// True when shutdown interrupted a pending backoff. An interrupted
    /// session is not reported to the circuit breaker.
    pub interrupted: bool,
}

pub struct RetryController {
    config: RetryConfig,
    breaker: Arc<ExecutionCircuitBreaker>,
}

impl RetryController {
    pub fn new(config: RetryConfig, breaker: Arc<ExecutionCircuitBreaker>) -> Self {
        Self { config, breaker }
    }

    /// Run a full retry session for one order.
    pub async fn run(
        &self,
        gateway: &dyn GatewayClient,
        sequencer: &FillPolicySequencer,
        request: &OrderRequest,
        shutdown: &mut ShutdownHandle,
    ) -> SessionResult {
        let started = tokio::time::Instant::now();
        let mut attempts = Vec::new();
        let mut pinged = false;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let FallbackResult {
                outcome,
                policy_used,
            } = sequencer.execute(gateway, request).await;
            let elapsed = started.elapsed();

            if outcome.is_success() {
                attempts.push(RetryAttempt {
                    attempt,
                    elapsed,
                    delay: None,
                    outcome: outcome.clone(),
                });
                self.breaker.record_success().await;
                return SessionResult {
                    outcome,
                    policy_used,
                    attempts,
                    interrupted: false,
                };
            }

            let retryable = matches!(outcome, Outcome::TransientFailure { .. });
            if !retryable || attempt >= self.config.max_attempts {
                if retryable {
                    warn!(attempt, "retry attempts exhausted");
                }
                attempts.push(RetryAttempt {
                    attempt,
                    elapsed,
                    delay: None,
                    outcome: outcome.clone(),
                });
                self.breaker.record_failure().await;
                return SessionResult {
                    outcome,
                    policy_used,
                    attempts,
                    interrupted: false,
                };
            }

            let delay = self.jittered(self.backoff_delay(attempt));
            if elapsed + delay >= self.config.max_total_elapsed() {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "retry wall-clock budget exhausted"
                );
                attempts.push(RetryAttempt {
                    attempt,
                    elapsed,
                    delay: None,
                    outcome: outcome.clone(),
                });
                self.breaker.record_failure().await;
                return SessionResult {
                    outcome,
                    policy_used,
                    attempts,
                    interrupted: false,
                };
            }

            debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                code = outcome.code().unwrap_or_default(),
                "transient failure, backing off"
            );
            attempts.push(RetryAttempt {
                attempt,
                elapsed,
                delay: Some(delay),
                outcome: outcome.clone(),
            });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.wait() => {
                    debug!(attempt, "session interrupted by shutdown");
                    return SessionResult {
                        outcome,
                        policy_used,
                        attempts,
                        interrupted: true,
                    };
                }
            }

            if is_connectivity_flavored(&outcome) && !pinged {
                pinged = true;
                debug!("probing gateway liveness before retry");
                if let Err(e) = gateway.ping().await {
                    let outcome = Outcome::ConnectionFailure {
                        message: format!("liveness probe failed: {e}"),
                    };
                    attempts.push(RetryAttempt {
                        attempt,
                        elapsed: started.elapsed(),
                        delay: None,
                        outcome: outcome.clone(),
                    });
                    self.breaker.record_failure().await;
                    return SessionResult {
                        outcome,
                        policy_used,
                        attempts,
                        interrupted: false,
                    };
                }
            }
        }
    }

    /// Deterministic capped schedule: `min(base * mult^(attempt-1), max)`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay().as_secs_f64();
        let raw = base
            * self
                .config
                .backoff_multiplier
                .powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(raw.min(self.config.max_delay().as_secs_f64()))
    }

    /// Add 10-30% uniform jitter so concurrent sessions do not retry in
    /// lockstep.
    fn jittered(&self, delay: Duration) -> Duration {
        let factor = rand::thread_rng().gen_range(0.10..=0.30);
        delay + delay.mul_f64(factor)
    }
}
