//! Execution engine
//!
//! Front door of the crate. Wires the admission pipeline (rate limiter,
//! circuit breaker, pre-flight validation) in front of the retry session and
//! reports the terminal outcome back up. Shared services are `Arc`ed, so
//! concurrent `submit` calls are safe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::coordination::{
    CircuitBreakerStats, EngineShutdown, ExecutionCircuitBreaker, RateLimiterStats,
    ShutdownHandle, SlidingWindowLimiter,
};
use crate::domain::{FillPolicy, OrderRequest, Outcome, RetryAttempt};
use crate::error::{OrdgateError, Result};
use crate::execution::fallback::FillPolicySequencer;
use crate::execution::retry::RetryController;
use crate::gateway::GatewayClient;
use crate::validation::{CacheStats, PreflightValidator, ValidationCache};

/// Everything known about a completed order session.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub request: OrderRequest,
    pub outcome: Outcome,
    pub policy_used: Option<FillPolicy>,
    pub attempts: Vec<RetryAttempt>,
    pub warnings: Vec<String>,
    pub total_elapsed: Duration,
    pub interrupted: bool,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

#[derive(Debug, Default)]
struct SessionCounters {
    attempted: AtomicU64,
    rate_limited: AtomicU64,
    circuit_denied: AtomicU64,
    validation_rejected: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    interrupted: AtomicU64,
}

/// Aggregated engine view for monitoring.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub attempted: u64,
    pub rate_limited: u64,
    pub circuit_denied: u64,
    pub validation_rejected: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub interrupted: u64,
    pub limiter: RateLimiterStats,
    pub breaker: CircuitBreakerStats,
    pub cache: CacheStats,
}

pub struct ExecutionEngine {
    gateway: Arc<dyn GatewayClient>,
    clock: Arc<dyn Clock>,
    limiter: Arc<SlidingWindowLimiter>,
    breaker: Arc<ExecutionCircuitBreaker>,
    cache: Arc<ValidationCache>,
    validator: PreflightValidator,
    sequencer: FillPolicySequencer,
    retry: RetryController,
    shutdown: EngineShutdown,
    counters: SessionCounters,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig, gateway: Arc<dyn GatewayClient>) -> Result<Self> {
        Self::with_clock(config, gateway, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: EngineConfig,
        gateway: Arc<dyn GatewayClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|problems| OrdgateError::Validation(problems.join("; ")))?;

        let limiter = Arc::new(SlidingWindowLimiter::new(
            config.rate_limit.clone(),
            clock.clone(),
        ));
        let breaker = Arc::new(ExecutionCircuitBreaker::new(
            config.circuit_breaker.clone(),
            clock.clone(),
        ));
        let cache = Arc::new(ValidationCache::new(config.cache.clone(), clock.clone()));
        let validator = PreflightValidator::new(config.validation.clone(), cache.clone());
        let sequencer = FillPolicySequencer::new(config.fill_policies.clone(), cache.clone());
        let retry = RetryController::new(config.retry.clone(), breaker.clone());

        Ok(Self {
            gateway,
            clock,
            limiter,
            breaker,
            cache,
            validator,
            sequencer,
            retry,
            shutdown: EngineShutdown::new(),
            counters: SessionCounters::default(),
        })
    }

    /// Submit one order through the full pipeline. Admission denials and
    /// validation rejections are errors; a dispatched order always produces
    /// a report, success or not.
    pub async fn submit(&self, request: OrderRequest) -> Result<ExecutionReport> {
        self.counters.attempted.fetch_add(1, Ordering::Relaxed);

        if self.shutdown.is_shutdown_requested() {
            return Err(OrdgateError::Internal("engine is shutting down".to_string()));
        }

        if !self.limiter.can_submit().await {
            let now = self.clock.now();
            let retry_after = (self.limiter.next_allowed_time().await - now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
            return Err(OrdgateError::RateLimitExceeded { retry_after });
        }

        if !self.breaker.can_execute().await {
            self.counters.circuit_denied.fetch_add(1, Ordering::Relaxed);
            return Err(OrdgateError::CircuitOpen {
                retry_after: self.breaker.time_until_recovery().await,
            });
        }

        let validation = match self
            .validator
            .validate(self.gateway.as_ref(), &request)
            .await
        {
            Ok(validation) => validation,
            Err(e) => {
                self.breaker.abandon_probe().await;
                if matches!(e, OrdgateError::Validation(_)) {
                    self.counters.validation_rejected.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        instrument = %request.instrument,
                        tag = %request.idempotency_tag,
                        error = %e,
                        "order rejected in pre-flight"
                    );
                }
                return Err(e);
            }
        };

        // Commit the rate-limit slot only when the order actually dispatches.
        if let Err(retry_after) = self.limiter.try_acquire().await {
            self.breaker.abandon_probe().await;
            self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
            return Err(OrdgateError::RateLimitExceeded { retry_after });
        }

        let started = tokio::time::Instant::now();
        let mut shutdown = self.shutdown.handle();
        let session = self
            .retry
            .run(self.gateway.as_ref(), &self.sequencer, &request, &mut shutdown)
            .await;

        if session.interrupted {
            self.breaker.abandon_probe().await;
            self.counters.interrupted.fetch_add(1, Ordering::Relaxed);
        } else if session.outcome.is_success() {
            self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
            info!(
                instrument = %request.instrument,
                tag = %request.idempotency_tag,
                attempts = session.attempts.len(),
                policy = ?session.policy_used,
                "order executed"
            );
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                instrument = %request.instrument,
                tag = %request.idempotency_tag,
                attempts = session.attempts.len(),
                outcome = %session.outcome,
                "order session failed"
            );
        }

        Ok(ExecutionReport {
            request,
            outcome: session.outcome,
            policy_used: session.policy_used,
            attempts: session.attempts,
            warnings: validation.warnings,
            total_elapsed: started.elapsed(),
            interrupted: session.interrupted,
        })
    }

    /// Handle for selecting against engine shutdown in caller tasks.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.handle()
    }

    /// Stop admitting new orders and wake any session pending in backoff.
    pub fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    /// Manually open the circuit, e.g. from an operator control surface.
    pub async fn trip_breaker(&self, reason: &str) {
        self.breaker.trip(reason).await;
    }

    /// Manually close the circuit after operator intervention.
    pub async fn reset_breaker(&self) {
        self.breaker.force_close().await;
    }

    /// Evict expired cache entries. Intended to be called periodically by
    /// the host.
    pub async fn sweep_cache(&self) {
        self.cache.sweep().await;
    }

    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            attempted: self.counters.attempted.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
            circuit_denied: self.counters.circuit_denied.load(Ordering::Relaxed),
            validation_rejected: self.counters.validation_rejected.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            interrupted: self.counters.interrupted.load(Ordering::Relaxed),
            limiter: self.limiter.stats().await,
            breaker: self.breaker.stats().await,
            cache: self.cache.stats(),
        }
    }
}
