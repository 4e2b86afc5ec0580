//! Process-wide admission state: rate limiter, circuit breaker, shutdown.

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod shutdown;

pub use circuit_breaker::{CircuitBreakerStats, CircuitState, ExecutionCircuitBreaker};
pub use rate_limiter::{RateLimiterStats, SlidingWindowLimiter};
pub use shutdown::{EngineShutdown, ShutdownHandle};
