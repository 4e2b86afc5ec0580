pub mod clock;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod execution;
pub mod gateway;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CacheConfig, CircuitBreakerConfig, EngineConfig, RateLimitConfig, RetryConfig,
    ValidationConfig,
};
pub use coordination::{
    CircuitBreakerStats, CircuitState, EngineShutdown, ExecutionCircuitBreaker,
    RateLimiterStats, ShutdownHandle, SlidingWindowLimiter,
};
pub use domain::{
    AccountInfo, Direction, FillPolicy, InstrumentInfo, OrderRequest, Outcome, Quote,
    RetryAttempt,
};
pub use error::{OrdgateError, Result};
pub use execution::{
    EngineStats, ExecutionEngine, ExecutionReport, FallbackResult, FillPolicySequencer,
    RetryController, SessionResult,
};
pub use gateway::{
    classify_submit, failure_class, is_connectivity_flavored, FailureClass, GatewayClient,
    GatewayError, GatewayResult, SubmitAck,
};
pub use validation::{CacheStats, PreflightValidator, Validation, ValidationCache};
