use std::time::Duration;
use thiserror::Error;

/// Main error type for the execution engine
#[derive(Error, Debug)]
pub enum OrdgateError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Pre-flight rejections (never retried)
    #[error("Validation failed: {0}")]
    Validation(String),

    // Admission denials (returned as data, never escalated to the breaker)
    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },

    #[error("Circuit breaker open, retry after {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    // Gateway transport faults surfaced outside an Outcome
    #[error("Gateway error: {0}")]
    Gateway(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for OrdgateError
pub type Result<T> = std::result::Result<T, OrdgateError>;

impl OrdgateError {
    /// Denials the caller can resolve by waiting (rate limit, open circuit).
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            OrdgateError::RateLimitExceeded { retry_after }
            | OrdgateError::CircuitOpen { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
