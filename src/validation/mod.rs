//! Pre-dispatch validation: cached venue facts and pre-flight checks.

pub mod cache;
pub mod preflight;

pub use cache::{CacheStats, ValidationCache};
pub use preflight::{PreflightValidator, Validation};
