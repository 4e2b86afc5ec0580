//! Order dispatch: fill-policy fallback, retry sessions, engine pipeline.

pub mod engine;
pub mod fallback;
pub mod retry;

pub use engine::{EngineStats, ExecutionEngine, ExecutionReport};
pub use fallback::{FallbackResult, FillPolicySequencer};
pub use retry::{RetryController, SessionResult};
