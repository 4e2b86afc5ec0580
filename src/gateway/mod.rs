pub mod classify;
pub mod traits;

pub use classify::{classify_submit, failure_class, is_connectivity_flavored, FailureClass};
pub use traits::{GatewayClient, GatewayError, GatewayResult, SubmitAck};

#[cfg(test)]
pub use traits::MockGatewayClient;
