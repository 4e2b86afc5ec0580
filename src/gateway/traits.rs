use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::domain::{AccountInfo, InstrumentInfo, OrderRequest, Quote};

/// Transport-level gateway failure. Anything the broker terminal answered,
/// even a rejection, comes back as a `SubmitAck` instead.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("gateway transport failure: {0}")]
    Transport(String),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Raw response to a submit call, before classification.
///
/// `retcode` is the broker's numeric result code; only
/// `gateway::classify` is allowed to branch on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAck {
    pub retcode: i64,
    pub ticket: u64,
    pub fill_price: Decimal,
    pub fill_volume: Decimal,
    pub comment: String,
}

/// The only seam that performs network I/O against the venue.
///
/// Implemented by the broker-terminal collaborator; consumed by the engine.
/// Each call is a single blocking round-trip with no internal retry.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Submit an order. One call, no internal retry.
    async fn submit(&self, request: &OrderRequest) -> GatewayResult<SubmitAck>;

    /// Latest quote for an instrument.
    async fn quote(&self, instrument: &str) -> GatewayResult<Quote>;

    /// Instrument trading metadata.
    async fn instrument_info(&self, instrument: &str) -> GatewayResult<InstrumentInfo>;

    /// Account trading state.
    async fn account_info(&self) -> GatewayResult<AccountInfo>;

    /// Lightweight liveness check. Defaults to always-alive so implementors
    /// opt in; the retry controller calls it at most once per session.
    async fn ping(&self) -> GatewayResult<()> {
        Ok(())
    }
}
