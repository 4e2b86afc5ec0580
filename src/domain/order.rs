use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order direction (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

/// Execution-fill semantics requested for an order.
///
/// Brokers differ in which of these they accept per instrument; the fallback
/// sequencer walks an ordered preference list rather than assuming one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillPolicy {
    /// Immediate Or Cancel: fill what is available now, cancel the rest
    #[serde(rename = "ioc")]
    ImmediateOrCancel,
    /// Fill Or Kill: fill the full volume or nothing
    #[serde(rename = "fok")]
    FillOrKill,
    /// Return/market execution: leave the remainder working
    #[serde(rename = "return")]
    Return,
}

impl std::fmt::Display for FillPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FillPolicy::ImmediateOrCancel => write!(f, "ioc"),
            FillPolicy::FillOrKill => write!(f, "fok"),
            FillPolicy::Return => write!(f, "return"),
        }
    }
}

/// Order request (what we want to do). Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub instrument: String,
    pub direction: Direction,
    pub volume: Decimal,
    /// Price the caller decided against; validation checks the live quote has
    /// not drifted too far from it.
    pub reference_price: Decimal,
    /// Optional caller preference; `None` lets the configured policy order
    /// decide.
    pub fill_policy: Option<FillPolicy>,
    /// Tag carried through retries so the gateway can de-duplicate.
    pub idempotency_tag: Uuid,
}

impl OrderRequest {
    pub fn new(
        instrument: impl Into<String>,
        direction: Direction,
        volume: Decimal,
        reference_price: Decimal,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            direction,
            volume,
            reference_price,
            fill_policy: None,
            idempotency_tag: Uuid::new_v4(),
        }
    }

    pub fn buy(instrument: impl Into<String>, volume: Decimal, price: Decimal) -> Self {
        Self::new(instrument, Direction::Buy, volume, price)
    }

    pub fn sell(instrument: impl Into<String>, volume: Decimal, price: Decimal) -> Self {
        Self::new(instrument, Direction::Sell, volume, price)
    }

    pub fn with_fill_policy(mut self, policy: FillPolicy) -> Self {
        self.fill_policy = Some(policy);
        self
    }

    /// Copy of this request carrying a different (or no) fill policy.
    /// The idempotency tag is preserved: it identifies the order, not the
    /// individual submission attempt.
    pub fn with_policy_override(&self, policy: Option<FillPolicy>) -> Self {
        let mut request = self.clone();
        request.fill_policy = policy;
        request
    }
}
