use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of a single gateway submission, classified by the engine.
///
/// Produced once per gateway call and never mutated. Raw broker codes stay
/// attached for diagnostics; branching on them happens only in
/// `gateway::classify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Outcome {
    Success {
        ticket: u64,
        fill_price: Decimal,
        fill_volume: Decimal,
    },
    /// Plausibly resolved by retrying (timing, price movement, throttling)
    TransientFailure { code: i64, message: String },
    /// Retrying cannot help (insufficient funds, invalid instrument)
    FatalFailure { code: i64, message: String },
    /// The gateway itself is unreachable
    ConnectionFailure { message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// Short label for logs and attempt traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::TransientFailure { .. } => "transient",
            Outcome::FatalFailure { .. } => "fatal",
            Outcome::ConnectionFailure { .. } => "connection",
        }
    }

    /// Raw broker code, where the outcome carries one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Outcome::TransientFailure { code, .. } | Outcome::FatalFailure { code, .. } => {
                Some(*code)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success {
                ticket,
                fill_price,
                fill_volume,
            } => write!(f, "success (ticket {ticket}, {fill_volume} @ {fill_price})"),
            Outcome::TransientFailure { code, message } => {
                write!(f, "transient failure {code}: {message}")
            }
            Outcome::FatalFailure { code, message } => {
                write!(f, "fatal failure {code}: {message}")
            }
            Outcome::ConnectionFailure { message } => {
                write!(f, "connection failure: {message}")
            }
        }
    }
}

/// One attempt within a retry session. Ephemeral diagnostics, scoped to a
/// single order-submission session.
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    /// 1-based attempt index
    pub attempt: u32,
    /// Elapsed time since the first attempt started
    pub elapsed: Duration,
    /// Backoff delay chosen before the *next* attempt, if any
    pub delay: Option<Duration>,
    pub outcome: Outcome,
}

/// Latest bid/ask snapshot from the venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub bid: Decimal,
    pub ask: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}

/// Venue-reported instrument metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub min_volume: Decimal,
    pub max_volume: Decimal,
    pub volume_step: Decimal,
    pub trade_allowed: bool,
}

/// Venue-reported account state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub trade_allowed: bool,
    /// Margin level in percent; zero when no positions are open
    pub margin_level: Decimal,
    pub free_margin: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn quote_mid_is_between_bid_and_ask() {
        let quote = Quote {
            bid: dec!(2350.00),
            ask: dec!(2350.40),
            timestamp: Utc::now(),
        };
        assert_eq!(quote.mid(), dec!(2350.20));
    }

    #[test]
    fn outcome_code_only_on_coded_failures() {
        let transient = Outcome::TransientFailure {
            code: 10004,
            message: "requote".to_string(),
        };
        assert_eq!(transient.code(), Some(10004));
        assert_eq!(transient.kind(), "transient");

        let conn = Outcome::ConnectionFailure {
            message: "terminal gone".to_string(),
        };
        assert_eq!(conn.code(), None);
        assert!(!conn.is_success());
    }
}
