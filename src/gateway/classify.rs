//! Broker result-code classification
//!
//! Translates raw numeric gateway retcodes into the engine's closed
//! `Outcome` taxonomy. The numeric values follow the MetaTrader trade-server
//! convention. This module is the only place allowed to branch on a raw
//! code; everything downstream branches on `Outcome` and `FailureClass`.

use crate::domain::Outcome;
use crate::gateway::traits::{GatewayError, GatewayResult, SubmitAck};

// Success family
pub const RET_PLACED: i64 = 10008;
pub const RET_DONE: i64 = 10009;
pub const RET_DONE_PARTIAL: i64 = 10010;

// Transient family
pub const RET_REQUOTE: i64 = 10004;
pub const RET_REJECT: i64 = 10006;
pub const RET_TIMEOUT: i64 = 10012;
pub const RET_PRICE_CHANGED: i64 = 10020;
pub const RET_PRICE_OFF: i64 = 10021;
pub const RET_TOO_MANY_REQUESTS: i64 = 10024;
pub const RET_ORDER_LOCKED: i64 = 10028;

// Fatal family
pub const RET_INVALID_REQUEST: i64 = 10013;
pub const RET_INVALID_VOLUME: i64 = 10014;
pub const RET_INVALID_PRICE: i64 = 10015;
pub const RET_INVALID_STOPS: i64 = 10016;
pub const RET_TRADE_DISABLED: i64 = 10017;
pub const RET_MARKET_CLOSED: i64 = 10018;
pub const RET_NO_MONEY: i64 = 10019;
pub const RET_SERVER_DISABLES_TRADING: i64 = 10026;
pub const RET_CLIENT_DISABLES_TRADING: i64 = 10027;
pub const RET_POSITION_FROZEN: i64 = 10029;

// Fill semantics rejected for this instrument
pub const RET_INVALID_FILL: i64 = 10030;

// Trade server unreachable
pub const RET_NO_CONNECTION: i64 = 10031;

/// Fine-grained failure class the fallback sequencer branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The gateway explicitly rejected the chosen fill semantics
    FillIncompatible,
    /// Quote moved or price is stale; worth one quote-refresh retry
    PriceRelated,
    /// Generic transient condition, owned by the outer retry loop
    Transient,
    /// Retrying cannot help
    Fatal,
    /// The connection itself is down
    Connection,
}

fn code_class(code: i64) -> FailureClass {
    match code {
        RET_INVALID_FILL => FailureClass::FillIncompatible,
        RET_REQUOTE | RET_PRICE_CHANGED | RET_PRICE_OFF => FailureClass::PriceRelated,
        RET_REJECT | RET_TIMEOUT | RET_TOO_MANY_REQUESTS | RET_ORDER_LOCKED => {
            FailureClass::Transient
        }
        RET_NO_CONNECTION => FailureClass::Connection,
        // Unknown codes are treated as fatal: resubmitting a request the
        // broker answered with an unrecognized error is the riskier default.
        _ => FailureClass::Fatal,
    }
}

/// Classify a raw submit response into the four-way `Outcome` taxonomy.
pub fn classify_submit(result: GatewayResult<SubmitAck>) -> Outcome {
    let ack = match result {
        Ok(ack) => ack,
        Err(GatewayError::Transport(message)) => return Outcome::ConnectionFailure { message },
    };

    match ack.retcode {
        RET_PLACED | RET_DONE | RET_DONE_PARTIAL => Outcome::Success {
            ticket: ack.ticket,
            fill_price: ack.fill_price,
            fill_volume: ack.fill_volume,
        },
        code => match code_class(code) {
            FailureClass::Connection => Outcome::ConnectionFailure {
                message: format!("{} ({})", ack.comment, code),
            },
            FailureClass::PriceRelated | FailureClass::Transient => Outcome::TransientFailure {
                code,
                message: ack.comment,
            },
            // Fill-incompatible rejections retry-cannot-help under the same
            // policy; the sequencer recognizes them by code and advances.
            FailureClass::FillIncompatible | FailureClass::Fatal => Outcome::FatalFailure {
                code,
                message: ack.comment,
            },
        },
    }
}

/// Failure class of a non-success outcome. `None` for `Success`.
pub fn failure_class(outcome: &Outcome) -> Option<FailureClass> {
    match outcome {
        Outcome::Success { .. } => None,
        Outcome::ConnectionFailure { .. } => Some(FailureClass::Connection),
        Outcome::TransientFailure { code, .. } | Outcome::FatalFailure { code, .. } => {
            Some(code_class(*code))
        }
    }
}

/// Whether a failure suggests the link to the venue is in doubt, warranting
/// the retry controller's once-per-session liveness probe.
pub fn is_connectivity_flavored(outcome: &Outcome) -> bool {
    match outcome {
        Outcome::ConnectionFailure { .. } => true,
        Outcome::TransientFailure { code, .. } => *code == RET_TIMEOUT,
        _ => false,
    }
}
