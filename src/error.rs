use crate::models::{Provider, WagerStatus};
use thiserror::Error;

/// Structured results returned to the caller layer. Identity and merge
/// failures are recovered locally (skip/fallback); ledger failures are
/// surfaced as rejections; only `InvariantViolation` is fatal-and-alertable.
#[derive(Debug, Clone, Error)]
pub enum WagerError {
    #[error("unrecognized team identifier {identifier:?}")]
    TeamNotFound {
        identifier: String,
        league: Option<String>,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("credit rejected: {0}")]
    CreditRejected(CreditRejection),

    #[error("provider {provider} unavailable: {reason}")]
    SourceUnavailable { provider: Provider, reason: String },

    #[error("ledger invariant violated for {user_id}: wagered {total_wagered_cents} > limit {credit_limit_cents}")]
    InvariantViolation {
        user_id: String,
        total_wagered_cents: u64,
        credit_limit_cents: u64,
    },

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("unknown wager: {0}")]
    UnknownWager(String),

    #[error("wager {id} is already {status}")]
    AlreadyTerminal { id: String, status: WagerStatus },
}

#[derive(Debug, Clone, Error)]
pub enum CreditRejection {
    #[error("account revoked")]
    Revoked,

    #[error("requested {requested_cents} cents exceeds remaining credit of {remaining_cents} cents")]
    LimitExceeded {
        requested_cents: u64,
        remaining_cents: u64,
    },
}
