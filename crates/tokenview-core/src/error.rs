use crate::types::AccountId;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Engine errors.
///
/// `Stale` is internal plumbing: the snapshot store reports it so callers
/// can absorb out-of-order observations, and it never reaches an end user.
#[derive(Debug, Clone, Error)]
pub enum TokenViewError {
    #[error("fee change requires owner authority, requester '{requester}' is not the owner")]
    Unauthorized { requester: AccountId },

    #[error("fee rate {requested} basis points exceeds the cap of {max}")]
    OutOfBounds { requested: u32, max: u32 },

    #[error("account '{account}' already has a mutation in flight")]
    Busy { account: AccountId },

    #[error("stale observation: holding {held}, incoming {incoming}")]
    Stale {
        held: DateTime<Utc>,
        incoming: DateTime<Utc>,
    },

    #[error("authoritative source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("mutation rejected by the authoritative source: {0}")]
    Rejected(String),
}

impl TokenViewError {
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}
