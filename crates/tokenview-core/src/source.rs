//! Contract with the authoritative ledger.
//!
//! The ledger itself (mutation rules, consensus, persistence) lives behind
//! this seam. The engine only queries, submits, and listens; it never trusts
//! anything but fresh `observe` reads for computing mutation effects.

use crate::error::TokenViewError;
use crate::types::{AccountId, Mutation, Snapshot};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio::sync::broadcast;

/// Pushed by the source on each new authoritative state transition.
///
/// Nothing beyond "something changed" is guaranteed; the sequence number
/// exists for log correlation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitNotice {
    pub sequence: u64,
}

/// Terminal outcome of a submitted mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MutationResolution {
    Confirmed,
    /// The source declined the mutation; the reason is opaque to the engine
    /// and surfaced to the caller verbatim.
    Rejected { reason: String },
}

/// The authoritative ledger, reachable only through query and submit.
#[async_trait]
pub trait AuthoritativeSource: Send + Sync {
    /// Read-only, side-effect-free snapshot of the requested accounts plus
    /// the global parameters. May fail transiently.
    async fn observe(&self, accounts: &BTreeSet<AccountId>) -> Result<Snapshot, TokenViewError>;

    /// Submit a mutation and suspend until the source confirms or rejects
    /// it. Effects are opaque; only before/after observes are trusted.
    async fn submit(&self, mutation: Mutation) -> Result<MutationResolution, TokenViewError>;

    /// Subscribe to commit notifications.
    fn subscribe_commits(&self) -> broadcast::Receiver<CommitNotice>;
}
