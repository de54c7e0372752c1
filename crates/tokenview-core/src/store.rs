//! Snapshot store: the single owner of authoritative account data.
//!
//! Writers are the reconciliation scheduler and the mutation executor;
//! everything else holds read views. Merges are atomic per call and ordered
//! by `observed_at`, with the post-mutation forced path overriding the
//! staleness guard.

use crate::error::TokenViewError;
use crate::types::{Account, AccountId, GlobalParameters, Snapshot};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::{broadcast, RwLock};

/// How a merge treats the staleness guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Reject snapshots at or before the held `observed_at`.
    Guarded,
    /// Always apply; used for snapshots taken directly after a mutation the
    /// engine itself confirmed, which reflect ground truth regardless of
    /// timestamp ordering.
    Forced,
}

/// Broadcast after every applied merge, naming the accounts it replaced.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub changed: BTreeSet<AccountId>,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct StoreState {
    accounts: BTreeMap<AccountId, Account>,
    params: Option<GlobalParameters>,
    observed_at: Option<DateTime<Utc>>,
}

/// Last authoritative observation per account plus global parameters.
pub struct SnapshotStore {
    state: RwLock<StoreState>,
    event_tx: broadcast::Sender<StoreEvent>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            state: RwLock::new(StoreState::default()),
            event_tx,
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_tx.subscribe()
    }

    pub async fn get(&self, id: &AccountId) -> Option<Account> {
        self.state.read().await.accounts.get(id).cloned()
    }

    pub async fn params(&self) -> Option<GlobalParameters> {
        self.state.read().await.params.clone()
    }

    pub async fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.observed_at
    }

    /// Account, parameters, and baseline timestamp from one consistent read.
    ///
    /// Taken under a single lock so a merge cannot interleave and pair the
    /// account with parameters from a different observation.
    pub async fn account_with_params(
        &self,
        id: &AccountId,
    ) -> Option<(Account, GlobalParameters, DateTime<Utc>)> {
        let state = self.state.read().await;
        let account = state.accounts.get(id)?.clone();
        let params = state.params.clone()?;
        let observed_at = state.observed_at?;
        Some((account, params, observed_at))
    }

    /// Merge a fresh observation.
    ///
    /// Replaces exactly the accounts present in `snapshot`; unrelated
    /// accounts are untouched, so partial observations never clobber the
    /// wider view. Under `MergeMode::Guarded` a snapshot at or before the
    /// held baseline is rejected with `Stale` and nothing changes.
    pub async fn merge(&self, snapshot: Snapshot, mode: MergeMode) -> Result<(), TokenViewError> {
        let mut state = self.state.write().await;

        if mode == MergeMode::Guarded {
            if let Some(held) = state.observed_at {
                if snapshot.observed_at <= held {
                    tracing::debug!(
                        held = %held,
                        incoming = %snapshot.observed_at,
                        "dropping stale observation"
                    );
                    return Err(TokenViewError::Stale {
                        held,
                        incoming: snapshot.observed_at,
                    });
                }
            }
        }

        let changed: BTreeSet<AccountId> = snapshot.accounts.keys().cloned().collect();
        for (id, account) in snapshot.accounts {
            state.accounts.insert(id, account);
        }
        state.params = Some(snapshot.params);
        state.observed_at = Some(snapshot.observed_at);
        drop(state);

        tracing::debug!(
            accounts = changed.len(),
            observed_at = %snapshot.observed_at,
            forced = mode == MergeMode::Forced,
            "merged snapshot"
        );

        // No receivers is fine; the UI may not be listening yet.
        let _ = self.event_tx.send(StoreEvent {
            changed,
            observed_at: snapshot.observed_at,
        });
        Ok(())
    }
}
