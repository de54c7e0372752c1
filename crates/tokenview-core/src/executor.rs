//! Mutation executor: submits a mutation and computes its observed effect.
//!
//! Deltas come from differencing two fresh authoritative observes taken
//! around the mutation, never from the possibly-stale cache. The observed
//! owner delta is authoritative over any locally computed fee estimate.

use crate::error::TokenViewError;
use crate::scheduler::RefreshReason;
use crate::source::{AuthoritativeSource, MutationResolution};
use crate::store::{MergeMode, SnapshotStore};
use crate::types::{AccountId, Amount, BalanceDelta, Mutation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

/// Observed before/after balances for one touched account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEffect {
    pub before: Amount,
    pub after: Amount,
    pub delta: BalanceDelta,
}

/// Confirmed outcome of a mutation, derived entirely from authoritative
/// before/after observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationReport {
    pub trace_id: String,
    pub mutation: Mutation,
    pub submitted_at: DateTime<Utc>,
    pub confirmed_at: DateTime<Utc>,
    pub effects: BTreeMap<AccountId, AccountEffect>,
    /// For transfers: the fee actually applied, read off the owner's
    /// observed delta.
    pub effective_fee: Option<Amount>,
}

impl MutationReport {
    pub fn effect(&self, id: &AccountId) -> Option<&AccountEffect> {
        self.effects.get(id)
    }
}

/// Submits mutations and enforces the one-in-flight-per-account rule.
pub struct MutationExecutor {
    source: Arc<dyn AuthoritativeSource>,
    store: Arc<SnapshotStore>,
    pending: Mutex<BTreeSet<AccountId>>,
    refresh_tx: broadcast::Sender<RefreshReason>,
}

impl MutationExecutor {
    pub fn new(
        source: Arc<dyn AuthoritativeSource>,
        store: Arc<SnapshotStore>,
        refresh_tx: broadcast::Sender<RefreshReason>,
    ) -> Self {
        Self {
            source,
            store,
            pending: Mutex::new(BTreeSet::new()),
            refresh_tx,
        }
    }

    /// Execute one mutation end to end.
    ///
    /// A second submission for the same originating account while one is
    /// outstanding fails locally with `Busy`; the caller retries after
    /// resolution. Whatever the outcome, a forced reconciliation refresh is
    /// requested afterwards so the cache converges.
    pub async fn execute(&self, mutation: Mutation) -> Result<MutationReport, TokenViewError> {
        let originator = mutation.originator().clone();
        {
            let mut pending = self.pending.lock().await;
            if !pending.insert(originator.clone()) {
                return Err(TokenViewError::Busy {
                    account: originator,
                });
            }
        }

        let result = self.execute_inner(&mutation).await;

        self.pending.lock().await.remove(&originator);
        // Best effort: no scheduler may be running while idle.
        let _ = self.refresh_tx.send(RefreshReason::PostMutation);
        result
    }

    async fn execute_inner(&self, mutation: &Mutation) -> Result<MutationReport, TokenViewError> {
        let trace_id = Uuid::new_v4().to_string();
        let touched = self.touched_accounts(mutation).await?;

        // Fresh authoritative read, not the cache: the local view may be
        // stale and would misreport deltas.
        let before = self.source.observe(&touched).await?;

        let submitted_at = Utc::now();
        tracing::info!(
            trace = %trace_id,
            kind = mutation.kind_name(),
            originator = %mutation.originator(),
            "submitting mutation"
        );

        match self.source.submit(mutation.clone()).await? {
            MutationResolution::Rejected { reason } => {
                tracing::warn!(trace = %trace_id, reason = %reason, "mutation rejected");
                Err(TokenViewError::Rejected(reason))
            }
            MutationResolution::Confirmed => {
                let after = self.source.observe(&touched).await?;
                let confirmed_at = Utc::now();

                // The after snapshot is ground truth immediately following a
                // known transition; it always resets the store baseline.
                if let Err(e) = self.store.merge(after.clone(), MergeMode::Forced).await {
                    tracing::warn!(trace = %trace_id, error = %e, "post-mutation merge failed");
                }

                let mut effects = BTreeMap::new();
                for id in &touched {
                    let before_balance = before.balance_of(id);
                    let after_balance = after.balance_of(id);
                    effects.insert(
                        id.clone(),
                        AccountEffect {
                            before: before_balance,
                            after: after_balance,
                            delta: after_balance.delta_since(before_balance),
                        },
                    );
                }

                let effective_fee = match mutation {
                    Mutation::Transfer { .. } => {
                        let owner = &after.params.owner;
                        let fee = effects
                            .get(owner)
                            .map(|effect| effect.delta.magnitude())
                            .unwrap_or(Amount::ZERO);
                        Some(fee)
                    }
                    _ => None,
                };

                tracing::info!(
                    trace = %trace_id,
                    kind = mutation.kind_name(),
                    accounts = effects.len(),
                    "mutation confirmed"
                );

                Ok(MutationReport {
                    trace_id,
                    mutation: mutation.clone(),
                    submitted_at,
                    confirmed_at,
                    effects,
                    effective_fee,
                })
            }
        }
    }

    /// Accounts whose balance the mutation can affect. Transfers also touch
    /// the owner, learned from the cached parameters or, failing that, a
    /// fresh observe of the named accounts.
    async fn touched_accounts(
        &self,
        mutation: &Mutation,
    ) -> Result<BTreeSet<AccountId>, TokenViewError> {
        if !matches!(mutation, Mutation::Transfer { .. }) {
            return Ok(mutation.named_accounts());
        }
        let owner = match self.store.params().await {
            Some(params) => params.owner,
            None => {
                let snapshot = self.source.observe(&mutation.named_accounts()).await?;
                snapshot.params.owner
            }
        };
        Ok(mutation.touched_accounts(&owner))
    }
}
