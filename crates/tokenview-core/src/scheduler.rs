//! Reconciliation scheduler: decides when the snapshot store is refreshed
//! from the authoritative source.
//!
//! Three triggers feed one serial loop — a fixed-interval poll, debounced
//! commit notifications, and forced post-mutation refreshes — so at most
//! one `observe` is ever in flight and overlapping triggers coalesce
//! instead of stacking queries.

use crate::error::TokenViewError;
use crate::source::AuthoritativeSource;
use crate::store::{MergeMode, SnapshotStore};
use crate::types::AccountId;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

/// Why a refresh ran. Retained for diagnostics only; every reason maps to
/// the same observe-and-merge, differing only in merge mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    Poll,
    Commit,
    PostMutation,
}

impl RefreshReason {
    pub fn name(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Commit => "commit",
            Self::PostMutation => "post_mutation",
        }
    }

    fn merge_mode(self) -> MergeMode {
        match self {
            // Post-mutation refreshes reflect ground truth right after a
            // known state transition and always win.
            Self::PostMutation => MergeMode::Forced,
            _ => MergeMode::Guarded,
        }
    }
}

/// Periodic, event-driven, and post-mutation refresh of the snapshot store.
pub struct ReconciliationScheduler {
    source: Arc<dyn AuthoritativeSource>,
    store: Arc<SnapshotStore>,
    accounts: BTreeSet<AccountId>,
    poll_interval: Duration,
    commit_debounce: Duration,
}

impl ReconciliationScheduler {
    pub fn new(
        source: Arc<dyn AuthoritativeSource>,
        store: Arc<SnapshotStore>,
        accounts: BTreeSet<AccountId>,
        poll_interval: Duration,
        commit_debounce: Duration,
    ) -> Self {
        Self {
            source,
            store,
            accounts,
            poll_interval,
            commit_debounce,
        }
    }

    /// Run until the forced-refresh bus closes or the task is aborted.
    ///
    /// The first poll tick fires immediately, so watching a fresh account
    /// set populates the store without waiting a full interval.
    pub async fn run(self, mut forced_rx: broadcast::Receiver<RefreshReason>) {
        let mut commits = self.source.subscribe_commits();
        let mut poll = interval(self.poll_interval);
        // Ticks missed while an observe is in flight coalesce into one.
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            accounts = self.accounts.len(),
            poll_secs = self.poll_interval.as_secs(),
            "reconciliation scheduler started"
        );

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.refresh(RefreshReason::Poll).await;
                }
                notice = commits.recv() => match notice {
                    Ok(notice) => {
                        // Let the burst accumulate, then drain it so N
                        // commits cause a single observe.
                        tokio::time::sleep(self.commit_debounce).await;
                        let mut coalesced = 0u64;
                        let mut latest = notice.sequence;
                        loop {
                            match commits.try_recv() {
                                Ok(extra) => {
                                    coalesced += 1;
                                    latest = extra.sequence;
                                }
                                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                                    coalesced += skipped;
                                }
                                Err(_) => break,
                            }
                        }
                        tracing::debug!(sequence = latest, coalesced, "commit-driven refresh");
                        self.refresh(RefreshReason::Commit).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "commit stream lagged, refreshing once");
                        self.refresh(RefreshReason::Commit).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("commit stream closed, scheduler stopping");
                        break;
                    }
                },
                forced = forced_rx.recv() => match forced {
                    Ok(reason) => {
                        // Coalesce any forced refreshes queued behind this one.
                        while matches!(forced_rx.try_recv(), Ok(_)) {}
                        self.refresh(reason).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        self.refresh(RefreshReason::PostMutation).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        tracing::info!("reconciliation scheduler stopped");
    }

    /// One observe-and-merge pass. Failures never corrupt the store: a
    /// failed observe merges nothing and the next trigger retries.
    async fn refresh(&self, reason: RefreshReason) {
        let snapshot = match self.source.observe(&self.accounts).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(reason = reason.name(), error = %e, "observe failed, will retry on next trigger");
                return;
            }
        };

        match self.store.merge(snapshot, reason.merge_mode()).await {
            Ok(()) => {}
            Err(TokenViewError::Stale { .. }) => {
                // Absorbed: an out-of-order read lost the race to a newer one.
                tracing::debug!(reason = reason.name(), "stale observation dropped");
            }
            Err(e) => {
                tracing::warn!(reason = reason.name(), error = %e, "merge failed");
            }
        }
    }
}
