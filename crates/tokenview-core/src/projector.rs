//! Reward projection: a continuously advancing local estimate of unclaimed
//! reward between authoritative observations.
//!
//! The projection carries no authority. It extrapolates from the baseline
//! snapshot on a local tick and is discarded and rebuilt the moment the
//! snapshot store delivers a fresher observation for the watched account.

use crate::store::SnapshotStore;
use crate::types::{AccountId, Amount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::interval;

/// Elapsed time split for display, mirroring the dashboard's
/// days/hours/minutes/seconds readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElapsedBreakdown {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl ElapsedBreakdown {
    pub fn from_secs(total: u64) -> Self {
        Self {
            days: total / 86_400,
            hours: total % 86_400 / 3_600,
            minutes: total % 3_600 / 60,
            seconds: total % 60,
        }
    }
}

impl fmt::Display for ElapsedBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}d {}h {}m {}s",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

/// Locally projected reward state for one account.
///
/// `NeverClaimed` is a real state, not zero: an account that has never
/// claimed has no accrual baseline, which is different from an account
/// whose baseline was set this very second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RewardProjection {
    NeverClaimed,
    Accruing {
        elapsed_secs: u64,
        reward: Amount,
    },
}

impl RewardProjection {
    pub fn reward(&self) -> Option<Amount> {
        match self {
            Self::NeverClaimed => None,
            Self::Accruing { reward, .. } => Some(*reward),
        }
    }

    pub fn elapsed(&self) -> Option<ElapsedBreakdown> {
        match self {
            Self::NeverClaimed => None,
            Self::Accruing { elapsed_secs, .. } => Some(ElapsedBreakdown::from_secs(*elapsed_secs)),
        }
    }
}

/// The snapshot-derived inputs a projection extrapolates from.
///
/// The reward rate is pinned to the value observed in the same snapshot as
/// the claim time; a rate change on the ledger only takes effect here once
/// a fresher snapshot re-bases the projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionBaseline {
    pub account: AccountId,
    pub last_claim_time: Option<DateTime<Utc>>,
    pub reward_rate_per_second: Amount,
    pub observed_at: DateTime<Utc>,
}

impl ProjectionBaseline {
    pub fn project_at(&self, now: DateTime<Utc>) -> RewardProjection {
        let Some(claimed_at) = self.last_claim_time else {
            return RewardProjection::NeverClaimed;
        };
        let elapsed_secs = (now - claimed_at).num_seconds().max(0) as u64;
        RewardProjection::Accruing {
            elapsed_secs,
            reward: self.reward_rate_per_second.saturating_mul_secs(elapsed_secs),
        }
    }
}

/// Ticks a [`RewardProjection`] for one account on a fixed local interval
/// and publishes it over a watch channel.
pub struct RewardProjector {
    store: Arc<SnapshotStore>,
    account: AccountId,
    tick: Duration,
    projection_tx: watch::Sender<RewardProjection>,
}

impl RewardProjector {
    pub fn new(
        store: Arc<SnapshotStore>,
        account: AccountId,
        tick: Duration,
    ) -> (Self, watch::Receiver<RewardProjection>) {
        let (projection_tx, projection_rx) = watch::channel(RewardProjection::NeverClaimed);
        (
            Self {
                store,
                account,
                tick,
                projection_tx,
            },
            projection_rx,
        )
    }

    /// Run until every projection receiver is gone or the task is aborted.
    ///
    /// The tick is pure local extrapolation; the only awaits besides timers
    /// are snapshot-store reads when a fresher observation arrives.
    pub async fn run(self) {
        let mut events = self.store.subscribe();
        let mut baseline = self.rebase().await;
        let mut tick = interval(self.tick);

        tracing::info!(account = %self.account, "reward projector started");

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let projection = match &baseline {
                        Some(baseline) => baseline.project_at(Utc::now()),
                        None => RewardProjection::NeverClaimed,
                    };
                    if self.projection_tx.send(projection).is_err() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(event) if event.changed.contains(&self.account) => {
                        baseline = self.rebase().await;
                        let projection = match &baseline {
                            Some(baseline) => baseline.project_at(Utc::now()),
                            None => RewardProjection::NeverClaimed,
                        };
                        if self.projection_tx.send(projection).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "projector lagged behind store events, re-basing");
                        baseline = self.rebase().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        tracing::info!(account = %self.account, "reward projector stopped");
    }

    async fn rebase(&self) -> Option<ProjectionBaseline> {
        // One coherent read: claim time and rate must come from the same
        // held observation.
        let (account, params, observed_at) =
            self.store.account_with_params(&self.account).await?;
        Some(ProjectionBaseline {
            account: self.account.clone(),
            last_claim_time: account.last_claim_time,
            reward_rate_per_second: params.reward_rate_per_second,
            observed_at,
        })
    }
}
