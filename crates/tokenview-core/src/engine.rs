//! Engine composition root.
//!
//! Wires the snapshot store, fee policy, reconciliation scheduler, mutation
//! executor, and reward projector together behind one handle. Data flows
//! one direction into the store: only the scheduler and the executor write
//! it, everything else reads.

use crate::config::EngineConfig;
use crate::error::TokenViewError;
use crate::executor::{MutationExecutor, MutationReport};
use crate::fee::FeePolicy;
use crate::projector::{RewardProjection, RewardProjector};
use crate::scheduler::{ReconciliationScheduler, RefreshReason};
use crate::source::AuthoritativeSource;
use crate::store::{MergeMode, SnapshotStore};
use crate::types::{Account, AccountId, Amount, GlobalParameters, Mutation};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

#[derive(Default)]
struct EngineTasks {
    reconcile: Option<JoinHandle<()>>,
    projection: Option<JoinHandle<()>>,
}

impl EngineTasks {
    fn abort_reconcile(&mut self) {
        if let Some(handle) = self.reconcile.take() {
            handle.abort();
        }
    }

    fn abort_projection(&mut self) {
        if let Some(handle) = self.projection.take() {
            handle.abort();
        }
    }
}

/// Client-side mirror of the authoritative token ledger.
pub struct TokenViewEngine {
    config: EngineConfig,
    source: Arc<dyn AuthoritativeSource>,
    store: Arc<SnapshotStore>,
    fee_policy: FeePolicy,
    executor: MutationExecutor,
    refresh_tx: broadcast::Sender<RefreshReason>,
    tasks: Mutex<EngineTasks>,
}

impl TokenViewEngine {
    pub fn new(source: Arc<dyn AuthoritativeSource>, config: EngineConfig) -> Self {
        let store = Arc::new(SnapshotStore::new());
        let (refresh_tx, _) = broadcast::channel(16);
        let executor = MutationExecutor::new(source.clone(), store.clone(), refresh_tx.clone());
        let fee_policy = FeePolicy::new(config.max_fee_basis_points);
        Self {
            config,
            source,
            store,
            fee_policy,
            executor,
            refresh_tx,
            tasks: Mutex::new(EngineTasks::default()),
        }
    }

    /// Shared handle to the snapshot store, for read-only consumers.
    pub fn store(&self) -> Arc<SnapshotStore> {
        self.store.clone()
    }

    pub fn fee_policy(&self) -> &FeePolicy {
        &self.fee_policy
    }

    /// Start reconciling the given account set.
    ///
    /// Replaces any previous watch. An empty set is an idle teardown:
    /// nothing is spawned and existing timers and subscriptions are
    /// released, the projection task included, since a projection for an
    /// unwatched account can never re-base.
    pub async fn watch(&self, accounts: BTreeSet<AccountId>) {
        let mut tasks = self.tasks.lock().await;
        tasks.abort_reconcile();

        if accounts.is_empty() {
            tasks.abort_projection();
            tracing::info!("watch set empty, engine idle");
            return;
        }

        let scheduler = ReconciliationScheduler::new(
            self.source.clone(),
            self.store.clone(),
            accounts,
            self.config.poll_interval(),
            self.config.commit_debounce(),
        );
        let forced_rx = self.refresh_tx.subscribe();
        tasks.reconcile = Some(tokio::spawn(scheduler.run(forced_rx)));
    }

    /// Project unclaimed reward for one account on the local tick.
    ///
    /// Replaces any previous selection. The receiver starts at
    /// `NeverClaimed` and follows the store as snapshots arrive.
    pub async fn select_account(&self, account: AccountId) -> watch::Receiver<RewardProjection> {
        let mut tasks = self.tasks.lock().await;
        tasks.abort_projection();

        let (projector, rx) = RewardProjector::new(
            self.store.clone(),
            account,
            self.config.projection_tick(),
        );
        tasks.projection = Some(tokio::spawn(projector.run()));
        rx
    }

    /// Cancel every periodic task and release their handles.
    pub async fn unwatch_all(&self) {
        let mut tasks = self.tasks.lock().await;
        tasks.abort_reconcile();
        tasks.abort_projection();
        tracing::info!("engine idle, all periodic tasks stopped");
    }

    pub async fn account(&self, id: &AccountId) -> Option<Account> {
        self.store.get(id).await
    }

    pub async fn params(&self) -> Option<GlobalParameters> {
        self.store.params().await
    }

    /// Current fee rate in basis points, from the latest observation.
    pub async fn current_fee(&self) -> Option<u32> {
        self.store
            .params()
            .await
            .map(|params| params.fee_rate_basis_points)
    }

    /// Submit a transfer and report its observed effects.
    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<MutationReport, TokenViewError> {
        self.executor
            .execute(Mutation::Transfer { from, to, amount })
            .await
    }

    /// Claim the accrued reward for an account.
    pub async fn claim_reward(&self, account: AccountId) -> Result<MutationReport, TokenViewError> {
        self.executor
            .execute(Mutation::ClaimReward { account })
            .await
    }

    /// Validate and submit a fee-rate change.
    ///
    /// Validation happens locally against the governance cap and the owner
    /// from the latest parameters (fetched fresh when the store is empty);
    /// commitment stays with the authoritative source.
    pub async fn set_fee(
        &self,
        requester: AccountId,
        basis_points: u32,
    ) -> Result<MutationReport, TokenViewError> {
        let owner = match self.store.params().await {
            Some(params) => params.owner,
            None => {
                let mut named = BTreeSet::new();
                named.insert(requester.clone());
                let snapshot = self.source.observe(&named).await?;
                let owner = snapshot.params.owner.clone();
                // Seed the cache while we have a fresh read; staleness is
                // impossible on an empty store but absorb it anyway.
                if let Err(e) = self.store.merge(snapshot, MergeMode::Guarded).await {
                    tracing::debug!(error = %e, "seed merge dropped");
                }
                owner
            }
        };

        let mutation = self
            .fee_policy
            .propose_fee_change(basis_points, &requester, &owner)?;
        self.executor.execute(mutation).await
    }
}
