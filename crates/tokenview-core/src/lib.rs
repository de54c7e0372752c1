//! Client-side mirror of an authoritative token ledger.
//!
//! Keeps a locally cached view of account balances, the bounded transfer
//! fee, and time-based reward accrual consistent with a slow, asynchronous,
//! only-periodically-observable source, while continuously projecting
//! reward between observations and differencing fresh before/after reads to
//! report the effects of confirmed mutations.

#![deny(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fee;
pub mod projector;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod types;

pub use config::EngineConfig;
pub use engine::TokenViewEngine;
pub use error::TokenViewError;
pub use executor::{AccountEffect, MutationExecutor, MutationReport};
pub use fee::{compute_fee, FeePolicy, MAX_FEE_BASIS_POINTS};
pub use projector::{
    ElapsedBreakdown, ProjectionBaseline, RewardProjection, RewardProjector,
};
pub use scheduler::{ReconciliationScheduler, RefreshReason};
pub use source::{AuthoritativeSource, CommitNotice, MutationResolution};
pub use store::{MergeMode, SnapshotStore, StoreEvent};
pub use types::{
    Account, AccountId, Amount, BalanceDelta, GlobalParameters, Mutation, Snapshot,
    AMOUNT_DECIMALS, ONE_TOKEN,
};
