//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for the reconciliation and projection loops.
///
/// All intervals are externally supplied; defaults match the mirrored
/// dashboard's cadence (5 s balance poll, 1 s reward tick).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed-interval poll of the authoritative source while watching.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Local reward-projection tick. Never touches the network.
    #[serde(default = "default_projection_tick_secs")]
    pub projection_tick_secs: u64,

    /// Debounce window for commit notifications, so a burst of commits
    /// coalesces into a single refresh.
    #[serde(default = "default_commit_debounce_ms")]
    pub commit_debounce_ms: u64,

    /// Governance cap on the transfer fee rate.
    #[serde(default = "default_max_fee_basis_points")]
    pub max_fee_basis_points: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            projection_tick_secs: default_projection_tick_secs(),
            commit_debounce_ms: default_commit_debounce_ms(),
            max_fee_basis_points: default_max_fee_basis_points(),
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn projection_tick(&self) -> Duration {
        Duration::from_secs(self.projection_tick_secs.max(1))
    }

    pub fn commit_debounce(&self) -> Duration {
        Duration::from_millis(self.commit_debounce_ms)
    }
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_projection_tick_secs() -> u64 {
    1
}

fn default_commit_debounce_ms() -> u64 {
    250
}

fn default_max_fee_basis_points() -> u32 {
    1_000
}
