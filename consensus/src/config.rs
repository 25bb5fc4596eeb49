//! Consensus engine configuration.
//!
//! A single struct passed in at construction (spec §9: "global mutable
//! state in tuning constants ... these are configuration, not globals").

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the consensus engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Base round timeout at round 0.
    #[serde(with = "humantime_serde")]
    pub round_timeout: Duration,

    /// Exponential backoff factor applied per round: `round_timeout *
    /// factor^round` (spec §4.4 `get_timeout`).
    pub round_timeout_factor: f64,

    /// Heights below this bootstrap threshold always allow empty-block
    /// proposals, so a fresh chain can make progress before user traffic
    /// arrives (spec §4.6 waiting-for-proposal gate).
    pub num_initial_blocks: u64,

    /// If set, proposers never wait for a pending transaction before
    /// proposing (spec §4.6).
    pub allow_empty_blocks: bool,

    /// How long to wait for a transaction before re-checking the
    /// waiting-for-proposal gate.
    #[serde(with = "humantime_serde")]
    pub transaction_timeout: Duration,

    /// Mempool backpressure: excess transactions are dropped at ingress.
    pub transaction_queue_size: usize,

    /// Max heights requested per `GetBlockProposals` batch.
    pub max_getproposals_count: usize,

    /// Max in-flight (requested, not yet received) sync heights.
    pub max_queued: usize,

    /// Sync request timeout before re-issuing.
    #[serde(with = "humantime_serde")]
    pub sync_timeout: Duration,

    /// Interval between `Ready` re-broadcasts during the startup handshake.
    #[serde(with = "humantime_serde")]
    pub ready_beacon_interval: Duration,

    /// Capacity of the bounded duplicate-suppression (content-hash) filter.
    pub duplicate_filter_capacity: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            round_timeout: Duration::from_secs(3),
            round_timeout_factor: 1.5,
            num_initial_blocks: 10,
            allow_empty_blocks: false,
            transaction_timeout: Duration::from_millis(500),
            transaction_queue_size: 1024,
            max_getproposals_count: 10,
            max_queued: 30,
            sync_timeout: Duration::from_secs(5),
            ready_beacon_interval: Duration::from_millis(500),
            duplicate_filter_capacity: 1024,
        }
    }
}

impl ConsensusConfig {
    /// The timeout to arm when entering `round` without an observed
    /// proposal: exponential backoff, `round_timeout * factor^round`.
    pub fn round_timeout_for(&self, round: u32) -> Duration {
        let factor = self.round_timeout_factor.powi(round as i32);
        Duration::from_secs_f64(self.round_timeout.as_secs_f64() * factor)
    }
}
