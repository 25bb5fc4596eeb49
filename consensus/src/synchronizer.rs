//! Synchronizer — height-gap back-fill (spec §4.8). Mirrors HydraChain's
//! `Synchronizer`, with the request-issuing side effect (`send_getblockproposals`)
//! turned into a plain return value the caller dispatches, per the
//! "narrow callbacks" redesign note: this module never touches the network.

use crate::config::ConsensusConfig;
use std::collections::HashSet;

#[derive(Default)]
pub struct Synchronizer {
    requested: HashSet<u64>,
    received: HashSet<u64>,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_syncing(&self) -> bool {
        !self.requested.is_empty()
    }

    /// Heights between `head + 1` and `max_height` inclusive, the range
    /// we know (from quorum votes) was decided but don't yet have the
    /// block for.
    pub fn missing(head: u64, max_height: Option<u64>) -> Vec<u64> {
        match max_height {
            Some(max) if max > head => (head + 1..=max).collect(),
            _ => Vec::new(),
        }
    }

    /// Batch up to `max_getproposals_count` not-yet-requested missing
    /// heights. Returns `None` if a batch is already outstanding, the
    /// receive queue is full, or nothing is missing.
    pub fn request(&mut self, head: u64, max_height: Option<u64>, config: &ConsensusConfig) -> Option<Vec<u64>> {
        if self.is_syncing() {
            return None;
        }
        if self.received.len() + config.max_getproposals_count >= config.max_queued {
            return None;
        }
        let missing = Self::missing(head, max_height);
        if missing.is_empty() {
            return None;
        }

        let mut batch = Vec::with_capacity(config.max_getproposals_count);
        for h in missing {
            if !self.received.contains(&h) && !self.requested.contains(&h) {
                batch.push(h);
                if batch.len() == config.max_getproposals_count {
                    break;
                }
            }
        }
        if batch.is_empty() {
            return None;
        }
        for h in &batch {
            self.requested.insert(*h);
        }
        Some(batch)
    }

    /// A requested batch timed out: release it so `request()` can
    /// re-issue it next time.
    pub fn on_timeout(&mut self, heights: &[u64]) {
        for h in heights {
            self.requested.remove(h);
        }
    }

    /// Record that proposals for these heights arrived.
    pub fn receive_blockproposals(&mut self, heights: impl IntoIterator<Item = u64>) {
        for h in heights {
            self.received.insert(h);
            self.requested.remove(&h);
        }
    }

    /// Drop anything below the current head; it is no longer missing.
    pub fn cleanup(&mut self, head: u64) {
        self.received.retain(|h| *h >= head);
        self.requested.retain(|h| *h >= head);
    }
}
