//! Blockchain state representation.
//!
//! The `State` struct represents the canonical state of the blockchain.
//! It is designed to be:
//! - Serializable (for persistence via TAR)
//! - Deterministic (same operations always produce same state)
//! - Clone-friendly (for state snapshots)

use alloy_primitives::{keccak256, Address};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The canonical blockchain state.
///
/// # Invariants
///
/// - `height` is monotonically increasing.
/// - `state_root` is derived deterministically from state data.
/// - All accounts have non-negative balances.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct State {
    /// Current block height.
    pub height: u64,

    /// State root hash (computed after each block).
    pub state_root: [u8; 32],

    /// Account balances.
    pub balances: HashMap<Address, u64>,

    /// Account nonces for replay protection.
    pub nonces: HashMap<Address, u64>,
}

impl State {
    /// Create a new genesis state.
    pub fn new() -> Self {
        Self {
            height: 0,
            state_root: [0u8; 32],
            balances: HashMap::new(),
            nonces: HashMap::new(),
        }
    }

    pub fn balance(&self, address: &Address) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.nonces.get(address).copied().unwrap_or(0)
    }

    pub fn increment_nonce(&mut self, address: &Address) {
        let current = self.nonce(address);
        self.nonces.insert(*address, current + 1);
    }

    pub fn set_balance(&mut self, address: &Address, balance: u64) {
        self.balances.insert(*address, balance);
    }

    /// Recompute `state_root` from the current account map.
    ///
    /// A real chain would use a Merkle-Patricia trie; a deterministic
    /// keccak over the sorted account list is enough to satisfy
    /// `Block.header.state_root` matching across honest nodes without
    /// depending on a trie implementation (out of scope, spec §1).
    pub fn compute_state_root(&mut self) {
        let mut entries: Vec<_> = self.balances.iter().collect();
        entries.sort_by_key(|(addr, _)| **addr);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.height.to_le_bytes());
        for (addr, balance) in entries {
            bytes.extend_from_slice(addr.as_slice());
            bytes.extend_from_slice(&balance.to_le_bytes());
            bytes.extend_from_slice(&self.nonce(addr).to_le_bytes());
        }
        self.state_root = keccak256(&bytes).0;
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}
