//! Validator set.
//!
//! A fixed list of validator addresses, known out of band (genesis
//! configuration); no membership changes mid-protocol.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// The fixed set of validators eligible to vote and propose.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidatorSet {
    validators: Vec<Address>,
}

impl ValidatorSet {
    pub fn new(validators: Vec<Address>) -> Self {
        Self { validators }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.validators.contains(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.validators.iter()
    }

    /// The validator expected to propose at `(height, round)`.
    ///
    /// `V[hash(height, round) mod N]` (spec §3), matching HydraChain's
    /// `ConsensusContract.proposer(height, round)` — there `hash` is
    /// Python's object hash over `repr((height, round))`; here it's
    /// `keccak256` over the encoded pair, which is stable across processes
    /// (Python's `hash()` is salted per-run and would never agree between
    /// nodes).
    pub fn proposer_for(&self, height: u64, round: u32) -> Address {
        let digest = tev::hash::content_hash(&(height, round));
        let index = (u64::from_be_bytes(digest[..8].try_into().expect("8 bytes")) as usize) % self.validators.len();
        self.validators[index]
    }

    pub fn is_proposer(&self, address: &Address, height: u64, round: u32) -> bool {
        self.proposer_for(height, round) == *address
    }
}
