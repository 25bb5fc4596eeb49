//! Votes.
//!
//! A vote is a signed `(height, round, block_hash)` triple; `block_hash ==
//! None` is a nil vote (a vote to not commit anything this round). Mirrors
//! HydraChain's `Vote`/`VoteBlock`/`VoteNil`, collapsed into one struct with
//! an `Option` rather than a reclassified subclass, since Rust has no
//! runtime reclassification.

use serde::{Deserialize, Serialize};
use tev::Signed;

pub type BlockHash = [u8; 32];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteData {
    pub height: u64,
    pub round: u32,
    pub block_hash: Option<BlockHash>,
}

/// A signed vote. `Vote::is_nil()` distinguishes a `VoteNil` from a
/// `VoteBlock` without a separate wire type.
pub type Vote = Signed<VoteData>;

pub trait VoteExt {
    fn hr(&self) -> (u64, u32);
    fn is_nil(&self) -> bool;
    fn block_hash(&self) -> Option<BlockHash>;
}

impl VoteExt for Vote {
    fn hr(&self) -> (u64, u32) {
        (self.message.height, self.message.round)
    }

    fn is_nil(&self) -> bool {
        self.message.block_hash.is_none()
    }

    fn block_hash(&self) -> Option<BlockHash> {
        self.message.block_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tev::Keypair;

    #[test]
    fn nil_vote_has_no_block_hash() {
        let keypair = Keypair::generate();
        let vote = Vote::sign(
            VoteData { height: 1, round: 0, block_hash: None },
            &keypair,
        );
        assert!(vote.is_nil());
        assert_eq!(vote.hr(), (1, 0));
    }

    #[test]
    fn block_vote_carries_hash() {
        let keypair = Keypair::generate();
        let hash = [7u8; 32];
        let vote = Vote::sign(
            VoteData { height: 1, round: 0, block_hash: Some(hash) },
            &keypair,
        );
        assert!(!vote.is_nil());
        assert_eq!(vote.block_hash(), Some(hash));
    }
}
