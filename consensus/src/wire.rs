//! Wire protocol (spec §4.9): the eight messages validators exchange.
//! Numeric command IDs are stable on the wire — do not renumber existing
//! variants when adding new ones.

use crate::lockset::LockSet;
use crate::proposal::{BlockProposal, VotingInstruction};
use crate::ready::Ready;
use crate::vote::Vote;
use mars::TransientBlock;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    /// 0
    Status { protocol_version: u32, network_id: u64, genesis_hash: [u8; 32], current_lockset: LockSet },
    /// 1 — opaque to consensus; forwarded to the mempool as-is.
    Transactions { raw: Vec<Vec<u8>> },
    /// 2 — ascending, unique heights.
    GetBlockProposals { heights: Vec<u64> },
    /// 3 — raw-encoded proposals, straight from the persistent store.
    BlockProposals { raw: Vec<Vec<u8>> },
    /// 4
    NewBlockProposal(BlockProposal),
    /// 5
    VotingInstruction(VotingInstruction),
    /// 6
    Vote(Vote),
    /// 7
    Ready(Ready),
}

impl Message {
    pub fn command_id(&self) -> u8 {
        match self {
            Message::Status { .. } => 0,
            Message::Transactions { .. } => 1,
            Message::GetBlockProposals { .. } => 2,
            Message::BlockProposals { .. } => 3,
            Message::NewBlockProposal(_) => 4,
            Message::VotingInstruction(_) => 5,
            Message::Vote(_) => 6,
            Message::Ready(_) => 7,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("wire message serialization cannot fail")
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        bincode::deserialize(bytes).ok()
    }
}

/// Decode an inbound `BlockProposals` entry into something `link_block`
/// can validate. Kept separate from `Message::decode` since this payload
/// is framed per-entry, not as a whole `Message`.
pub fn decode_transient(raw: &[u8]) -> TransientBlock {
    TransientBlock::new(raw.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_ids_are_stable() {
        assert_eq!(Message::Transactions { raw: vec![] }.command_id(), 1);
        assert_eq!(Message::GetBlockProposals { heights: vec![1, 2] }.command_id(), 2);
    }

    #[test]
    fn status_round_trips_through_bincode() {
        let msg = Message::Status {
            protocol_version: 1,
            network_id: 7,
            genesis_hash: [0u8; 32],
            current_lockset: LockSet::new(4),
        };
        let encoded = msg.encode();
        let decoded = Message::decode(&encoded).unwrap();
        assert_eq!(decoded.command_id(), 0);
    }
}
