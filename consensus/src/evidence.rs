//! Protocol-failure evidence.
//!
//! Most consensus errors (spec §7) are not fatal: the offending message is
//! dropped and a record of what happened is appended to an in-memory,
//! append-only ledger for operational inspection. Evidence never alters
//! protocol flow — it is purely observational, except `ForkDetected`, which
//! is reported through [`crate::error::ConsensusError::ForkDetected`]
//! instead, since that one *does* halt the loop.

use crate::vote::{BlockHash, Vote};
use alloy_primitives::Address;

/// A record of a protocol-level fault observed from some validator.
#[derive(Clone, Debug)]
pub enum Evidence {
    /// A vote was rejected before it could be added to any lockset.
    InvalidVote { reason: String },

    /// The same sender produced two distinct votes at the same
    /// `(height, round)`. Both votes are kept for operator inspection.
    DoubleVoting { first: Vote, second: Vote },

    /// A `BlockProposal` or `VotingInstruction` failed a construction rule.
    InvalidProposal { height: u64, round: u32, reason: String },

    /// The round at `(height, round)` ended in `no_quorum` without the
    /// designated proposer ever broadcasting anything. Recorded at most
    /// once per `(height, round, proposer)` (spec §9 open question).
    FailedToPropose { height: u64, round: u32, proposer: Address },

    /// A quorum lockset referenced a block that does not descend from our
    /// head — logged alongside the fatal `ForkDetected` error that halts
    /// the loop.
    ForkDetected { height: u64, existing: BlockHash, conflicting: BlockHash },
}
