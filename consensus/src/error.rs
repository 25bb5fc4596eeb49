//! Consensus error types.
//!
//! One variant per failure kind in spec §7; the mapping from kind to
//! recoverable/fatal action lives with the callers (most errors are
//! recorded as [`crate::evidence::Evidence`] and dropped, `ForkDetected`
//! halts the consensus loop).

use crate::vote::BlockHash;
use thiserror::Error;

/// Errors that can occur during consensus operations.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Malformed `(v, r, s)` or a public key that does not recover.
    #[error("invalid signature on {message_type}")]
    InvalidSignature { message_type: &'static str },

    /// An unsigned vote, or a vote whose `(height, round)` disagrees with
    /// the lockset it is being added to.
    #[error("invalid vote: {reason}")]
    InvalidVote { reason: String },

    /// Two distinct votes from the same sender at the same `(height, round)`.
    #[error("double voting by validator {validator}")]
    DoubleVoting { validator: String },

    /// Any `BlockProposal`/`VotingInstruction` construction rule (spec §4.3)
    /// failed.
    #[error("invalid proposal: {reason}")]
    InvalidProposal { reason: String },

    /// A vote or proposal's sender is not a member of the validator set
    /// it is being checked against.
    #[error("unknown validator: {validator}")]
    UnknownValidator { validator: String },

    /// A proposal arrived from someone other than `proposer(height, round)`.
    #[error("proposal from {got} but expected proposer {expected}")]
    WrongProposer { expected: String, got: String },

    /// The synchronizer's request/response cycle failed or timed out.
    #[error("sync error: {reason}")]
    Sync { reason: String },

    /// Two valid quorum locksets at the same height disagree on blockhash.
    /// Fatal: the consensus loop halts and operator intervention is
    /// required.
    #[error(
        "CRITICAL: fork detected at height {height}: {} vs {}",
        hex::encode(existing), hex::encode(conflicting)
    )]
    ForkDetected { height: u64, existing: BlockHash, conflicting: BlockHash },

    /// Persisted state failed to decode or a network/genesis id mismatch
    /// was found on reopen.
    #[error("internal consensus state corruption: {details}")]
    StateCorruption { details: String },
}

/// Result type alias for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;
