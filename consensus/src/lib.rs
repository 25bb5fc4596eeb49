//! Consensus crate for Unykorn L1.
//!
//! Implements a deterministic, round-based BFT consensus protocol modeled
//! on propose/vote rounds rather than the classic propose/prevote/precommit
//! split: a round either produces a `BlockProposal` (or a `VotingInstruction`
//! re-nominating an already-`quorum_possible` block) and a pass of votes, or
//! it times out into a no-quorum lockset that hands the next round a proof
//! it may safely move on.
//!
//! # Architecture Position
//!
//! ```text
//! POPEYE → TEV → CONSENSUS → MARS → TAR
//!                    ↑
//!              (this crate)
//! ```
//!
//! # Design Principles
//!
//! 1. **Consensus never mutates state** — MARS is the sole state authority,
//!    reached only through the [`mars::Executor`] trait.
//! 2. **Consensus never validates signatures directly** — TEV's `Signed<T>`
//!    envelope does recovery and verification; consensus only asks "does
//!    the recovered sender belong to this validator set".
//! 3. **Consensus never touches the network** — `process()` returns outbound
//!    [`wire::Message`]s for the caller to hand to POPEYE.
//! 4. **Consensus never persists data** — `process()` returns committed
//!    `(Block, LockSet)` pairs for the caller to hand to TAR.
//!
//! Consensus is a thin coordinator that decides WHICH block becomes
//! canonical; a height only becomes final once `> 2N/3` of the validator
//! set's voting power agrees on its hash (a quorum lockset).
//!
//! # Model
//!
//! State is kept as a lazy arena keyed by `(height, round)` rather than as a
//! chain of back-pointers: [`manager::ConsensusManager`] owns a sparse
//! `height -> `[`height_manager::HeightManager`] map, each of which owns a
//! sparse `round -> `[`round_manager::RoundManager`] map. Heights and rounds
//! below the current watermark are pruned by `cleanup()`.

pub mod config;
pub mod error;
pub mod evidence;
pub mod height_manager;
pub mod lockset;
pub mod manager;
pub mod proposal;
pub mod ready;
pub mod round_manager;
pub mod synchronizer;
pub mod validator;
pub mod vote;
pub mod wire;

pub use config::ConsensusConfig;
pub use error::{ConsensusError, Result};
pub use evidence::Evidence;
pub use height_manager::HeightManager;
pub use lockset::LockSet;
pub use manager::{genesis_signing_lockset, ConsensusManager, ProcessOutput};
pub use proposal::{
    build_block_proposal, build_voting_instruction, BlockProposal, BlockProposalData, Proposal,
    VotingInstruction, VotingInstructionData,
};
pub use ready::{Ready, ReadyData};
pub use round_manager::RoundManager;
pub use synchronizer::Synchronizer;
pub use validator::ValidatorSet;
pub use vote::{BlockHash, Vote, VoteData, VoteExt};
pub use wire::Message;
