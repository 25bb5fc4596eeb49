//! `BlockProposal` and `VotingInstruction` — the two things a proposer can
//! broadcast at the start of a round (spec §3, §4.3).
//!
//! Both are built through a constructor that validates every rule in
//! §4.3 before signing, so an invalid proposal can never exist signed —
//! the same discipline HydraChain's `BlockProposal.__init__` /
//! `VotingInstruction.__init__` apply.

use crate::error::{ConsensusError, Result};
use crate::lockset::LockSet;
use crate::validator::ValidatorSet;
use crate::vote::BlockHash;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tev::{Keypair, Signed};

/// A signed proposal for a fresh block at `(height, round)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockProposalData {
    pub height: u64,
    pub round: u32,
    pub block: mars::Block,
    /// Quorum lockset for `height - 1`: proof the previous block decided.
    pub signing_lockset: LockSet,
    /// No-quorum lockset for `(height, round - 1)`, required iff `round > 0`.
    pub round_lockset: Option<LockSet>,
}

pub type BlockProposal = Signed<BlockProposalData>;

/// A signed re-nomination of a `quorum_possible` blockhash, letting a
/// proposer avoid rebroadcasting the full block (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VotingInstructionData {
    pub height: u64,
    pub round: u32,
    pub round_lockset: LockSet,
}

pub type VotingInstruction = Signed<VotingInstructionData>;

/// Either kind of proposal a round can carry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Proposal {
    Block(BlockProposal),
    VotingInstruction(VotingInstruction),
}

impl Proposal {
    pub fn height_round(&self) -> (u64, u32) {
        match self {
            Proposal::Block(p) => (p.message.height, p.message.round),
            Proposal::VotingInstruction(p) => (p.message.height, p.message.round),
        }
    }

    pub fn sender(&self) -> Result<Address> {
        let result = match self {
            Proposal::Block(p) => p.sender(),
            Proposal::VotingInstruction(p) => p.sender(),
        };
        result.map_err(|_| ConsensusError::InvalidSignature { message_type: "Proposal" })
    }

    /// The blockhash a validator should vote for if it accepts this
    /// proposal as-is (spec §4.4 `vote()`).
    pub fn blockhash(&self) -> Option<BlockHash> {
        match self {
            Proposal::Block(p) => Some(p.message.block.hash()),
            Proposal::VotingInstruction(p) => p.message.round_lockset.has_quorum_possible(),
        }
    }

    /// The lockset whose votes prove this proposal's eligibility: the
    /// round_lockset if it carries one, else the signing_lockset (round
    /// 0's proof is the previous block's quorum, not a round lockset).
    pub fn harvest_lockset(&self) -> &LockSet {
        match self {
            Proposal::Block(p) => p.message.round_lockset.as_ref().unwrap_or(&p.message.signing_lockset),
            Proposal::VotingInstruction(p) => &p.message.round_lockset,
        }
    }
}

/// Build and sign a `BlockProposal`, validating every rule in spec §4.3.
///
/// `block`'s coinbase is overwritten with the signer's address before
/// hashing/signing (rule 6 is then true by construction).
pub fn build_block_proposal(
    height: u64,
    round: u32,
    mut block: mars::Block,
    signing_lockset: LockSet,
    round_lockset: Option<LockSet>,
    validators: &ValidatorSet,
    keypair: &Keypair,
) -> Result<BlockProposal> {
    if block.header.number != height {
        return Err(ConsensusError::InvalidProposal {
            reason: format!("block.header.number {} != height {height}", block.header.number),
        });
    }

    if let Some(rl) = &round_lockset {
        let rl_height = rl.hr().map(|(h, _)| h);
        if rl_height != Some(height) {
            return Err(ConsensusError::InvalidProposal {
                reason: format!("round_lockset height {rl_height:?} != {height}"),
            });
        }
    }

    if round > 0 {
        let rl = round_lockset.as_ref().ok_or_else(|| ConsensusError::InvalidProposal {
            reason: "round > 0 requires a round_lockset".into(),
        })?;
        let rl_round = rl.hr().map(|(_, r)| r);
        if rl_round != Some(round - 1) {
            return Err(ConsensusError::InvalidProposal {
                reason: format!("round_lockset round {rl_round:?} != {}", round - 1),
            });
        }
        if !rl.has_noquorum() {
            return Err(ConsensusError::InvalidProposal {
                reason: "round_lockset is not no_quorum".into(),
            });
        }
    } else if round_lockset.is_some() {
        return Err(ConsensusError::InvalidProposal {
            reason: "round 0 must not carry a round_lockset".into(),
        });
    }

    let signing_height = signing_lockset.hr().map(|(h, _)| h);
    if signing_height != Some(height.wrapping_sub(1)) {
        return Err(ConsensusError::InvalidProposal {
            reason: format!("signing_lockset height {signing_height:?} != {}", height - 1),
        });
    }
    if round == 0 && signing_lockset.has_quorum().is_none() {
        return Err(ConsensusError::InvalidProposal {
            reason: "round 0 requires a quorum signing_lockset".into(),
        });
    }

    let sender = keypair.address();
    if !validators.is_proposer(&sender, height, round) {
        return Err(ConsensusError::WrongProposer {
            expected: validators.proposer_for(height, round).to_string(),
            got: sender.to_string(),
        });
    }
    block.set_coinbase(sender);

    let data = BlockProposalData { height, round, block, signing_lockset, round_lockset };
    Ok(BlockProposal::sign(data, keypair))
}

/// Build and sign a `VotingInstruction`.
pub fn build_voting_instruction(
    height: u64,
    round: u32,
    round_lockset: LockSet,
    validators: &ValidatorSet,
    keypair: &Keypair,
) -> Result<VotingInstruction> {
    if round == 0 {
        return Err(ConsensusError::InvalidProposal {
            reason: "VotingInstruction requires round > 0".into(),
        });
    }
    if round_lockset.hr() != Some((height, round - 1)) {
        return Err(ConsensusError::InvalidProposal {
            reason: "round_lockset (height, round) must be (height, round - 1)".into(),
        });
    }
    if round_lockset.has_quorum().is_some() {
        return Err(ConsensusError::InvalidProposal {
            reason: "round_lockset already has quorum; should commit, not re-nominate".into(),
        });
    }
    if round_lockset.has_quorum_possible().is_none() {
        return Err(ConsensusError::InvalidProposal {
            reason: "round_lockset is not quorum_possible".into(),
        });
    }

    let sender = keypair.address();
    if !validators.is_proposer(&sender, height, round) {
        return Err(ConsensusError::WrongProposer {
            expected: validators.proposer_for(height, round).to_string(),
            got: sender.to_string(),
        });
    }

    let data = VotingInstructionData { height, round, round_lockset };
    Ok(VotingInstruction::sign(data, keypair))
}
