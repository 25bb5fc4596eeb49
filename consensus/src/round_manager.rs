//! `RoundManager` — the propose/vote decision for one `(height, round)`
//! (spec §4.4). Mirrors HydraChain's `RoundManager.propose`/`.vote`, but
//! cross-round/cross-height lookups (`last_valid_lockset`,
//! `last_committing_lockset`, `last_lock`) are passed in by the caller
//! instead of reached for through back-pointers, per the "arena keyed by
//! (height, round)" redesign note.

use crate::error::{ConsensusError, Result};
use crate::evidence::Evidence;
use crate::lockset::LockSet;
use crate::proposal::{build_block_proposal, build_voting_instruction, Proposal};
use crate::validator::ValidatorSet;
use crate::vote::{BlockHash, Vote, VoteData, VoteExt};
use std::time::{Duration, Instant};
use tev::Keypair;

pub struct RoundManager {
    pub height: u64,
    pub round: u32,
    pub lockset: LockSet,
    pub proposal: Option<Proposal>,
    pub lock: Option<Vote>,
    timeout_time: Option<Instant>,
}

impl RoundManager {
    pub fn new(height: u64, round: u32, num_eligible_votes: u64) -> Self {
        Self {
            height,
            round,
            lockset: LockSet::new(num_eligible_votes),
            proposal: None,
            lock: None,
            timeout_time: None,
        }
    }

    /// Arm the round timeout once, at `now + base * factor^round`. A
    /// second call (or a call after a proposal already arrived) is a
    /// no-op, matching `get_timeout`'s "only armed once per round".
    pub fn arm_timeout(&mut self, now: Instant, delay: Duration) {
        if self.timeout_time.is_some() || self.proposal.is_some() {
            return;
        }
        self.timeout_time = Some(now + delay);
    }

    pub fn has_timed_out(&self, now: Instant) -> bool {
        self.timeout_time.map_or(false, |t| now >= t)
    }

    /// Add an inbound vote. Returns `Ok(true)` if newly added, `Ok(false)`
    /// if an idempotent repeat.
    pub fn add_vote(&mut self, vote: Vote, force_replace: bool) -> Result<bool> {
        let before = self.lockset.len();
        self.lockset.add(vote, force_replace)?;
        Ok(self.lockset.len() != before)
    }

    /// `FailedToPropose` evidence iff this round's lockset just became a
    /// valid no-quorum aggregate and the proposer never proposed
    /// (spec §9 open question: recorded only while `self.proposal` is
    /// still `None`; the caller is responsible for not re-recording it).
    pub fn failed_to_propose_evidence(&self, proposer: alloy_primitives::Address) -> Option<Evidence> {
        if self.proposal.is_none() && self.lockset.is_valid() && self.lockset.has_noquorum() {
            Some(Evidence::FailedToPropose { height: self.height, round: self.round, proposer })
        } else {
            None
        }
    }

    pub fn add_proposal(&mut self, proposal: Proposal) -> Result<()> {
        if let Some(existing) = &self.proposal {
            let same = existing.blockhash() == proposal.blockhash();
            return if same {
                Ok(())
            } else {
                Err(ConsensusError::InvalidProposal {
                    reason: "a different proposal was already accepted this round".into(),
                })
            };
        }
        self.proposal = Some(proposal);
        Ok(())
    }

    /// Decide whether to propose, and build+sign the proposal if so
    /// (spec §4.4 `propose()`). `prior_round_lockset` is this height's
    /// highest valid lockset from an earlier round, if any (`None` at
    /// round 0 before any round here has formed one).
    #[allow(clippy::too_many_arguments)]
    pub fn propose(
        &mut self,
        is_proposer: bool,
        is_waiting_for_proposal: bool,
        signing_lockset: &LockSet,
        prior_round_lockset: Option<&LockSet>,
        head_candidate: &mars::Block,
        validators: &ValidatorSet,
        keypair: &Keypair,
    ) -> Result<Option<Proposal>> {
        if !is_waiting_for_proposal || !is_proposer {
            return Ok(None);
        }
        if self.proposal.is_some() {
            return Ok(None);
        }

        if let Some(rl) = prior_round_lockset {
            if rl.hr().map(|(h, _)| h) == Some(self.height) && rl.has_quorum().is_some() {
                return Ok(None);
            }
        }

        let no_quorum = self.round == 0 || prior_round_lockset.map_or(true, |rl| rl.has_noquorum());

        let proposal = if no_quorum {
            let round_lockset = if self.round > 0 { prior_round_lockset.cloned() } else { None };
            let bp = build_block_proposal(
                self.height,
                self.round,
                head_candidate.clone(),
                signing_lockset.clone(),
                round_lockset,
                validators,
                keypair,
            )?;
            Proposal::Block(bp)
        } else if let Some(rl) =
            prior_round_lockset.filter(|rl| rl.has_quorum_possible().is_some())
        {
            let vi = build_voting_instruction(self.height, self.round, rl.clone(), validators, keypair)?;
            Proposal::VotingInstruction(vi)
        } else {
            return Err(ConsensusError::InvalidProposal {
                reason: "round lockset is neither no_quorum nor quorum_possible".into(),
            });
        };

        self.proposal = Some(proposal.clone());
        Ok(Some(proposal))
    }

    /// Produce at most one vote per round (spec §4.4 `vote()`).
    /// `last_lock` is the highest lock anywhere in this height, across
    /// all rounds (the locking rule looks back past the current round).
    pub fn vote(&mut self, last_lock: Option<&Vote>, now: Instant, keypair: &Keypair) -> Option<Vote> {
        if self.lock.is_some() {
            return None;
        }

        let target: Option<BlockHash> = if let Some(proposal) = &self.proposal {
            match proposal {
                Proposal::VotingInstruction(vi) => vi.message.round_lockset.has_quorum_possible(),
                Proposal::Block(bp) => {
                    let locked_on_block = last_lock.map_or(false, |l| !l.is_nil());
                    if locked_on_block {
                        last_lock.and_then(|l| l.block_hash())
                    } else {
                        Some(bp.message.block.hash())
                    }
                }
            }
        } else if self.has_timed_out(now) {
            last_lock.and_then(|l| l.block_hash())
        } else {
            return None;
        };

        let vote = Vote::sign(VoteData { height: self.height, round: self.round, block_hash: target }, keypair);
        self.lock = Some(vote.clone());
        let _ = self.lockset.add(vote.clone(), true);
        Some(vote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::build_block_proposal;

    fn validators(keys: &[Keypair]) -> ValidatorSet {
        ValidatorSet::new(keys.iter().map(|k| k.address()).collect())
    }

    fn quorum_lockset(height: u64, round: u32, hash: BlockHash, keys: &[Keypair]) -> LockSet {
        let mut ls = LockSet::new(keys.len() as u64);
        for k in keys {
            ls.add(Vote::sign(VoteData { height, round, block_hash: Some(hash) }, k), false).unwrap();
        }
        ls
    }

    #[test]
    fn non_proposer_never_proposes() {
        let keys: Vec<_> = (0..4).map(|_| Keypair::generate()).collect();
        let vs = validators(&keys);
        let signing = quorum_lockset(0, 0, [9u8; 32], &keys);
        let block = mars::Block::new(1, [9u8; 32], [0u8; 32], vec![]);
        let mut rm = RoundManager::new(1, 0, 4);

        let result = rm.propose(false, true, &signing, None, &block, &vs, &keys[0]).unwrap();
        assert!(result.is_none());
        assert!(rm.proposal.is_none());
    }

    #[test]
    fn proposer_proposes_fresh_block_at_round_zero() {
        let keys: Vec<_> = (0..4).map(|_| Keypair::generate()).collect();
        let vs = validators(&keys);
        let prev_hash = [9u8; 32];
        let signing = quorum_lockset(0, 0, prev_hash, &keys);
        let block = mars::Block::new(1, prev_hash, [0u8; 32], vec![]);
        let mut rm = RoundManager::new(1, 0, 4);

        let proposer_addr = vs.proposer_for(1, 0);
        let proposer_key = keys.iter().find(|k| k.address() == proposer_addr).unwrap();

        let result = rm.propose(true, true, &signing, None, &block, &vs, proposer_key).unwrap();
        assert!(result.is_some());
        assert!(rm.proposal.is_some());

        // second call is a no-op (already proposed this round)
        let again = rm.propose(true, true, &signing, None, &block, &vs, proposer_key).unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn not_waiting_for_proposal_defers() {
        let keys: Vec<_> = (0..4).map(|_| Keypair::generate()).collect();
        let vs = validators(&keys);
        let signing = quorum_lockset(0, 0, [9u8; 32], &keys);
        let block = mars::Block::new(1, [9u8; 32], [0u8; 32], vec![]);
        let mut rm = RoundManager::new(1, 0, 4);
        let proposer_addr = vs.proposer_for(1, 0);
        let proposer_key = keys.iter().find(|k| k.address() == proposer_addr).unwrap();

        let result = rm.propose(true, false, &signing, None, &block, &vs, proposer_key).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn vote_without_proposal_or_timeout_defers() {
        let key = Keypair::generate();
        let mut rm = RoundManager::new(1, 0, 4);
        let v = rm.vote(None, Instant::now(), &key);
        assert!(v.is_none());
    }

    #[test]
    fn vote_on_timeout_with_no_lock_votes_nil() {
        let key = Keypair::generate();
        let mut rm = RoundManager::new(1, 0, 4);
        rm.arm_timeout(Instant::now() - Duration::from_secs(1), Duration::from_millis(1));
        let v = rm.vote(None, Instant::now(), &key).unwrap();
        assert!(v.is_nil());
    }

    #[test]
    fn vote_repeats_existing_lock_over_new_proposal() {
        let keys: Vec<_> = (0..4).map(|_| Keypair::generate()).collect();
        let vs = validators(&keys);
        let prev_hash = [9u8; 32];
        let signing = quorum_lockset(0, 0, prev_hash, &keys);
        let proposer_addr = vs.proposer_for(1, 0);
        let proposer_key = keys.iter().find(|k| k.address() == proposer_addr).unwrap();
        let block = mars::Block::new(1, prev_hash, [0u8; 32], vec![]);

        let bp = build_block_proposal(1, 0, block, signing, None, &vs, proposer_key).unwrap();
        let locked_hash = [42u8; 32];
        let last_lock =
            Vote::sign(VoteData { height: 1, round: 0, block_hash: Some(locked_hash) }, &keys[0]);

        let mut rm = RoundManager::new(1, 1, 4);
        rm.add_proposal(Proposal::Block(bp)).unwrap();
        let v = rm.vote(Some(&last_lock), Instant::now(), &keys[0]).unwrap();
        assert_eq!(v.block_hash(), Some(locked_hash));
    }
}
