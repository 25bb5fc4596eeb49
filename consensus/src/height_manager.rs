//! `HeightManager` — the sparse `round -> RoundManager` arena for one
//! height (spec §4.5). Mirrors HydraChain's `HeightManager`, with the
//! dict-of-rounds replaced by a `BTreeMap` so "rounds sorted high to
//! low"/"rounds sorted low to high" are both plain iterator directions
//! instead of two different sort calls.

use crate::error::{ConsensusError, Result};
use crate::lockset::LockSet;
use crate::proposal::Proposal;
use crate::round_manager::RoundManager;
use crate::validator::ValidatorSet;
use crate::vote::{BlockHash, Vote, VoteExt};
use std::collections::BTreeMap;
use std::time::Instant;
use tev::Keypair;

pub struct HeightManager {
    pub height: u64,
    num_eligible_votes: u64,
    rounds: BTreeMap<u32, RoundManager>,
}

impl HeightManager {
    pub fn new(height: u64, num_eligible_votes: u64) -> Self {
        Self { height, num_eligible_votes, rounds: BTreeMap::new() }
    }

    /// The active round: one past the highest round with a valid
    /// lockset, or 0 if none has formed yet.
    pub fn round(&self) -> u32 {
        self.last_valid_lockset().map_or(0, |(r, _)| r + 1)
    }

    fn round_mut(&mut self, round: u32) -> &mut RoundManager {
        self.rounds.entry(round).or_insert_with(|| RoundManager::new(self.height, round, self.num_eligible_votes))
    }

    pub fn active_round_mut(&mut self) -> &mut RoundManager {
        let round = self.round();
        self.round_mut(round)
    }

    /// The highest lock anywhere in this height (spec §4.4 locking rule
    /// looks back across rounds, not just the current one).
    pub fn last_lock(&self) -> Option<&Vote> {
        self.rounds.values().rev().find_map(|r| r.lock.as_ref())
    }

    /// The last block proposal this node voted for (its lock matches the
    /// proposal's blockhash), most recent round first.
    pub fn last_voted_blockproposal(&self) -> Option<&Proposal> {
        self.rounds.values().rev().find_map(|r| match (&r.proposal, &r.lock) {
            (Some(p @ Proposal::Block(_)), Some(lock)) if p.blockhash() == lock.block_hash() => {
                Some(p)
            }
            _ => None,
        })
    }

    /// Highest round lockset that is `is_valid()`, if any.
    fn last_valid_lockset(&self) -> Option<(u32, &LockSet)> {
        self.rounds.iter().rev().find_map(|(r, rm)| rm.lockset.is_valid().then_some((*r, &rm.lockset)))
    }

    pub fn last_valid_lockset_ref(&self) -> Option<&LockSet> {
        self.last_valid_lockset().map(|(_, ls)| ls)
    }

    /// The (unique) quorum lockset for this height. Scans from round 0
    /// upward and asserts every quorum lockset found agrees on blockhash;
    /// disagreement is a fork (spec §4.5, §7).
    pub fn last_quorum_lockset(&self) -> Result<Option<&LockSet>> {
        let mut found: Option<&LockSet> = None;
        for rm in self.rounds.values() {
            if !rm.lockset.is_valid() {
                continue;
            }
            if let Some(hash) = rm.lockset.has_quorum() {
                if let Some(prev) = found {
                    let prev_hash = prev.has_quorum().expect("found implies has_quorum");
                    if prev_hash != hash {
                        return Err(ConsensusError::ForkDetected {
                            height: self.height,
                            existing: prev_hash,
                            conflicting: hash,
                        });
                    }
                }
                found = Some(&rm.lockset);
            }
        }
        Ok(found)
    }

    pub fn has_quorum(&self) -> Result<Option<BlockHash>> {
        Ok(self.last_quorum_lockset()?.and_then(|ls| ls.has_quorum()))
    }

    pub fn add_vote(&mut self, vote: Vote, force_replace: bool) -> Result<bool> {
        let round = vote.hr().1;
        self.round_mut(round).add_vote(vote, force_replace)
    }

    pub fn add_proposal(&mut self, proposal: Proposal) -> Result<()> {
        let (height, round) = proposal.height_round();
        if height != self.height {
            return Err(ConsensusError::InvalidProposal {
                reason: format!("proposal height {height} does not match HeightManager height {}", self.height),
            });
        }
        self.round_mut(round).add_proposal(proposal)
    }

    pub fn round_manager(&self, round: u32) -> Option<&RoundManager> {
        self.rounds.get(&round)
    }

    /// Run `propose()` on the active round, cloning the cross-round
    /// locksets it needs first since they may live in a different round
    /// than the one being mutated.
    #[allow(clippy::too_many_arguments)]
    pub fn propose_active_round(
        &mut self,
        is_proposer: bool,
        is_waiting_for_proposal: bool,
        signing_lockset: &LockSet,
        head_candidate: &mars::Block,
        validators: &ValidatorSet,
        keypair: &Keypair,
    ) -> Result<Option<Proposal>> {
        let prior_round_lockset = self.last_valid_lockset_ref().cloned();
        let round = self.round();
        self.round_mut(round).propose(
            is_proposer,
            is_waiting_for_proposal,
            signing_lockset,
            prior_round_lockset.as_ref(),
            head_candidate,
            validators,
            keypair,
        )
    }

    /// Run `vote()` on the active round, using the highest lock anywhere
    /// in this height (the locking rule looks back across rounds).
    pub fn vote_active_round(&mut self, now: Instant, keypair: &Keypair) -> Option<Vote> {
        let last_lock = self.last_lock().cloned();
        let round = self.round();
        self.round_mut(round).vote(last_lock.as_ref(), now, keypair)
    }

    /// Arm the active round's timeout if not already armed.
    pub fn arm_active_round_timeout(&mut self, now: Instant, delay: std::time::Duration) {
        let round = self.round();
        self.round_mut(round).arm_timeout(now, delay);
    }

    pub fn active_round_has_timed_out(&self, now: Instant) -> bool {
        self.rounds.get(&self.round()).map_or(false, |rm| rm.has_timed_out(now))
    }

    /// Collect `FailedToPropose` evidence for any round whose lockset
    /// just became a valid no-quorum aggregate without ever seeing a
    /// proposal, skipping rounds already reported (spec §9 open
    /// question: "at most once per (height, round, proposer)").
    pub fn failed_to_propose_evidence(
        &self,
        validators: &ValidatorSet,
        already_reported: &mut std::collections::HashSet<(u64, u32)>,
    ) -> Vec<crate::evidence::Evidence> {
        let mut out = Vec::new();
        for (round, rm) in &self.rounds {
            if already_reported.contains(&(self.height, *round)) {
                continue;
            }
            let proposer = validators.proposer_for(self.height, *round);
            if let Some(ev) = rm.failed_to_propose_evidence(proposer) {
                already_reported.insert((self.height, *round));
                out.push(ev);
            }
        }
        out
    }
}
