//! Lock sets: aggregation of votes for one `(height, round)`.
//!
//! A `LockSet` holds at most one vote per validator. Thresholds are computed
//! with exact integer arithmetic (`count * 3 > 2 * N`, never floating-point
//! fractions) so the boundary at exactly `2N/3` votes never flips due to
//! rounding. `has_quorum_possible` uses the strict inequality `count * 3 >
//! N`; `has_noquorum` uses the non-strict `count * 3 <= N` — the two must
//! partition every reachable vote count into either "still contestable" or
//! "provably dead", with no gap and no overlap. Both look past a leading
//! nil entry to the best actual block hash: nil has no quorum of its own
//! to reach, so it must never stand in for "no block can get there".

use crate::error::{ConsensusError, Result};
use crate::vote::{BlockHash, Vote, VoteExt};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockSet {
    pub num_eligible_votes: u64,
    votes: HashMap<Address, Vote>,
}

impl LockSet {
    pub fn new(num_eligible_votes: u64) -> Self {
        Self { num_eligible_votes, votes: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn votes(&self) -> impl Iterator<Item = &Vote> {
        self.votes.values()
    }

    /// The vote already on file for `sender`, if any. Used to recover
    /// the first half of a double-voting pair for evidence recording.
    pub fn get(&self, sender: &Address) -> Option<&Vote> {
        self.votes.get(sender)
    }

    /// The `(height, round)` this lockset is for, if it holds any votes.
    pub fn hr(&self) -> Option<(u64, u32)> {
        self.votes.values().next().map(|v| v.hr())
    }

    /// Add `vote` to the set.
    ///
    /// Returns `Ok(())` both when the vote is newly added and when it is an
    /// exact repeat of a vote already on file for that sender (idempotent,
    /// matching re-delivery of the same message over an unreliable
    /// network). `force_replace` lets the owning validator overwrite its own
    /// earlier vote in this round (used when re-entering `process()`);
    /// anyone else doing so is double voting.
    pub fn add(&mut self, vote: Vote, force_replace: bool) -> Result<()> {
        let sender = vote.sender().map_err(|_| ConsensusError::InvalidSignature {
            message_type: "Vote",
        })?;

        if let Some((h, r)) = self.hr() {
            if (h, r) != vote.hr() {
                return Err(ConsensusError::InvalidVote {
                    reason: format!(
                        "lockset is for ({h}, {r}), vote is for {:?}",
                        vote.hr()
                    ),
                });
            }
        }

        if let Some(existing) = self.votes.get(&sender) {
            if existing.block_hash() == vote.block_hash() {
                return Ok(());
            }
            if !force_replace {
                return Err(ConsensusError::DoubleVoting { validator: sender.to_string() });
            }
        }

        self.votes.insert(sender, vote);
        Ok(())
    }

    /// Enough votes, of any mix of block hashes, to be a meaningful
    /// quorum-grade aggregate. This is a precondition for every other query
    /// below; callers must check it before trusting `has_quorum` et al.
    pub fn is_valid(&self) -> bool {
        (self.votes.len() as u64) * 3 > 2 * self.num_eligible_votes && self.hr().is_some()
    }

    /// Votes grouped by block hash (`None` = nil), sorted by count
    /// descending, ties broken by hash descending (nil sorts last).
    fn blockhashes(&self) -> Vec<(Option<BlockHash>, usize)> {
        let mut counts: HashMap<Option<BlockHash>, usize> = HashMap::new();
        for vote in self.votes.values() {
            *counts.entry(vote.block_hash()).or_insert(0) += 1;
        }
        let mut entries: Vec<_> = counts.into_iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        entries
    }

    /// The block hash with strict supermajority (`> 2N/3`) agreement, if any.
    pub fn has_quorum(&self) -> Option<BlockHash> {
        debug_assert!(self.is_valid());
        let bhs = self.blockhashes();
        let (hash, count) = bhs.first()?;
        if hash.is_some() && (*count as u64) * 3 > 2 * self.num_eligible_votes {
            *hash
        } else {
            None
        }
    }

    /// The block hash that could still reach quorum (`> N/3`), if any.
    ///
    /// Looks at the leading *block* entry, not just the leading entry
    /// overall: nil has no quorum of its own to reach, so a large nil
    /// minority outranking every block by vote count must not hide a
    /// block that individually still clears the threshold.
    pub fn has_quorum_possible(&self) -> Option<BlockHash> {
        debug_assert!(self.is_valid());
        let bhs = self.blockhashes();
        let (hash, count) = bhs.into_iter().find(|(h, _)| h.is_some())?;
        if count as u64 * 3 > self.num_eligible_votes {
            hash
        } else {
            None
        }
    }

    /// True if no block hash can still reach quorum this round (`<= N/3`
    /// for the leading block entry, or no block has any votes at all).
    pub fn has_noquorum(&self) -> bool {
        debug_assert!(self.is_valid());
        let bhs = self.blockhashes();
        match bhs.into_iter().find(|(h, _)| h.is_some()) {
            None => true,
            Some((_, count)) => (count as u64) * 3 <= self.num_eligible_votes,
        }
    }

    /// Check every vote's sender is in `validators` and that this lockset
    /// was built against the same validator count (spec §4.3
    /// `validate_votes`).
    pub fn validate_membership(&self, validators: &crate::validator::ValidatorSet) -> Result<()> {
        if self.num_eligible_votes != validators.len() as u64 {
            return Err(ConsensusError::InvalidVote {
                reason: format!(
                    "lockset num_eligible_votes {} does not match validator set size {}",
                    self.num_eligible_votes,
                    validators.len()
                ),
            });
        }
        for vote in self.votes.values() {
            let sender = vote.sender().map_err(|_| ConsensusError::InvalidSignature {
                message_type: "Vote",
            })?;
            if !validators.contains(&sender) {
                return Err(ConsensusError::UnknownValidator { validator: sender.to_string() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::VoteData;
    use tev::Keypair;

    fn vote_for(height: u64, round: u32, hash: Option<BlockHash>, keypair: &Keypair) -> Vote {
        Vote::sign(VoteData { height, round, block_hash: hash }, keypair)
    }

    #[test]
    fn quorum_requires_strict_supermajority() {
        let mut ls = LockSet::new(4);
        let hash = [1u8; 32];
        let keys: Vec<_> = (0..3).map(|_| Keypair::generate()).collect();

        for k in &keys {
            ls.add(vote_for(1, 0, Some(hash), k), false).unwrap();
        }

        assert!(ls.is_valid());
        assert_eq!(ls.has_quorum(), Some(hash));
    }

    #[test]
    fn two_of_four_is_quorum_possible_not_quorum() {
        let mut ls = LockSet::new(4);
        let hash = [1u8; 32];
        let keys: Vec<_> = (0..3).map(|_| Keypair::generate()).collect();

        // 2 votes for hash, 1 nil -- not is_valid yet at 2, add one more.
        ls.add(vote_for(1, 0, Some(hash), &keys[0]), false).unwrap();
        ls.add(vote_for(1, 0, Some(hash), &keys[1]), false).unwrap();
        ls.add(vote_for(1, 0, None, &keys[2]), false).unwrap();

        assert!(ls.is_valid());
        assert_eq!(ls.has_quorum(), None);
        assert_eq!(ls.has_quorum_possible(), Some(hash));
        assert!(!ls.has_noquorum());
    }

    #[test]
    fn all_nil_is_noquorum() {
        let mut ls = LockSet::new(4);
        let keys: Vec<_> = (0..3).map(|_| Keypair::generate()).collect();
        for k in &keys {
            ls.add(vote_for(1, 0, None, k), false).unwrap();
        }

        assert!(ls.is_valid());
        assert_eq!(ls.has_quorum(), None);
        assert_eq!(ls.has_quorum_possible(), None);
        assert!(ls.has_noquorum());
    }

    #[test]
    fn double_voting_is_rejected_unless_forced() {
        let mut ls = LockSet::new(4);
        let key = Keypair::generate();
        ls.add(vote_for(1, 0, Some([1u8; 32]), &key), false).unwrap();

        let err = ls.add(vote_for(1, 0, Some([2u8; 32]), &key), false);
        assert!(matches!(err, Err(ConsensusError::DoubleVoting { .. })));

        assert!(ls.add(vote_for(1, 0, Some([2u8; 32]), &key), true).is_ok());
    }

    #[test]
    fn repeated_identical_vote_is_idempotent() {
        let mut ls = LockSet::new(4);
        let key = Keypair::generate();
        let v = vote_for(1, 0, Some([1u8; 32]), &key);
        ls.add(v.clone(), false).unwrap();
        assert!(ls.add(v, false).is_ok());
        assert_eq!(ls.len(), 1);
    }

    #[test]
    fn mismatched_height_round_is_rejected() {
        let mut ls = LockSet::new(4);
        let key = Keypair::generate();
        ls.add(vote_for(1, 0, Some([1u8; 32]), &key), false).unwrap();

        let other_key = Keypair::generate();
        let err = ls.add(vote_for(2, 0, Some([1u8; 32]), &other_key), false);
        assert!(matches!(err, Err(ConsensusError::InvalidVote { .. })));
    }
}
