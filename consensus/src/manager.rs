//! `ConsensusManager` — the main loop (spec §4.6), generic over the
//! [`mars::Executor`] it drives. Mirrors HydraChain's `ConsensusManager`,
//! but every network/storage side effect is a returned value instead of
//! a direct call: this module never touches a socket or a database,
//! matching the crate-layering in the expanded spec (`popeye`/`tar` are
//! driven by whoever owns a `ConsensusManager`, never depended on here).

use crate::config::ConsensusConfig;
use crate::error::{ConsensusError, Result};
use crate::evidence::Evidence;
use crate::height_manager::HeightManager;
use crate::lockset::LockSet;
use crate::proposal::{BlockProposal, Proposal};
use crate::ready::{Ready, ReadyData};
use crate::synchronizer::Synchronizer;
use crate::validator::ValidatorSet;
use crate::vote::{BlockHash, Vote, VoteData, VoteExt};
use crate::wire::Message;
use alloy_primitives::Address;
use mars::{Block, Executor};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Instant;
use tev::Keypair;
use tracing::{debug, error, info, warn};

/// A one-vote lockset seeding height 0, so height 1's `BlockProposal` has
/// a `signing_lockset` to point at (spec §3 genesis bootstrapping).
pub fn genesis_signing_lockset(genesis_hash: BlockHash, keypair: &Keypair) -> LockSet {
    let mut ls = LockSet::new(1);
    let vote = Vote::sign(VoteData { height: 0, round: 0, block_hash: Some(genesis_hash) }, keypair);
    ls.add(vote, false).expect("single self-signed vote always inserts cleanly");
    ls
}

/// Everything `process()` decided to do this pass, for the caller to
/// dispatch to the network and persistence layers.
#[derive(Default)]
pub struct ProcessOutput {
    pub messages: Vec<Message>,
    pub commits: Vec<(Block, LockSet)>,
}

struct DupFilter {
    capacity: usize,
    order: VecDeque<[u8; 32]>,
    seen: HashSet<[u8; 32]>,
}

impl DupFilter {
    fn new(capacity: usize) -> Self {
        Self { capacity, order: VecDeque::new(), seen: HashSet::new() }
    }

    /// Returns `true` if `hash` had not been seen before (and is now
    /// recorded); `false` if it is a repeat.
    fn insert(&mut self, hash: [u8; 32]) -> bool {
        if !self.seen.insert(hash) {
            return false;
        }
        self.order.push_back(hash);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }
}

pub struct ConsensusManager<E: Executor> {
    pub config: ConsensusConfig,
    pub validators: ValidatorSet,
    keypair: Keypair,
    pub executor: E,
    heights: BTreeMap<u64, HeightManager>,
    block_candidates: HashMap<BlockHash, BlockProposal>,
    ready_validators: HashSet<Address>,
    ready_nonce: u64,
    pub evidence: Vec<Evidence>,
    failed_propose_reported: HashSet<(u64, u32)>,
    dup_filter: DupFilter,
    synchronizer: Synchronizer,
}

impl<E: Executor> ConsensusManager<E> {
    pub fn new(
        config: ConsensusConfig,
        validators: ValidatorSet,
        keypair: Keypair,
        executor: E,
        genesis_signing_lockset: LockSet,
    ) -> Self {
        let dup_filter = DupFilter::new(config.duplicate_filter_capacity);
        let mut manager = Self {
            heights: BTreeMap::new(),
            block_candidates: HashMap::new(),
            ready_validators: HashSet::from([keypair.address()]),
            ready_nonce: 0,
            evidence: Vec::new(),
            failed_propose_reported: HashSet::new(),
            dup_filter,
            synchronizer: Synchronizer::new(),
            config,
            validators,
            keypair,
            executor,
        };
        // Genesis is trivially agreed out of band, not voted on by the real
        // validator set: seed height 0 with its own one-validator arena so
        // `genesis_signing_lockset`'s single vote reaches quorum on the spot,
        // instead of routing it through `add_vote` (which would judge it
        // against `validators.len()` and never reach quorum with one voter).
        let mut genesis_height = HeightManager::new(0, 1);
        for vote in genesis_signing_lockset.votes().cloned().collect::<Vec<_>>() {
            let _ = genesis_height.add_vote(vote, false);
        }
        manager.heights.insert(0, genesis_height);
        manager
    }

    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    pub fn head(&self) -> Block {
        self.executor.head()
    }

    pub fn height(&self) -> u64 {
        self.head().header.number + 1
    }

    fn height_mut(&mut self, height: u64) -> &mut HeightManager {
        let num_eligible_votes = self.validators.len() as u64;
        self.heights.entry(height).or_insert_with(|| HeightManager::new(height, num_eligible_votes))
    }

    pub fn is_ready(&self) -> bool {
        (self.ready_validators.len() as u64) * 3 > (self.validators.len() as u64) * 2
    }

    fn send_ready(&mut self) -> Message {
        let height = self.height();
        let lockset = self
            .heights
            .get(&height)
            .and_then(|hm| hm.round_manager(hm.round()))
            .map(|rm| rm.lockset.clone())
            .unwrap_or_else(|| LockSet::new(self.validators.len() as u64));
        let ready = Ready::sign(ReadyData { nonce: self.ready_nonce, current_lockset: lockset }, &self.keypair);
        self.ready_nonce += 1;
        Message::Ready(ready)
    }

    /// Record an inbound `Ready` beacon. Returns a fresh beacon to
    /// broadcast back if we are still not ready ourselves.
    pub fn add_ready(&mut self, ready: Ready) -> Result<Option<Message>> {
        let sender = ready.sender().map_err(|_| ConsensusError::InvalidSignature { message_type: "Ready" })?;
        if !self.validators.contains(&sender) {
            return Err(ConsensusError::UnknownValidator { validator: sender.to_string() });
        }
        let was_ready = self.is_ready();
        self.ready_validators.insert(sender);
        if self.is_ready() {
            if !was_ready {
                info!(seen = self.ready_validators.len(), total = self.validators.len(), "readiness quorum reached");
            }
            Ok(None)
        } else {
            Ok(Some(self.send_ready()))
        }
    }

    /// Add a vote, dispatching to whichever height it targets. Dropped
    /// (as [`Evidence`]) rather than propagated for any non-fatal error.
    pub fn add_vote(&mut self, vote: Vote) -> Result<bool> {
        let sender = match vote.sender() {
            Ok(s) => s,
            Err(_) => {
                self.evidence.push(Evidence::InvalidVote { reason: "signature does not recover".into() });
                return Ok(false);
            }
        };
        if !self.validators.contains(&sender) {
            self.evidence.push(Evidence::InvalidVote { reason: format!("unknown validator {sender}") });
            return Ok(false);
        }
        self.ready_validators.insert(sender);
        let is_own_vote = sender == self.keypair.address();
        let (height, round) = vote.hr();

        let existing = self
            .heights
            .get(&height)
            .and_then(|hm| hm.round_manager(round))
            .and_then(|rm| rm.lockset.get(&sender))
            .cloned();

        match self.height_mut(height).add_vote(vote.clone(), is_own_vote) {
            Ok(added) => {
                let evidence =
                    self.height_mut(height).failed_to_propose_evidence(&self.validators, &mut self.failed_propose_reported);
                self.evidence.extend(evidence);
                Ok(added)
            }
            Err(ConsensusError::DoubleVoting { .. }) => {
                warn!(%sender, height, round, "double voting detected");
                if let Some(first) = existing {
                    self.evidence.push(Evidence::DoubleVoting { first, second: vote });
                }
                Ok(false)
            }
            Err(ConsensusError::InvalidVote { reason }) => {
                warn!(%sender, height, round, %reason, "rejected vote");
                self.evidence.push(Evidence::InvalidVote { reason });
                Ok(false)
            }
            Err(other) => Err(other),
        }
    }

    /// Add an inbound proposal after validating it against the
    /// structural rules of spec §4.3 and our own chain head.
    pub fn add_proposal(&mut self, proposal: Proposal) -> Result<bool> {
        let (height, round) = proposal.height_round();
        if height < self.height() {
            return Ok(false);
        }

        let sender = proposal.sender()?;
        if !self.validators.contains(&sender) {
            warn!(%sender, height, round, "proposal from non-validator");
            self.evidence.push(Evidence::InvalidProposal {
                height,
                round,
                reason: "sender is not a validator".into(),
            });
            return Ok(false);
        }
        self.ready_validators.insert(sender);

        for vote in proposal.harvest_lockset().votes().cloned().collect::<Vec<_>>() {
            self.add_vote(vote)?;
        }

        if let Proposal::Block(bp) = &proposal {
            if bp.message.block.header.number != height {
                self.evidence.push(Evidence::InvalidProposal {
                    height,
                    round,
                    reason: "block number does not match proposal height".into(),
                });
                return Ok(false);
            }
            if height > self.height() {
                // from the future; cannot validate linkage against our head yet
                return Ok(false);
            }
            self.block_candidates.insert(bp.message.block.hash(), bp.clone());
        }

        self.height_mut(height).add_proposal(proposal)?;
        Ok(true)
    }

    /// Try to commit exactly one candidate whose parent is our current
    /// head and whose height has reached quorum on it.
    fn commit_once(&mut self) -> Result<Option<(Block, LockSet)>> {
        let head = self.head();
        let candidate_hash = self
            .block_candidates
            .values()
            .find(|p| p.message.block.header.prevhash == head.hash())
            .map(|p| p.message.block.hash());

        let Some(hash) = candidate_hash else { return Ok(None) };
        let proposal = self.block_candidates.get(&hash).expect("just looked up").clone();

        let Some(hm) = self.heights.get(&proposal.message.height) else { return Ok(None) };
        let quorum_hash: Option<BlockHash> = match hm.last_quorum_lockset() {
            Ok(ls) => ls.and_then(|ls| ls.has_quorum()),
            Err(ConsensusError::ForkDetected { height, existing, conflicting }) => {
                error!(height, "fork detected: two conflicting quorum locksets at the same height");
                self.evidence.push(Evidence::ForkDetected { height, existing, conflicting });
                return Err(ConsensusError::ForkDetected { height, existing, conflicting });
            }
            Err(e) => return Err(e),
        };
        if quorum_hash != Some(hash) {
            return Ok(None);
        }
        let lockset =
            self.heights[&proposal.message.height].last_quorum_lockset()?.expect("quorum_hash implies Some").clone();

        if !self.executor.commit_block(&proposal.message.block) {
            return Ok(None);
        }
        self.block_candidates.remove(&hash);
        info!(height = proposal.message.height, hash = %hex::encode(hash), "committed block");
        Ok(Some((proposal.message.block, lockset)))
    }

    fn is_waiting_for_proposal(&self) -> bool {
        self.config.allow_empty_blocks
            || self.executor.pending_transaction_count() > 0
            || self.height() <= self.config.num_initial_blocks
    }

    fn cleanup(&mut self) {
        let head_number = self.head().header.number;
        self.block_candidates.retain(|_, p| p.message.height > head_number);
        self.heights.retain(|h, _| *h >= head_number);
        self.synchronizer.cleanup(head_number);
    }

    /// The highest height at which any HeightManager has a quorum
    /// lockset: we know a block was decided there even if we don't have
    /// it yet (spec §4.8).
    fn max_known_height(&self) -> Option<u64> {
        self.heights.iter().filter_map(|(h, hm)| hm.last_quorum_lockset().ok().flatten().map(|_| *h)).max()
    }

    /// The signing_lockset a fresh proposal at `height` would carry:
    /// the previous height's quorum lockset. `None` means we cannot
    /// propose here yet.
    fn signing_lockset_for(&self, height: u64) -> Option<LockSet> {
        if height == 0 {
            return None;
        }
        self.heights.get(&(height - 1)).and_then(|hm| hm.last_quorum_lockset().ok().flatten()).cloned()
    }

    fn message_for_proposal(proposal: &Proposal) -> Message {
        match proposal {
            Proposal::Block(bp) => Message::NewBlockProposal(bp.clone()),
            Proposal::VotingInstruction(vi) => Message::VotingInstruction(vi.clone()),
        }
    }

    /// Dedup key for an outbound message (spec §4.9): the content hash of
    /// the signed payload it carries, not a hash of the wrapper `Message`
    /// enum — the wrapper also carries `v, r, s`, so hashing it directly
    /// would key the filter on the signature instead of the message, and
    /// two honest re-broadcasts of the very same vote would never collide.
    fn dedup_key(message: &Message) -> Option<[u8; 32]> {
        match message {
            Message::NewBlockProposal(bp) => bp.content_hash().ok(),
            Message::VotingInstruction(vi) => vi.content_hash().ok(),
            Message::Vote(v) => v.content_hash().ok(),
            Message::Ready(r) => r.content_hash().ok(),
            Message::Status { .. }
            | Message::Transactions { .. }
            | Message::GetBlockProposals { .. }
            | Message::BlockProposals { .. } => Some(tev::hash::content_hash(message)),
        }
    }

    fn broadcast(&mut self, out: &mut ProcessOutput, message: Message) {
        let Some(hash) = Self::dedup_key(&message) else {
            warn!("dropping outbound message whose signature does not recover");
            return;
        };
        if self.dup_filter.insert(hash) {
            out.messages.push(message);
        }
    }

    /// Run one pass of the main loop (spec §4.6). Idempotent and safe to
    /// call repeatedly; a typical driver calls this once per inbound
    /// event (message, timeout, new transaction).
    pub fn process(&mut self, now: Instant) -> Result<ProcessOutput> {
        let mut out = ProcessOutput::default();

        if !self.is_ready() {
            let ready = self.send_ready();
            out.messages.push(ready);
            return Ok(out);
        }

        loop {
            while let Some((block, lockset)) = self.commit_once()? {
                out.commits.push((block, lockset));
            }

            let height = self.height();
            let address = self.keypair.address();
            let round = self.height_mut(height).round();
            let is_proposer = self.validators.is_proposer(&address, height, round);
            let is_waiting = self.is_waiting_for_proposal();
            let timeout = self.config.round_timeout_for(round);
            self.height_mut(height).arm_active_round_timeout(now, timeout);

            if let Some(signing_lockset) = self.signing_lockset_for(height) {
                let head_candidate = self.executor.head_candidate();
                let validators = self.validators.clone();
                let keypair = self.keypair.clone();
                let proposed = self.height_mut(height).propose_active_round(
                    is_proposer,
                    is_waiting,
                    &signing_lockset,
                    &head_candidate,
                    &validators,
                    &keypair,
                )?;
                if let Some(p) = proposed {
                    debug!(height, round, "proposing");
                    if let Proposal::Block(bp) = &p {
                        self.block_candidates.insert(bp.message.block.hash(), bp.clone());
                    }
                    let message = Self::message_for_proposal(&p);
                    self.broadcast(&mut out, message);
                }
            }

            let keypair = self.keypair.clone();
            if let Some(vote) = self.height_mut(height).vote_active_round(now, &keypair) {
                debug!(height, round, block_hash = ?vote.message.block_hash, "voting");
                self.broadcast(&mut out, Message::Vote(vote));
            }

            let mut committed_again = false;
            while let Some((block, lockset)) = self.commit_once()? {
                out.commits.push((block, lockset));
                committed_again = true;
            }
            if committed_again {
                continue;
            }
            break;
        }

        self.cleanup();

        let head_number = self.head().header.number;
        if let Some(batch) = self.synchronizer.request(head_number, self.max_known_height(), &self.config) {
            out.messages.push(Message::GetBlockProposals { heights: batch });
        }

        Ok(out)
    }

    /// Record that block proposals for these heights arrived, releasing
    /// them from the synchronizer's backlog (spec §4.8) so `process()`
    /// won't consider them still in flight.
    pub fn note_blockproposals_received(&mut self, heights: impl IntoIterator<Item = u64>) {
        self.synchronizer.receive_blockproposals(heights);
    }

    /// Release a previously requested sync batch that timed out without a
    /// reply, so the next `process()` call can re-issue it.
    pub fn note_sync_timeout(&mut self, heights: &[u64]) {
        self.synchronizer.on_timeout(heights);
    }
}
