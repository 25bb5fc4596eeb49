//! Multi-validator integration tests.
//!
//! The per-module unit tests drive a single `LockSet`, `RoundManager` or
//! `HeightManager` in isolation. These tests assemble several
//! `ConsensusManager`s and hand-route the messages each one emits,
//! mirroring what `popeye`'s network layer would otherwise do, to exercise
//! the properties and scenarios that only show up once more than one
//! validator is involved.

use consensus::{
    genesis_signing_lockset, BlockProposal, BlockProposalData, ConsensusConfig, ConsensusError,
    ConsensusManager, Evidence, LockSet, Message, Proposal, Ready, ReadyData, ValidatorSet, Vote,
    VoteData, VoteExt,
};
use mars::{Block, Executor, Runtime};
use std::time::{Duration, Instant};
use tev::Keypair;

fn fast_config() -> ConsensusConfig {
    ConsensusConfig { round_timeout: Duration::from_millis(10), ..ConsensusConfig::default() }
}

/// A set of independently-keyed `ConsensusManager`s sharing a validator
/// set, with a synchronous "everyone broadcasts, everyone online receives"
/// delivery model standing in for `popeye`.
struct Network {
    managers: Vec<ConsensusManager<Runtime>>,
    online: Vec<bool>,
}

impl Network {
    fn new(n: usize, config: ConsensusConfig) -> (Self, Vec<Keypair>) {
        let keys: Vec<Keypair> = (0..n).map(|_| Keypair::generate()).collect();
        let vs = ValidatorSet::new(keys.iter().map(|k| k.address()).collect());
        let genesis_hash = Runtime::new().head().hash();
        let managers = keys
            .iter()
            .map(|k| {
                let lockset = genesis_signing_lockset(genesis_hash, k);
                ConsensusManager::new(config.clone(), vs.clone(), k.clone(), Runtime::new(), lockset)
            })
            .collect();
        (Self { managers, online: vec![true; n] }, keys)
    }

    fn set_online(&mut self, index: usize, online: bool) {
        self.online[index] = online;
    }

    fn apply(manager: &mut ConsensusManager<Runtime>, message: Message) {
        match message {
            Message::Vote(v) => {
                let _ = manager.add_vote(v);
            }
            Message::NewBlockProposal(bp) => {
                let _ = manager.add_proposal(Proposal::Block(bp));
            }
            Message::VotingInstruction(vi) => {
                let _ = manager.add_proposal(Proposal::VotingInstruction(vi));
            }
            Message::Ready(r) => {
                let _ = manager.add_ready(r);
            }
            Message::Status { .. } | Message::Transactions { .. } => {}
            Message::GetBlockProposals { .. } | Message::BlockProposals { .. } => {}
        }
    }

    fn route(&mut self, from: usize, messages: Vec<Message>) {
        for message in messages {
            for i in 0..self.managers.len() {
                if i == from || !self.online[i] {
                    continue;
                }
                Self::apply(&mut self.managers[i], message.clone());
            }
        }
    }

    /// Run one round of `process()` across every online manager, routing
    /// whatever each one broadcasts. Returns every commit produced this
    /// tick, tagged by which manager produced it.
    fn tick(&mut self, now: Instant) -> Vec<(usize, Block, LockSet)> {
        let mut outs = Vec::new();
        let mut commits = Vec::new();
        for i in 0..self.managers.len() {
            if !self.online[i] {
                continue;
            }
            let out = self.managers[i].process(now).expect("process() must not fail in a healthy network");
            for (block, lockset) in out.commits {
                commits.push((i, block, lockset));
            }
            outs.push((i, out.messages));
        }
        for (i, messages) in outs {
            self.route(i, messages);
        }
        commits
    }

    fn run_until(&mut self, target_height: u64, max_ticks: usize) -> Vec<(usize, Block, LockSet)> {
        let mut now = Instant::now();
        let mut all_commits = Vec::new();
        for _ in 0..max_ticks {
            all_commits.extend(self.tick(now));
            let caught_up = (0..self.managers.len())
                .filter(|i| self.online[*i])
                .all(|i| self.managers[i].head().header.number >= target_height);
            if caught_up {
                return all_commits;
            }
            now += Duration::from_millis(50);
        }
        panic!("network did not reach height {target_height} within {max_ticks} ticks");
    }
}

mod boundary_behaviors {
    //! LockSet quorum classification at the edges named in spec §8:
    //! a single-validator chain, a 4-validator committee, and a
    //! 10-validator committee.

    use super::*;

    fn cast(height: u64, round: u32, hash: Option<[u8; 32]>, total_n: u64, voting: &[Keypair]) -> LockSet {
        let mut ls = LockSet::new(total_n);
        for k in voting {
            ls.add(Vote::sign(VoteData { height, round, block_hash: hash }, k), false).unwrap();
        }
        ls
    }

    #[test]
    fn n1_single_vote_is_instant_quorum() {
        let keys: Vec<_> = (0..1).map(|_| Keypair::generate()).collect();
        let ls = cast(1, 0, Some([1u8; 32]), 1, &keys);
        assert_eq!(ls.has_quorum(), Some([1u8; 32]));
        assert!(ls.has_quorum_possible().is_some());
        assert!(!ls.has_noquorum());
    }

    #[test]
    fn n4_three_matching_votes_is_quorum() {
        let keys: Vec<_> = (0..4).map(|_| Keypair::generate()).collect();
        let ls = cast(1, 0, Some([2u8; 32]), 4, &keys[..3]);
        assert_eq!(ls.has_quorum(), Some([2u8; 32]));
    }

    #[test]
    fn n4_two_plus_two_split_is_neither_quorum_nor_quorum_possible_per_hash() {
        let keys: Vec<_> = (0..4).map(|_| Keypair::generate()).collect();
        let hash_a = [3u8; 32];
        let hash_b = [4u8; 32];
        let mut ls = LockSet::new(4);
        for k in &keys[..2] {
            ls.add(Vote::sign(VoteData { height: 1, round: 0, block_hash: Some(hash_a) }, k), false).unwrap();
        }
        for k in &keys[2..] {
            ls.add(Vote::sign(VoteData { height: 1, round: 0, block_hash: Some(hash_b) }, k), false).unwrap();
        }
        assert_eq!(ls.has_quorum(), None);
        // Both hashes individually clear the >N/3 threshold (2*3=6 > 4),
        // so quorum_possible still names a winner even though it is a tie
        // the lockset's own ordering must break deterministically.
        assert!(ls.has_quorum_possible().is_some());
    }

    #[test]
    fn n4_three_nil_plus_one_block_is_noquorum_not_quorum_possible() {
        // A large nil minority must not hide a block candidate behind it:
        // the lone block vote is the only one that matters for
        // quorum_possible/noquorum, and 1 vote of 4 cannot reach >N/3.
        let keys: Vec<_> = (0..4).map(|_| Keypair::generate()).collect();
        let mut ls = LockSet::new(4);
        for k in &keys[..3] {
            ls.add(Vote::sign(VoteData { height: 1, round: 0, block_hash: None }, k), false).unwrap();
        }
        ls.add(Vote::sign(VoteData { height: 1, round: 0, block_hash: Some([5u8; 32]) }, &keys[3]), false).unwrap();
        assert_eq!(ls.has_quorum(), None);
        assert_eq!(ls.has_quorum_possible(), None);
        assert!(ls.has_noquorum());
    }

    #[test]
    fn n10_seven_matching_votes_is_quorum() {
        let keys: Vec<_> = (0..10).map(|_| Keypair::generate()).collect();
        let ls = cast(2, 0, Some([7u8; 32]), 10, &keys[..7]);
        assert_eq!(ls.has_quorum(), Some([7u8; 32]));
        assert!(!ls.has_noquorum());
    }

    #[test]
    fn n10_four_matching_plus_six_nil_is_quorum_possible_not_quorum() {
        let keys: Vec<_> = (0..10).map(|_| Keypair::generate()).collect();
        let hash = [8u8; 32];
        let mut ls = LockSet::new(10);
        for k in &keys[..4] {
            ls.add(Vote::sign(VoteData { height: 2, round: 0, block_hash: Some(hash) }, k), false).unwrap();
        }
        for k in &keys[4..] {
            ls.add(Vote::sign(VoteData { height: 2, round: 0, block_hash: None }, k), false).unwrap();
        }
        assert_eq!(ls.has_quorum(), None);
        assert_eq!(ls.has_quorum_possible(), Some(hash));
    }

    #[test]
    fn n10_three_matching_plus_seven_nil_is_noquorum() {
        let keys: Vec<_> = (0..10).map(|_| Keypair::generate()).collect();
        let hash = [9u8; 32];
        let mut ls = LockSet::new(10);
        for k in &keys[..3] {
            ls.add(Vote::sign(VoteData { height: 2, round: 0, block_hash: Some(hash) }, k), false).unwrap();
        }
        for k in &keys[3..] {
            ls.add(Vote::sign(VoteData { height: 2, round: 0, block_hash: None }, k), false).unwrap();
        }
        assert_eq!(ls.has_quorum(), None);
        assert_eq!(ls.has_quorum_possible(), None);
        assert!(ls.has_noquorum());
    }

    #[test]
    fn exactly_one_classification_holds_for_a_range_of_splits() {
        // Property from spec §8: for any valid lockset, exactly one of
        // has_quorum/has_quorum_possible/has_noquorum holds (quorum implies
        // quorum_possible, so "exactly one" is read as "the classifications
        // partition the outcome space", not that they're mutually exclusive
        // bits — quorum is a strictly stronger case of quorum_possible).
        let keys: Vec<_> = (0..10).map(|_| Keypair::generate()).collect();
        for matching in 0..=10 {
            let hash = [matching as u8; 32];
            let mut ls = LockSet::new(10);
            for k in &keys[..matching] {
                ls.add(Vote::sign(VoteData { height: 3, round: 0, block_hash: Some(hash) }, k), false).unwrap();
            }
            for k in &keys[matching..] {
                ls.add(Vote::sign(VoteData { height: 3, round: 0, block_hash: None }, k), false).unwrap();
            }
            if !ls.is_valid() {
                continue;
            }
            let quorum = ls.has_quorum().is_some();
            let quorum_possible = ls.has_quorum_possible().is_some();
            let noquorum = ls.has_noquorum();
            if quorum {
                assert!(quorum_possible, "{matching} matching: quorum must imply quorum_possible");
                assert!(!noquorum, "{matching} matching: quorum and noquorum cannot both hold");
            } else {
                assert_ne!(
                    quorum_possible, noquorum,
                    "{matching} matching: below quorum, exactly one of quorum_possible/noquorum must hold"
                );
            }
        }
    }
}

mod invariants {
    //! The remaining universal invariants from spec §8 that don't need a
    //! live multi-manager network: signature stability and deterministic
    //! tie-break.

    use super::*;

    #[test]
    fn signed_envelope_round_trips_through_the_wire_codec() {
        let keypair = Keypair::generate();
        let vote = Vote::sign(VoteData { height: 5, round: 1, block_hash: Some([1u8; 32]) }, &keypair);
        let message = Message::Vote(vote.clone());
        let encoded = message.encode();
        let decoded = Message::decode(&encoded).expect("round-trips");
        let Message::Vote(decoded_vote) = decoded else { panic!("wrong variant") };
        assert_eq!(decoded_vote.sender().unwrap(), vote.sender().unwrap());
        assert_eq!(decoded_vote.wire_hash(), vote.wire_hash());
        assert_eq!(decoded_vote.content_hash().unwrap(), vote.content_hash().unwrap());
    }

    #[test]
    fn tie_break_is_deterministic_across_identical_multisets() {
        let keys: Vec<_> = (0..6).map(|_| Keypair::generate()).collect();
        let hash_a = [0x11u8; 32];
        let hash_b = [0x22u8; 32];

        let build = || {
            let mut ls = LockSet::new(6);
            for k in &keys[..3] {
                ls.add(Vote::sign(VoteData { height: 1, round: 0, block_hash: Some(hash_a) }, k), false).unwrap();
            }
            for k in &keys[3..] {
                ls.add(Vote::sign(VoteData { height: 1, round: 0, block_hash: Some(hash_b) }, k), false).unwrap();
            }
            (ls.has_quorum(), ls.has_quorum_possible(), ls.has_noquorum())
        };

        // A tied 3/3 split always resolves the same way regardless of
        // insertion order or which keys happened to vote for which hash.
        assert_eq!(build(), build(), "identical vote multisets must classify identically every time");
    }

    #[test]
    fn a_round_never_accepts_two_distinct_votes_from_the_same_sender() {
        let key = Keypair::generate();
        let mut ls = LockSet::new(4);
        ls.add(Vote::sign(VoteData { height: 1, round: 0, block_hash: Some([1u8; 32]) }, &key), false).unwrap();
        let err = ls.add(Vote::sign(VoteData { height: 1, round: 0, block_hash: Some([2u8; 32]) }, &key), false);
        assert!(err.is_err(), "a second distinct vote from the same sender must be rejected");
        assert_eq!(ls.len(), 1);
    }
}

mod scenarios {
    //! The named multi-node walkthroughs from spec §8.

    use super::*;

    /// S1 — four validators, happy path at round 0: everyone proposes,
    /// votes and commits the same first block.
    #[test]
    fn s1_happy_path_commits_the_first_block() {
        let (mut net, _keys) = Network::new(4, fast_config());
        let commits = net.run_until(1, 50);

        for m in &net.managers {
            assert_eq!(m.head().header.number, 1);
        }
        let committed_hash = net.managers[0].head().hash();
        for m in &net.managers[1..] {
            assert_eq!(m.head().hash(), committed_hash, "all honest nodes must commit the same block");
        }

        let (_, _, lockset) = commits.iter().find(|(_, b, _)| b.header.number == 1).expect("height 1 was committed");
        assert_eq!(lockset.len(), 4, "the committing lockset must carry all four votes");
        assert_eq!(lockset.has_quorum(), Some(committed_hash));
    }

    /// S2 — ten validators, the proposer at (1, 0) is offline. The other
    /// nine time out to `VoteNil`, forming a no-quorum lockset; the
    /// proposer at (1, 1) builds a fresh `BlockProposal` carrying that
    /// no-quorum round_lockset, and the network commits at round 1.
    #[test]
    fn s2_failed_proposer_recovers_at_the_next_round() {
        let (mut net, keys) = Network::new(10, fast_config());
        let vs = ValidatorSet::new(keys.iter().map(|k| k.address()).collect());
        let disabled = vs.proposer_for(1, 0);
        let disabled_index = keys.iter().position(|k| k.address() == disabled).unwrap();
        net.set_online(disabled_index, false);

        let commits = net.run_until(1, 200);

        for (i, m) in net.managers.iter().enumerate() {
            if i == disabled_index {
                continue;
            }
            assert_eq!(m.head().header.number, 1, "node {i} failed to recover from the missing proposer");
        }

        let (_, _, lockset) =
            commits.iter().find(|(_, b, _)| b.header.number == 1).expect("height 1 was eventually committed");
        assert_eq!(lockset.hr().map(|(_, r)| r), Some(1), "must commit via round 1, not round 0");
    }

    /// S3 — four validators split 2/2 between a block and nil at round 0,
    /// forming `quorum_possible(B)` but not quorum. The round 1 proposer
    /// sends a `VotingInstruction` pointing at that lockset; every honest
    /// node adopts it as its vote target (the locking rule), so round 1
    /// reaches quorum on the same block even though round 0 never did.
    #[test]
    fn s3_quorum_possible_round_is_rescued_by_a_voting_instruction() {
        let (mut net, keys) = Network::new(4, fast_config());
        let vs = ValidatorSet::new(keys.iter().map(|k| k.address()).collect());

        // Every node independently witnessed the same round-0 split before
        // this test starts observing. Feeding the identical split to every
        // manager stands in for them having observed the same network
        // event (a real partition, or a proposal that only reached half the
        // committee before the round timed out). The crafted votes put
        // every manager's active round at 1 before `process()` ever runs,
        // so round 0's real propose step never happens; the block itself
        // has to be injected by hand so `commit_once` has a candidate to
        // find once round 1 reaches quorum on its hash.
        let proposer = vs.proposer_for(1, 0);
        let proposer_idx = keys.iter().position(|k| k.address() == proposer).unwrap();
        let candidate_block = net.managers[proposer_idx].executor.head_candidate();
        let target_hash = candidate_block.hash();
        let genesis_hash = Runtime::new().head().hash();
        let bp = BlockProposal::sign(
            BlockProposalData {
                height: 1,
                round: 0,
                block: candidate_block,
                signing_lockset: genesis_signing_lockset(genesis_hash, &keys[proposer_idx]),
                round_lockset: None,
            },
            &keys[proposer_idx],
        );

        for m in net.managers.iter_mut() {
            let _ = m.add_proposal(Proposal::Block(bp.clone()));
            for k in &keys[..2] {
                let vote = Vote::sign(VoteData { height: 1, round: 0, block_hash: Some(target_hash) }, k);
                let _ = m.add_vote(vote);
            }
            for k in &keys[2..] {
                let vote = Vote::sign(VoteData { height: 1, round: 0, block_hash: None }, k);
                let _ = m.add_vote(vote);
            }
        }

        let commits = net.run_until(1, 100);

        for m in &net.managers {
            assert_eq!(m.head().header.number, 1);
        }
        let (_, block, lockset) =
            commits.iter().find(|(_, b, _)| b.header.number == 1).expect("height 1 was committed");
        assert_eq!(block.header.number, 1);
        assert_eq!(lockset.hr().map(|(_, r)| r), Some(1), "must commit via round 1's VotingInstruction");
    }

    /// S4 — a 5-validator chain runs for a few heights with one validator
    /// offline the whole time; it then comes online, learns the missed
    /// heights' quorum locksets from gossiped votes, and catches up by
    /// replaying the recorded `BlockProposal`s (standing in for a real
    /// `GetBlockProposals`/`BlockProposals` round trip).
    #[test]
    fn s4_late_joiner_catches_up_via_synchronizer_style_replay() {
        let (mut net, _keys) = Network::new(5, fast_config());
        let late_joiner = 4;
        net.set_online(late_joiner, false);

        let mut votes_seen: Vec<Vote> = Vec::new();
        let mut proposals_seen: Vec<BlockProposal> = Vec::new();
        let mut now = Instant::now();
        for _ in 0..100 {
            for i in 0..net.managers.len() {
                if !net.online[i] {
                    continue;
                }
                let out = net.managers[i].process(now).unwrap();
                for message in &out.messages {
                    match message {
                        Message::Vote(v) => votes_seen.push(v.clone()),
                        Message::NewBlockProposal(bp) => proposals_seen.push(bp.clone()),
                        _ => {}
                    }
                }
                net.route(i, out.messages);
            }
            now += Duration::from_millis(50);
            if (0..net.managers.len()).filter(|i| *i != late_joiner).all(|i| net.managers[i].head().header.number >= 3)
            {
                break;
            }
        }
        for i in 0..net.managers.len() {
            if i == late_joiner {
                continue;
            }
            assert!(net.managers[i].head().header.number >= 3, "online validators must have progressed");
        }

        // Bring the late joiner online and replay everything it missed:
        // the votes give it enough to recognize a quorum exists at each
        // height, the proposals give it the actual blocks to commit.
        net.set_online(late_joiner, true);
        for vote in &votes_seen {
            let _ = net.managers[late_joiner].add_vote(vote.clone());
        }
        for height in 1..=3u64 {
            if let Some(bp) = proposals_seen.iter().find(|p| p.message.height == height) {
                let _ = net.managers[late_joiner].add_proposal(Proposal::Block(bp.clone()));
            }
            let _ = net.managers[late_joiner].process(now);
            now += Duration::from_millis(50);
        }

        assert!(
            net.managers[late_joiner].head().header.number >= 3,
            "late joiner must catch up to the rest of the committee"
        );
        assert_eq!(
            net.managers[late_joiner].head().hash(),
            net.managers[0].head().hash(),
            "catch-up must land on the same chain as everyone else"
        );
    }

    /// S5 — a crafted proposal whose quorum lockset signs a block that
    /// does not descend from our head surfaces as a fatal `ForkDetected`
    /// and halts `process()` outright (spec §7).
    #[test]
    fn s5_fork_detection_halts_the_loop() {
        let keys: Vec<_> = (0..4).map(|_| Keypair::generate()).collect();
        let vs = ValidatorSet::new(keys.iter().map(|k| k.address()).collect());
        let genesis_hash = Runtime::new().head().hash();
        let lockset0 = genesis_signing_lockset(genesis_hash, &keys[0]);
        let mut manager =
            ConsensusManager::new(fast_config(), vs.clone(), keys[0].clone(), Runtime::new(), lockset0);

        for k in &keys[1..] {
            let ready = Ready::sign(ReadyData { nonce: 0, current_lockset: LockSet::new(4) }, k);
            manager.add_ready(ready).unwrap();
        }
        assert!(manager.is_ready());

        let hash_a = [0xAAu8; 32];
        let hash_b = [0xBBu8; 32];

        // An honest-looking quorum for A at round 0...
        for k in &keys {
            let vote = Vote::sign(VoteData { height: 1, round: 0, block_hash: Some(hash_a) }, k);
            manager.add_vote(vote).unwrap();
        }
        // ...and a conflicting quorum for B at round 1. No honest node
        // following the locking rule produces this; it simulates a
        // Byzantine majority rewriting history.
        for k in &keys {
            let vote = Vote::sign(VoteData { height: 1, round: 1, block_hash: Some(hash_b) }, k);
            manager.add_vote(vote).unwrap();
        }

        // A block candidate must exist for `commit_once` to even look at
        // the height's quorum locksets; its own blockhash is irrelevant to
        // the fork check, only its `prevhash` linkage to our head matters.
        let mut block = Block::new(1, genesis_hash, [0u8; 32], vec![]);
        block.set_coinbase(keys[0].address());
        let bp_data = BlockProposalData {
            height: 1,
            round: 0,
            block,
            signing_lockset: LockSet::new(1),
            round_lockset: None,
        };
        let bp = BlockProposal::sign(bp_data, &keys[0]);
        manager.add_proposal(Proposal::Block(bp)).unwrap();

        let result = manager.process(Instant::now());
        match result {
            Err(ConsensusError::ForkDetected { height, .. }) => assert_eq!(height, 1),
            other => panic!("expected a fatal ForkDetected, got {other:?}"),
        }
        assert!(
            manager.evidence.iter().any(|e| matches!(e, Evidence::ForkDetected { height: 1, .. })),
            "the fork must also be recorded as evidence for operator inspection"
        );
    }

    /// S6 — a validator double-votes at the same `(height, round)`: each
    /// peer that observes both votes records `DoubleVoting` evidence, the
    /// protocol keeps going, and the faulty vote counts at most once
    /// toward quorum.
    #[test]
    fn s6_double_voting_is_recorded_and_counted_once() {
        let (mut net, keys) = Network::new(4, fast_config());
        let culprit = &keys[0];

        let first = Vote::sign(VoteData { height: 1, round: 0, block_hash: Some([1u8; 32]) }, culprit);
        let second = Vote::sign(VoteData { height: 1, round: 0, block_hash: Some([2u8; 32]) }, culprit);

        for m in net.managers.iter_mut() {
            assert!(m.add_vote(first.clone()).unwrap());
            assert!(!m.add_vote(second.clone()).unwrap(), "the double vote must not be counted as newly added");
        }

        for m in &net.managers {
            assert!(
                m.evidence.iter().any(|e| matches!(e, Evidence::DoubleVoting { .. })),
                "every node that saw both votes must record DoubleVoting evidence"
            );
        }

        // The protocol keeps running: the network still reaches height 1
        // using the other three honest validators' votes plus whichever of
        // the culprit's two votes arrived first.
        let _ = net.run_until(1, 50);
        for m in &net.managers {
            assert_eq!(m.head().header.number, 1);
        }
    }
}
