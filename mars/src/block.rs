//! Block types and validation.
//!
//! Blocks are ordered collections of transactions at a specific height.
//! They form the immutable chain of state transitions. The header carries
//! everything the consensus layer needs to validate a proposal
//! (`number`, `prevhash`, `coinbase`) without reaching into the body.

use crate::tx::Transaction;
use alloy_primitives::{keccak256, Address};
use serde::{Deserialize, Serialize};

/// A 32-byte block hash.
pub type BlockHash = [u8; 32];

/// Everything about a block except its transactions.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block number (0 = genesis). Consensus calls this `height`.
    pub number: u64,

    /// Hash of the parent block.
    pub prevhash: BlockHash,

    /// The block's producer. Must equal the signer of the enclosing
    /// `BlockProposal` (spec §4.3 rule 6).
    pub coinbase: Address,

    /// State root after applying this block.
    pub state_root: [u8; 32],

    /// Root of the transaction list.
    pub tx_root: [u8; 32],

    /// Block timestamp (Unix epoch seconds).
    pub timestamp: u64,

    /// Opaque extra data, unused by consensus.
    pub extra: Vec<u8>,
}

/// A blockchain block: a header plus its transaction list.
///
/// # Invariants
///
/// - `header.number` must be exactly parent height + 1.
/// - `header.prevhash` must match the hash of the previous block.
/// - `transactions` must be ordered and individually valid.
/// - `header.state_root` must match the state after applying all transactions.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

/// A block that has been decoded off the wire but not yet validated.
///
/// `Executor::link_block` turns this into a `Block` (or rejects it) by
/// checking transactions and prevhash linkage; nothing upstream of the
/// executor may assume a `TransientBlock`'s fields are trustworthy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransientBlock {
    pub raw: Vec<u8>,
}

impl TransientBlock {
    pub fn new(raw: Vec<u8>) -> Self {
        Self { raw }
    }

    /// Attempt to decode without validating. Returns `None` on malformed
    /// bytes; a successful decode is still "transient" until the executor
    /// checks it against current state.
    pub fn decode(&self) -> Option<Block> {
        bincode::deserialize(&self.raw).ok()
    }
}

impl Block {
    /// Create a new block with a zeroed coinbase; the proposer fills in
    /// `coinbase` before signing.
    pub fn new(
        number: u64,
        prevhash: BlockHash,
        state_root: [u8; 32],
        txs: Vec<Transaction>,
    ) -> Self {
        let tx_root = tx_root(&txs);
        Self {
            header: BlockHeader {
                number,
                prevhash,
                coinbase: Address::ZERO,
                state_root,
                tx_root,
                timestamp: std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs(),
                extra: Vec::new(),
            },
            transactions: txs,
        }
    }

    /// Create the genesis block.
    pub fn genesis() -> Self {
        Self {
            header: BlockHeader {
                number: 0,
                prevhash: [0u8; 32],
                coinbase: Address::ZERO,
                state_root: [0u8; 32],
                tx_root: tx_root(&[]),
                timestamp: 0,
                extra: Vec::new(),
            },
            transactions: Vec::new(),
        }
    }

    /// Set the block's coinbase (the proposer's address). The proposer does
    /// this before wrapping the block in a `BlockProposal` and signing.
    pub fn set_coinbase(&mut self, coinbase: Address) {
        self.header.coinbase = coinbase;
    }

    /// Content hash of the header (transactions are covered via `tx_root`).
    /// This is the `blockhash` referenced throughout the consensus spec.
    pub fn hash(&self) -> BlockHash {
        let encoded =
            bincode::serialize(&self.header).expect("header serialization cannot fail");
        keccak256(&encoded).0
    }

    pub fn is_genesis(&self) -> bool {
        self.header.number == 0
    }

    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}

fn tx_root(txs: &[Transaction]) -> [u8; 32] {
    let encoded = bincode::serialize(txs).expect("tx list serialization cannot fail");
    keccak256(&encoded).0
}
