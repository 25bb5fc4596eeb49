//! The MARS runtime — core execution engine and `Executor` implementation.
//!
//! The Runtime is the heart of the blockchain, responsible for validating
//! transactions, producing block candidates, and applying state
//! transitions. Nothing here knows about heights/rounds/votes — that is
//! entirely the `consensus` crate's business; `Runtime` only ever answers
//! "is this transaction valid", "here is the next candidate block", and
//! "apply this decided block".

use crate::block::BlockHash;
use crate::executor::Executor;
use crate::{Block, RuntimeError, State, Transaction, TransientBlock};
use alloy_primitives::Address;
use std::collections::HashMap;

/// The core runtime execution engine.
pub struct Runtime {
    /// Current blockchain state.
    pub state: State,

    /// Pending transactions (mempool).
    mempool: Vec<Transaction>,

    /// Committed blocks, keyed by height, for `get_block_by_number`.
    blocks: HashMap<u64, Block>,

    /// Last committed block's hash.
    last_block_hash: BlockHash,
}

impl Runtime {
    /// Create a new runtime with genesis state.
    pub fn new() -> Self {
        let genesis = Block::genesis();
        let hash = genesis.hash();
        let mut blocks = HashMap::new();
        blocks.insert(0, genesis);
        Self {
            state: State::new(),
            mempool: Vec::new(),
            blocks,
            last_block_hash: hash,
        }
    }

    /// Create a runtime with existing state (for restart recovery), seeded
    /// with the blocks already recovered from `tar`.
    pub fn with_state(state: State, last_block_hash: BlockHash, blocks: HashMap<u64, Block>) -> Self {
        Self { state, mempool: Vec::new(), blocks, last_block_hash }
    }

    /// Submit a transaction to the mempool.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<(), RuntimeError> {
        self.validate_transaction(&tx)?;
        self.mempool.push(tx);
        Ok(())
    }

    /// Validate a transaction against current state plus pending mempool
    /// transactions from the same sender.
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<(), RuntimeError> {
        let pending_count =
            self.mempool.iter().filter(|t| t.from == tx.from).count() as u64;

        let expected_nonce = self.state.nonce(&tx.from) + pending_count;
        if tx.nonce != expected_nonce {
            return Err(RuntimeError::DuplicateNonce { nonce: tx.nonce });
        }

        let pending_amount: u64 = self
            .mempool
            .iter()
            .filter(|t| t.from == tx.from)
            .map(|t| t.amount)
            .sum();

        let balance = self.state.balance(&tx.from);
        let available = balance.saturating_sub(pending_amount);
        if available < tx.amount {
            return Err(RuntimeError::InvalidTransaction {
                reason: format!("insufficient balance: have {available}, need {}", tx.amount),
            });
        }

        Ok(())
    }

    fn apply_transaction(&mut self, tx: &Transaction) -> Result<(), RuntimeError> {
        let sender_balance = self.state.balance(&tx.from);
        self.state.set_balance(&tx.from, sender_balance - tx.amount);

        let recipient_balance = self.state.balance(&tx.to);
        self.state.set_balance(&tx.to, recipient_balance + tx.amount);

        self.state.increment_nonce(&tx.from);
        Ok(())
    }

    /// Preview the state root that would result from applying the current
    /// mempool on top of current state, without mutating `self.state`.
    fn preview_state_root(&self, txs: &[Transaction]) -> [u8; 32] {
        let mut scratch = self.state.clone();
        for tx in txs {
            let sender_balance = scratch.balance(&tx.from);
            scratch.set_balance(&tx.from, sender_balance.saturating_sub(tx.amount));
            let recipient_balance = scratch.balance(&tx.to);
            scratch.set_balance(&tx.to, recipient_balance + tx.amount);
            scratch.increment_nonce(&tx.from);
        }
        scratch.height += 1;
        scratch.compute_state_root();
        scratch.state_root
    }

    pub fn height(&self) -> u64 {
        self.state.height
    }

    pub fn mempool_size(&self) -> usize {
        self.mempool.len()
    }

    pub fn last_block_hash(&self) -> BlockHash {
        self.last_block_hash
    }

    pub fn clear_mempool(&mut self) {
        self.mempool.clear();
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for Runtime {
    fn head(&self) -> Block {
        self.blocks
            .get(&self.state.height)
            .cloned()
            .unwrap_or_else(Block::genesis)
    }

    fn head_candidate(&self) -> Block {
        let txs = self.mempool.clone();
        let state_root = self.preview_state_root(&txs);
        Block::new(self.state.height + 1, self.last_block_hash, state_root, txs)
    }

    fn commit_block(&mut self, block: &Block) -> bool {
        if block.header.number != self.state.height + 1 {
            return false;
        }
        if block.header.prevhash != self.last_block_hash {
            return false;
        }
        for tx in &block.transactions {
            if self.validate_transaction(tx).is_err() {
                return false;
            }
            if self.apply_transaction(tx).is_err() {
                return false;
            }
        }

        self.state.height = block.header.number;
        self.state.compute_state_root();
        self.last_block_hash = block.hash();
        self.blocks.insert(block.header.number, block.clone());

        let committed: std::collections::HashSet<_> =
            block.transactions.iter().map(|t| (t.from, t.nonce)).collect();
        self.mempool.retain(|t| !committed.contains(&(t.from, t.nonce)));
        true
    }

    fn link_block(&mut self, transient: &TransientBlock) -> Option<Block> {
        let block = transient.decode()?;
        if block.header.number != self.state.height + 1 {
            return None;
        }
        if block.header.prevhash != self.last_block_hash {
            return None;
        }
        for tx in &block.transactions {
            if self.validate_transaction(tx).is_err() {
                return None;
            }
        }
        Some(block)
    }

    fn get_block_by_number(&self, number: u64) -> Option<Block> {
        self.blocks.get(&number).cloned()
    }

    fn pending_transaction_count(&self) -> usize {
        self.mempool.len()
    }
}
