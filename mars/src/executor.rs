//! The `Executor` trait: the interface consensus uses to touch state.
//!
//! Consensus never mutates state or validates transactions itself (spec §1,
//! §6) — it only ever calls through this trait. `Runtime` is the one
//! concrete implementor in this crate; a node could swap in a different
//! execution engine (a real EVM, a UTXO ledger, ...) without consensus
//! noticing, since it only depends on this trait plus `Block`/`TransientBlock`.

use crate::{Block, TransientBlock};

/// The execution engine as seen from consensus.
///
/// Mirrors HydraChain's `chainservice` collaborator: `head`/`head_candidate`
/// expose the current and next-candidate blocks, `commit_block` applies a
/// decided block, `link_block` turns wire bytes into a validated `Block`
/// (or rejects them), and `get_block_by_number` backs the synchronizer.
pub trait Executor {
    /// The last committed block.
    fn head(&self) -> Block;

    /// The block currently being assembled from the mempool — the
    /// candidate a local proposer would sign if it is the round's leader.
    fn head_candidate(&self) -> Block;

    /// Apply `block` to state. Returns `false` if the block does not link
    /// to `head()` or fails replay; the caller must not treat this as
    /// fatal, only as "this proposal does not commit".
    fn commit_block(&mut self, block: &Block) -> bool;

    /// Decode and verify a transient (unvalidated) block. Returns `None` on
    /// any failure: malformed bytes, bad prevhash, an invalid transaction.
    fn link_block(&mut self, transient: &TransientBlock) -> Option<Block>;

    /// Look up a previously committed block by height.
    fn get_block_by_number(&self, number: u64) -> Option<Block>;

    /// Number of transactions currently queued for the next candidate.
    fn pending_transaction_count(&self) -> usize;
}
