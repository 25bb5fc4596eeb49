//! Node orchestration.
//!
//! Wires POPEYE, TEV, CONSENSUS, MARS, and TAR into a running validator.
//!
//! ```text
//! POPEYE (network) → TEV (crypto) → CONSENSUS → MARS (execution) → TAR (persistence)
//! ```
//!
//! `Node` owns exactly one `ConsensusManager<mars::Runtime>` and drives it
//! from a single `tokio::select!` loop: every inbound wire message, every
//! round-timer tick, and every new transaction submission ends in a call to
//! `process()`, whose `ProcessOutput` is then dispatched to the network and
//! to storage. Consensus itself never touches a socket or a file.

use crate::config::ConfigError;
use crate::NodeConfig;
use consensus::{
    genesis_signing_lockset, BlockProposal, ConsensusManager, Message, Proposal, ProcessOutput,
};
use mars::{Block, Executor, Runtime};
use popeye::{Libp2pNetwork, Network, PeerId};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tar::{ConsensusStore, Storage};
use tev::verify_transaction;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// How often the driver wakes up to re-run `process()` even without a new
/// inbound message, so round timeouts and readiness re-broadcasts fire on
/// schedule.
const TICK_INTERVAL: Duration = Duration::from_millis(200);

/// The integrated node.
pub struct Node {
    config: NodeConfig,
    manager: ConsensusManager<Runtime>,
    network: Libp2pNetwork,
    storage: Storage,
    consensus_store: ConsensusStore,
    shutdown_tx: Option<mpsc::Sender<()>>,
    pending_sync: Option<(Vec<u64>, Instant)>,
}

impl Node {
    /// Build a node from configuration, recovering from `tar` if this data
    /// directory already holds a finalized height.
    pub async fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let storage = Storage::new(config.node.data_dir.clone())?;
        let consensus_store = ConsensusStore::new(config.node.data_dir.join("consensus"))?;
        consensus_store.check_or_init_network_id(config.runtime.network_id)?;

        let keypair = config.keypair()?;
        let validators = {
            let set = config.validator_set()?;
            if set.is_empty() {
                consensus::ValidatorSet::new(vec![keypair.address()])
            } else {
                set
            }
        };

        let genesis_hash = Block::genesis().hash();

        let (executor, lockset) = if consensus_store.has_state() {
            let lockset = consensus_store
                .load_last_committing_lockset()?
                .ok_or(NodeError::MissingRecoveryState)?;
            let state: mars::State = storage.load_state()?;
            let latest_height = storage.latest_block_height()?.unwrap_or(0);

            let mut blocks = HashMap::new();
            let mut last_block_hash = genesis_hash;
            for height in 1..=latest_height {
                let block: Block = storage.load_block(height)?;
                last_block_hash = block.hash();
                blocks.insert(height, block);
            }
            info!(height = latest_height, "recovered node state from disk");
            (Runtime::with_state(state, last_block_hash, blocks), lockset)
        } else {
            let lockset = genesis_signing_lockset(genesis_hash, &keypair);
            consensus_store.save_last_committing_lockset(&lockset)?;
            (Runtime::new(), lockset)
        };

        let manager = ConsensusManager::new(config.consensus.clone(), validators, keypair, executor, lockset);

        let mut network = Libp2pNetwork::new(config.listen_addr()).await?;
        for addr in &config.network.bootstrap_peers {
            match addr.parse() {
                Ok(multiaddr) => {
                    if let Err(e) = network.dial(multiaddr) {
                        warn!(%addr, %e, "failed to dial bootstrap peer");
                    }
                }
                Err(e) => warn!(%addr, %e, "invalid bootstrap peer address"),
            }
        }

        Ok(Self {
            config,
            manager,
            network,
            storage,
            consensus_store,
            shutdown_tx: None,
            pending_sync: None,
        })
    }

    /// Run the node's event loop until shutdown.
    pub async fn run(&mut self) -> Result<(), NodeError> {
        info!(
            data_dir = ?self.config.node.data_dir,
            listen = %self.config.listen_addr(),
            height = self.manager.height(),
            validators = self.manager.validators.len(),
            "starting node"
        );

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let mut ticker = interval(TICK_INTERVAL);

        // Prime the readiness handshake / initial proposal immediately.
        self.tick().await?;

        loop {
            tokio::select! {
                (peer, message) = self.network.next_message() => {
                    if let Err(e) = self.handle_message(peer, message).await {
                        if e.is_fatal() {
                            return Err(e);
                        }
                        warn!(%e, "error handling inbound message");
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        if e.is_fatal() {
                            return Err(e);
                        }
                        warn!(%e, "error in round tick");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Run one pass of `process()`, checking for a stalled sync request
    /// first, and dispatch the result.
    async fn tick(&mut self) -> Result<(), NodeError> {
        if let Some((heights, issued_at)) = &self.pending_sync {
            if issued_at.elapsed() > self.config.consensus.sync_timeout {
                self.manager.note_sync_timeout(heights);
                self.pending_sync = None;
            }
        }

        let output = self.manager.process(Instant::now())?;
        self.dispatch(output).await
    }

    /// Apply everything one `process()` pass decided to do: broadcast
    /// outbound messages and persist committed blocks.
    async fn dispatch(&mut self, output: ProcessOutput) -> Result<(), NodeError> {
        for message in output.messages {
            if let Message::NewBlockProposal(ref bp) = message {
                let _ = self.consensus_store.save_block_proposal(bp.message.block.hash(), bp);
            }
            if let Message::GetBlockProposals { ref heights } = message {
                self.pending_sync = Some((heights.clone(), Instant::now()));
            }
            if let Err(e) = self.network.broadcast(message, None).await {
                warn!(%e, "broadcast failed");
            }
        }

        for (block, lockset) in output.commits {
            self.storage.commit(block.header.number, &block, &self.manager.executor.state)?;
            self.consensus_store.save_last_committing_lockset(&lockset)?;
            info!(height = block.header.number, "persisted committed block");
        }

        Ok(())
    }

    /// Dispatch one inbound wire message into the consensus manager, then
    /// run `process()` and dispatch its output.
    async fn handle_message(&mut self, peer: PeerId, message: Message) -> Result<(), NodeError> {
        match message {
            Message::Status { network_id, genesis_hash, .. } => {
                if network_id != self.config.runtime.network_id {
                    warn!(%peer, network_id, "peer on a different network, ignoring");
                    return Ok(());
                }
                if genesis_hash != Block::genesis().hash() {
                    warn!(%peer, "peer has a different genesis block, ignoring");
                    return Ok(());
                }
            }
            Message::Transactions { raw } => {
                for payload in raw {
                    if let Err(e) = self.submit_raw_transaction(&payload) {
                        debug!(%peer, %e, "rejected inbound transaction");
                    }
                }
            }
            Message::GetBlockProposals { heights } => {
                self.respond_to_getblockproposals(peer, heights).await?;
            }
            Message::BlockProposals { raw } => {
                let mut received = Vec::new();
                for entry in &raw {
                    match bincode::deserialize::<BlockProposal>(entry) {
                        Ok(bp) => {
                            let height = bp.message.height;
                            let hash = bp.message.block.hash();
                            if self.manager.add_proposal(Proposal::Block(bp.clone()))? {
                                let _ = self.consensus_store.save_block_proposal(hash, &bp);
                                received.push(height);
                            }
                        }
                        Err(e) => debug!(%peer, %e, "malformed block proposal in sync reply"),
                    }
                }
                if !received.is_empty() {
                    self.manager.note_blockproposals_received(received);
                    if let Some((heights, _)) = &self.pending_sync {
                        if heights.iter().all(|h| !self.manager_missing(*h)) {
                            self.pending_sync = None;
                        }
                    }
                }
            }
            Message::NewBlockProposal(bp) => {
                let hash = bp.message.block.hash();
                if self.manager.add_proposal(Proposal::Block(bp.clone()))? {
                    let _ = self.consensus_store.save_block_proposal(hash, &bp);
                }
            }
            Message::VotingInstruction(vi) => {
                self.manager.add_proposal(Proposal::VotingInstruction(vi))?;
            }
            Message::Vote(vote) => {
                self.manager.add_vote(vote)?;
            }
            Message::Ready(ready) => {
                if let Some(reply) = self.manager.add_ready(ready)? {
                    self.network.broadcast(reply, None).await?;
                }
            }
        }

        let output = self.manager.process(Instant::now())?;
        self.dispatch(output).await
    }

    /// Whether `height` is still below our current head (used to decide if
    /// a sync batch has been fully satisfied).
    fn manager_missing(&self, height: u64) -> bool {
        height >= self.manager.height()
    }

    /// Answer a `GetBlockProposals` request from whatever we have
    /// persisted, keyed by the committed block's hash at each height.
    async fn respond_to_getblockproposals(&mut self, peer: PeerId, heights: Vec<u64>) -> Result<(), NodeError> {
        let mut raw = Vec::new();
        for height in heights {
            let Some(block) = self.manager.executor.get_block_by_number(height) else { continue };
            if let Some(proposal) = self.consensus_store.load_block_proposal(block.hash())? {
                raw.push(bincode::serialize(&proposal).expect("BlockProposal serialization cannot fail"));
            }
        }
        if !raw.is_empty() {
            self.network.send(peer, Message::BlockProposals { raw }).await?;
        }
        Ok(())
    }

    /// Verify a raw signed transaction payload and submit it to the
    /// runtime's mempool. The recovered signature must match the claimed
    /// sender: TEV only proves who signed the bytes, not that the embedded
    /// `from` field is honest.
    fn submit_raw_transaction(&mut self, payload: &[u8]) -> Result<(), NodeError> {
        let verified = verify_transaction(payload)?;
        let tx: mars::Transaction =
            bincode::deserialize(verified.data()).map_err(|_| NodeError::InvalidPayload)?;
        if tx.from != verified.signer() {
            return Err(NodeError::InvalidPayload);
        }
        self.manager.executor.submit_transaction(tx)?;
        Ok(())
    }

    /// Submit a new, already-signed transaction from a local client and
    /// gossip it onward. Returns once it has been accepted into the
    /// mempool; the caller's next `run()` tick will pick it up.
    pub async fn submit_transaction(&mut self, payload: Vec<u8>) -> Result<(), NodeError> {
        self.submit_raw_transaction(&payload)?;
        self.network.broadcast(Message::Transactions { raw: vec![payload] }, None).await?;
        let output = self.manager.process(Instant::now())?;
        self.dispatch(output).await
    }

    /// Current chain height (last committed block number).
    pub fn height(&self) -> u64 {
        self.manager.height().saturating_sub(1)
    }

    /// Pending mempool size.
    pub fn mempool_size(&self) -> usize {
        self.manager.executor.mempool_size()
    }

    /// Number of connected libp2p peers.
    pub fn peer_count(&self) -> usize {
        self.network.peer_count()
    }

    /// Shut the node down, breaking out of `run()`'s event loop.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }
}

/// Node errors: every lower layer's error type funnels up through here.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("storage error: {0}")]
    Storage(#[from] tar::StorageError),

    #[error("consensus error: {0}")]
    Consensus(#[from] consensus::ConsensusError),

    #[error("network error: {0}")]
    Network(#[from] popeye::NetworkError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("validation error: {0}")]
    Validation(#[from] tev::ValidationError),

    #[error("runtime error: {0}")]
    Runtime(#[from] mars::RuntimeError),

    #[error("malformed transaction payload")]
    InvalidPayload,

    #[error("data directory has no recoverable consensus state despite having committed blocks")]
    MissingRecoveryState,
}

impl NodeError {
    /// A fork detection halts the consensus loop outright (spec §7):
    /// operator intervention is required, unlike every other recoverable
    /// error kind, which is dropped and logged.
    pub fn is_fatal(&self) -> bool {
        matches!(self, NodeError::Consensus(consensus::ConsensusError::ForkDetected { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn fresh_node_starts_at_height_zero() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = NodeConfig::dev();
        config.node.data_dir = temp_dir.path().to_path_buf();
        config.network.listen_port = 0;

        let node = Node::new(config).await.unwrap();
        assert_eq!(node.height(), 0);
        assert_eq!(node.mempool_size(), 0);
    }

    #[tokio::test]
    async fn network_id_mismatch_on_reopen_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = NodeConfig::dev();
        config.node.data_dir = temp_dir.path().to_path_buf();
        config.network.listen_port = 0;
        config.runtime.network_id = 1;

        {
            let _node = Node::new(config.clone()).await.unwrap();
        }

        config.runtime.network_id = 2;
        let result = Node::new(config).await;
        assert!(matches!(result, Err(NodeError::Storage(tar::StorageError::NetworkIdMismatch { .. }))));
    }
}
