//! Consensus state persistence (spec §6 persisted key/value layout).
//!
//! Three keys, each its own file under `base_path`, each written with the
//! same atomic temp-file-then-rename discipline as [`crate::block_store`]
//! and [`crate::state_store`]:
//!
//! - `last_committing_lockset` — the quorum lockset that finalized the
//!   current head, re-broadcast on the `Ready` handshake and used to seed a
//!   restarted node's first `signing_lockset`.
//! - `blockproposal:<blockhash>` — every block proposal seen, keyed by its
//!   hash, so a late-joining peer's `GetBlockProposals` can be answered from
//!   disk without replaying the network.
//! - `network_id` — written once at genesis; a mismatch on reopen means this
//!   data directory belongs to a different network and must not be reused.

use crate::StorageError;
use consensus::{BlockProposal, LockSet};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persists the consensus artifacts a restarted node needs to recover
/// without replaying the whole network history.
pub struct ConsensusStore {
    base_path: PathBuf,
}

impl ConsensusStore {
    pub fn new(base_path: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn atomic_write(&self, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let temp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            std::io::Write::write_all(&mut file, data)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StorageError> {
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(path)?;
        Ok(Some(serde_json::from_slice(&data)?))
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StorageError> {
        let data = serde_json::to_vec_pretty(value)?;
        self.atomic_write(path, &data)
    }

    fn last_committing_lockset_path(&self) -> PathBuf {
        self.base_path.join("last_committing_lockset.json")
    }

    pub fn save_last_committing_lockset(&self, lockset: &LockSet) -> Result<(), StorageError> {
        self.write_json(&self.last_committing_lockset_path(), lockset)
    }

    pub fn load_last_committing_lockset(&self) -> Result<Option<LockSet>, StorageError> {
        self.read_json(&self.last_committing_lockset_path())
    }

    fn blockproposal_path(&self, blockhash: [u8; 32]) -> PathBuf {
        self.base_path.join(format!("blockproposal:{}", hex::encode(blockhash)))
    }

    pub fn save_block_proposal(
        &self,
        blockhash: [u8; 32],
        proposal: &BlockProposal,
    ) -> Result<(), StorageError> {
        self.write_json(&self.blockproposal_path(blockhash), proposal)
    }

    pub fn load_block_proposal(
        &self,
        blockhash: [u8; 32],
    ) -> Result<Option<BlockProposal>, StorageError> {
        self.read_json(&self.blockproposal_path(blockhash))
    }

    fn network_id_path(&self) -> PathBuf {
        self.base_path.join("network_id.json")
    }

    /// Write `network_id` if this is a fresh store, or confirm it matches
    /// an existing one. Mismatch is fatal (spec §6): a data directory must
    /// never be reused across networks.
    pub fn check_or_init_network_id(&self, network_id: u64) -> Result<(), StorageError> {
        match self.read_json::<u64>(&self.network_id_path())? {
            Some(stored) if stored != network_id => {
                Err(StorageError::NetworkIdMismatch { stored, configured: network_id })
            }
            Some(_) => Ok(()),
            None => self.write_json(&self.network_id_path(), &network_id),
        }
    }

    /// True if this store already holds a finalized lockset (i.e. this is
    /// a restart, not a fresh genesis start).
    pub fn has_state(&self) -> bool {
        self.last_committing_lockset_path().exists()
    }
}
