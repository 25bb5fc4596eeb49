//! The readiness beacon (spec §4.7): `Ready(nonce, current_lockset)`,
//! broadcast on startup and re-broadcast with an incremented nonce until
//! enough validators are heard from.

use crate::lockset::LockSet;
use serde::{Deserialize, Serialize};
use tev::Signed;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadyData {
    pub nonce: u64,
    pub current_lockset: LockSet,
}

pub type Ready = Signed<ReadyData>;
