//! Transaction types and validation.
//!
//! Transactions are the atomic units of state mutation. They must be
//! verified by TEV (signature recovered, sender derived) before reaching
//! MARS; consensus treats the transaction list as opaque payload (spec §1).

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// A blockchain transaction.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    /// Sender's address, recovered by TEV from the wire signature.
    pub from: Address,

    /// Recipient's address.
    pub to: Address,

    /// Amount to transfer.
    pub amount: u64,

    /// Sender's nonce (for replay protection).
    pub nonce: u64,

    /// Optional payload data.
    pub payload: Vec<u8>,
}

impl Transaction {
    /// Create a new transaction.
    pub fn new(from: Address, to: Address, amount: u64, nonce: u64) -> Self {
        Self { from, to, amount, nonce, payload: Vec::new() }
    }

    /// Create a new transaction with payload.
    pub fn with_payload(
        from: Address,
        to: Address,
        amount: u64,
        nonce: u64,
        payload: Vec<u8>,
    ) -> Self {
        Self { from, to, amount, nonce, payload }
    }

    /// Canonical bytes for signing / hashing.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(self.from.as_slice());
        bytes.extend_from_slice(self.to.as_slice());
        bytes.extend_from_slice(&self.amount.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}
