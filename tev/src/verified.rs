//! Verified payload types.
//!
//! These types represent data that has passed cryptographic validation.
//! They can only be created through the verification functions,
//! ensuring type-level safety for the trust boundary.

use alloy_primitives::Address;

/// A transaction that has passed cryptographic verification.
///
/// This type can only be created by `verify_transaction()`,
/// guaranteeing that the signature has been checked and the signer recovered.
#[derive(Clone, Debug)]
pub struct VerifiedTransaction {
    /// The transaction data (excluding the trailing signature)
    pub data: Vec<u8>,

    /// The address recovered from the signature
    pub signer: Address,

    /// The verified (r, s, v) signature
    pub signature: (([u8; 32], [u8; 32]), u8),
}

impl VerifiedTransaction {
    /// Get the transaction data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the signer's address.
    pub fn signer(&self) -> Address {
        self.signer
    }
}
