//! # TEV — Trusted Execution & Validation
//!
//! TEV is the cryptographic firewall for Unykorn L1.
//! It validates signatures and enforces the transport format.
//!
//! ## Trust Model
//!
//! Nothing crosses from POPEYE to MARS without passing TEV.
//! This separation ensures:
//! - Network spam cannot corrupt state
//! - Invalid blocks cannot cause forks
//! - Malformed transactions cannot crash the runtime
//!
//! ## Design Principles
//!
//! - **Stateless**: No storage, no persistence
//! - **Pure**: Verification only, no side effects
//! - **Type-safe**: Verified vs Unverified types
//! - **Recoverable**: the signer's address is recovered from the signature,
//!   never carried as a separate wire field

pub mod error;
pub mod hash;
pub mod signature;
pub mod signed;
pub mod verified;

pub use error::ValidationError;
pub use hash::{content_hash, wire_hash};
pub use signature::{recover_address, verify_signature, Keypair};
pub use signed::Signed;
pub use verified::VerifiedTransaction;

const SIGNATURE_LEN: usize = 32 + 32 + 1;

/// Verify a raw transaction payload.
///
/// # Format
///
/// The payload must be at least 65 bytes:
/// - Remaining bytes (prefix): transaction data
/// - Trailing 65 bytes: `r (32) || s (32) || v (1)`
///
/// The signer's address is recovered from the signature, not carried on the
/// wire.
///
/// # Returns
///
/// A `VerifiedTransaction` that can be safely passed to MARS.
pub fn verify_transaction(payload: &[u8]) -> Result<VerifiedTransaction, ValidationError> {
    let (data, r, s, v) = split_signed_payload(payload, "transaction")?;
    let digest = hash::wire_hash(data);
    let signer = signature::recover_address(digest, &r, &s, v)?;

    Ok(VerifiedTransaction {
        data: data.to_vec(),
        signer,
        signature: ((r, s), v),
    })
}

fn split_signed_payload<'a>(
    payload: &'a [u8],
    what: &'static str,
) -> Result<(&'a [u8], [u8; 32], [u8; 32], u8), ValidationError> {
    if payload.len() < SIGNATURE_LEN {
        return Err(ValidationError::InvalidFormat {
            reason: format!(
                "{what} payload too short: {} bytes, minimum {SIGNATURE_LEN}",
                payload.len()
            ),
        });
    }

    let v_index = payload.len() - 1;
    let s_start = v_index - 32;
    let r_start = s_start - 32;

    let data = &payload[..r_start];
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&payload[r_start..s_start]);
    s.copy_from_slice(&payload[s_start..v_index]);
    let v = payload[v_index];

    Ok((data, r, s, v))
}
