//! Content hashing for signed payloads.
//!
//! HydraChain's `Signed` distinguishes two hashes of the same object: the
//! *content hash*, computed over every field except the signature, which is
//! what actually gets signed; and the *wire hash*, computed over the full
//! encoded object including `v`, `r`, `s`, which identifies a specific signed
//! instance on the wire. Using the wrong one anywhere lets an attacker
//! re-sign an existing payload and have it treated as a new object, or
//! (worse) lets a signature cover its own encoding and become unverifiable.

use alloy_primitives::keccak256;
use serde::Serialize;

/// Hash the canonical encoding of `value`.
///
/// Callers pass only the fields that are actually signed over; this function
/// does not know or care whether that's "everything" or "everything but the
/// signature" — that distinction is the caller's responsibility to encode in
/// which struct it serializes.
pub fn content_hash<T: Serialize>(value: &T) -> [u8; 32] {
    let encoded = bincode::serialize(value).expect("in-memory struct serialization cannot fail");
    keccak256(&encoded).0
}

/// Hash raw bytes already on the wire.
pub fn wire_hash(bytes: &[u8]) -> [u8; 32] {
    keccak256(bytes).0
}
