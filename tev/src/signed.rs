//! The `Signed<T>` envelope.
//!
//! Wraps any serializable message with a recoverable ECDSA signature. The
//! sender's address is never carried in the envelope itself — it is
//! recovered from the signature over the message's signing digest, so a
//! `Signed<T>` cannot be re-attributed to a different signer by editing a
//! sender field, and cannot be forged without the matching secret key.

use crate::hash::content_hash as hash_bytes;
use crate::signature::{recover_address, Keypair};
use crate::ValidationError;
use alloy_primitives::{keccak256, Address};
use serde::{Deserialize, Serialize};

/// A message of type `T` together with a recoverable signature over its
/// signing digest.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Signed<T> {
    pub message: T,
    pub v: u8,
    #[serde(with = "hex32")]
    pub r: [u8; 32],
    #[serde(with = "hex32")]
    pub s: [u8; 32],
}

impl<T: Serialize> Signed<T> {
    /// The digest actually signed: the canonical encoding of `message`
    /// alone. The sender isn't known yet at signing time, so it can never
    /// be part of this digest.
    fn signing_digest(message: &T) -> [u8; 32] {
        hash_bytes(message)
    }

    /// Sign `message` with `keypair`, producing a `Signed<T>`.
    pub fn sign(message: T, keypair: &Keypair) -> Self {
        let digest = Self::signing_digest(&message);
        let (r, s, v) = keypair.sign_prehash(digest);
        Self { message, v, r, s }
    }

    /// Recover the sender's address from the signature.
    ///
    /// Fails if `(r, s, v)` is not a valid recoverable signature over the
    /// message's signing digest — it never trusts a sender field, because
    /// there isn't one.
    pub fn sender(&self) -> Result<Address, ValidationError> {
        recover_address(Self::signing_digest(&self.message), &self.r, &self.s, self.v)
    }

    /// The content hash: `keccak256(encode(message) || sender)`.
    ///
    /// Signature-independent identity of this message from this sender —
    /// two envelopes with the same message and sender produce the same
    /// content hash even if re-signed with a fresh nonce, which is what
    /// makes it safe to use as a duplicate-suppression key. Fails iff the
    /// signature itself doesn't recover to a sender.
    pub fn content_hash(&self) -> Result<[u8; 32], ValidationError> {
        let sender = self.sender()?;
        let mut encoded = bincode::serialize(&self.message)
            .expect("in-memory struct serialization cannot fail");
        encoded.extend_from_slice(sender.as_slice());
        Ok(keccak256(&encoded).0)
    }

    /// The wire hash: a hash of the full signed envelope, including `v, r,
    /// s`. Two signatures over the same message produce different wire
    /// hashes; re-signing does not create a hash collision with the
    /// original.
    pub fn wire_hash(&self) -> [u8; 32] {
        hash_bytes(self)
    }
}

mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}
