//! Recoverable ECDSA (secp256k1) signature operations.
//!
//! This module provides cryptographic signing, verification, and public-key
//! *recovery* using the same curve and recovery scheme Ethereum-style chains
//! use: a signature over a 32-byte digest plus a one-byte recovery id is
//! enough to reconstruct the signer's public key, so the wire format never
//! needs to carry a separate public key field.

use crate::ValidationError;
use alloy_primitives::{keccak256, Address};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

/// A keypair for signing operations.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        Self { signing_key }
    }

    /// Create a keypair from a secret key (32 bytes).
    pub fn from_secret(secret: &[u8; 32]) -> Result<Self, ValidationError> {
        let signing_key =
            SigningKey::from_bytes(secret.into()).map_err(|_| ValidationError::InvalidPublicKey)?;
        Ok(Self { signing_key })
    }

    /// Get the uncompressed public key (65 bytes, `0x04 || X || Y`).
    pub fn public_key(&self) -> [u8; 65] {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let mut out = [0u8; 65];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Derive the 20-byte address for this keypair.
    ///
    /// `address = keccak256(pubkey[1..])[12..]`, i.e. the low 20 bytes of the
    /// hash of the uncompressed public key with its `0x04` prefix stripped.
    pub fn address(&self) -> Address {
        address_from_uncompressed(&self.public_key())
    }

    /// Sign a 32-byte digest, returning a recoverable signature as `(r, s, v)`.
    ///
    /// `v` is `0` or `1` (the recovery id), not the Ethereum-legacy `27`/`28`
    /// encoding; callers that need the legacy encoding add 27 themselves.
    pub fn sign_prehash(&self, digest: [u8; 32]) -> ([u8; 32], [u8; 32], u8) {
        let (signature, recid): (Signature, RecoveryId) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .expect("signing over a fixed-size digest cannot fail");
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        (r, s, recid.to_byte())
    }
}

/// Derive an address from an uncompressed secp256k1 public key.
pub fn address_from_uncompressed(pubkey: &[u8; 65]) -> Address {
    let hash = keccak256(&pubkey[1..]);
    Address::from_slice(&hash[12..])
}

/// Recover the signer's public key and address from a digest and signature.
///
/// Mirrors HydraChain's `Signed.sender`: rejects malleable or out-of-range
/// `(r, s, v)` triples before attempting recovery.
pub fn recover_address(
    digest: [u8; 32],
    r: &[u8; 32],
    s: &[u8; 32],
    v: u8,
) -> Result<Address, ValidationError> {
    if v > 1 {
        return Err(ValidationError::InvalidSignature);
    }

    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(r);
    sig_bytes[32..].copy_from_slice(s);

    let signature =
        Signature::from_slice(&sig_bytes).map_err(|_| ValidationError::InvalidSignature)?;
    let recid = RecoveryId::from_byte(v).ok_or(ValidationError::InvalidSignature)?;

    let verifying_key = VerifyingKey::recover_from_prehash(&digest, &signature, recid)
        .map_err(|_| ValidationError::InvalidSignature)?;

    let point = verifying_key.to_encoded_point(false);
    let mut pubkey = [0u8; 65];
    pubkey.copy_from_slice(point.as_bytes());
    Ok(address_from_uncompressed(&pubkey))
}

/// Verify that `(r, s, v)` is a valid signature over `digest` from `expected`.
pub fn verify_signature(
    digest: [u8; 32],
    r: &[u8; 32],
    s: &[u8; 32],
    v: u8,
    expected: Address,
) -> Result<(), ValidationError> {
    let recovered = recover_address(digest, r, s, v)?;
    if recovered == expected {
        Ok(())
    } else {
        Err(ValidationError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_recover_roundtrip() {
        let keypair = Keypair::generate();
        let digest = keccak256(b"hello world").0;

        let (r, s, v) = keypair.sign_prehash(digest);
        let recovered = recover_address(digest, &r, &s, v).unwrap();

        assert_eq!(recovered, keypair.address());
    }

    #[test]
    fn reject_wrong_digest() {
        let keypair = Keypair::generate();
        let digest = keccak256(b"original message").0;
        let (r, s, v) = keypair.sign_prehash(digest);

        let wrong_digest = keccak256(b"tampered message").0;
        let recovered = recover_address(wrong_digest, &r, &s, v).unwrap();

        assert_ne!(recovered, keypair.address());
    }

    #[test]
    fn keypair_from_secret_is_deterministic() {
        let secret = [42u8; 32];
        let keypair1 = Keypair::from_secret(&secret).unwrap();
        let keypair2 = Keypair::from_secret(&secret).unwrap();

        assert_eq!(keypair1.address(), keypair2.address());
    }

    #[test]
    fn verify_signature_rejects_wrong_signer() {
        let keypair1 = Keypair::generate();
        let keypair2 = Keypair::generate();
        let digest = keccak256(b"hello").0;
        let (r, s, v) = keypair1.sign_prehash(digest);

        assert!(verify_signature(digest, &r, &s, v, keypair2.address()).is_err());
        assert!(verify_signature(digest, &r, &s, v, keypair1.address()).is_ok());
    }
}
