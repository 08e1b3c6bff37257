// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Node identity and per-peer secrets
//!
//! A node's long-term identity is an Ed25519 keypair. The public key is the
//! node's address; its first byte is the one-byte hash ID used on the wire.
//! Advertisements are signed with the Ed25519 key. Per-peer envelope keys
//! come from X25519 after converting both parties' Ed25519 keys to
//! Montgomery form, so a single stored keypair serves both roles.
//!
//! The conversion follows RFC 8032 / libsodium: the X25519 scalar is the
//! clamped low half of SHA-512(seed); the public point is the Edwards to
//! Montgomery birational map.

use crate::aead::CipherKey;
use crate::error::CryptoError;
use crate::rng::CryptoRng;
use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey as XPublicKey, StaticSecret};
use zeroize::Zeroize;

/// Public key size in bytes
pub const PUB_KEY_SIZE: usize = 32;

/// Private seed size in bytes
pub const SEED_SIZE: usize = 32;

/// Advert signature size in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Persisted identity blob: seed followed by public key
pub const IDENTITY_BLOB_SIZE: usize = SEED_SIZE + PUB_KEY_SIZE;

/// A peer's public identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    /// Ed25519 public key
    pub pub_key: [u8; PUB_KEY_SIZE],
}

impl Identity {
    /// Wrap a raw public key
    #[must_use]
    pub const fn new(pub_key: [u8; PUB_KEY_SIZE]) -> Self {
        Self { pub_key }
    }

    /// One-byte wire address: the first byte of the public key
    #[must_use]
    pub const fn hash_id(&self) -> u8 {
        self.pub_key[0]
    }

    /// Does this identity match a one-byte wire address?
    #[must_use]
    pub const fn is_hash_match(&self, hash: u8) -> bool {
        self.pub_key[0] == hash
    }

    /// Same public key?
    #[must_use]
    pub fn matches(&self, other: &Identity) -> bool {
        self.pub_key == other.pub_key
    }

    /// Verify an Ed25519 signature made by this identity
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &[u8; SIGNATURE_SIZE]) -> bool {
        let Ok(vk) = VerifyingKey::from_bytes(&self.pub_key) else {
            return false;
        };
        let sig = Signature::from_bytes(signature);
        vk.verify(message, &sig).is_ok()
    }
}

/// This node's identity: the keypair half of [`Identity`]
pub struct LocalIdentity {
    signing: SigningKey,
    ident: Identity,
}

impl LocalIdentity {
    /// Generate a fresh random identity
    ///
    /// # Errors
    ///
    /// `CryptoError::RngFailure` if the RNG fails.
    pub fn new_random<R: CryptoRng>(rng: &mut R) -> Result<Self, CryptoError> {
        let mut seed = [0u8; SEED_SIZE];
        rng.fill_bytes(&mut seed)?;
        let signing = SigningKey::from_bytes(&seed);
        seed.zeroize();
        let ident = Identity::new(signing.verifying_key().to_bytes());
        Ok(Self { signing, ident })
    }

    /// Restore from a persisted blob (`seed || pub_key`)
    ///
    /// # Errors
    ///
    /// `CryptoError::InvalidKey` if the stored public key does not match
    /// the seed (corrupt store).
    pub fn from_blob(blob: &[u8; IDENTITY_BLOB_SIZE]) -> Result<Self, CryptoError> {
        let mut seed = [0u8; SEED_SIZE];
        seed.copy_from_slice(&blob[..SEED_SIZE]);
        let signing = SigningKey::from_bytes(&seed);
        seed.zeroize();

        let ident = Identity::new(signing.verifying_key().to_bytes());
        if ident.pub_key != blob[SEED_SIZE..] {
            return Err(CryptoError::InvalidKey);
        }
        Ok(Self { signing, ident })
    }

    /// Serialize for the identity store
    #[must_use]
    pub fn to_blob(&self) -> [u8; IDENTITY_BLOB_SIZE] {
        let mut blob = [0u8; IDENTITY_BLOB_SIZE];
        blob[..SEED_SIZE].copy_from_slice(&self.signing.to_bytes());
        blob[SEED_SIZE..].copy_from_slice(&self.ident.pub_key);
        blob
    }

    /// The public half
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.ident
    }

    /// One-byte wire address of this node
    #[must_use]
    pub const fn hash_id(&self) -> u8 {
        self.ident.hash_id()
    }

    /// Sign a message (advert authentication)
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing.sign(message).to_bytes()
    }

    /// Derive the shared envelope key with a peer
    ///
    /// Deterministic and symmetric: both sides compute the same 32 bytes.
    /// Computed once per contact and cached there.
    ///
    /// # Errors
    ///
    /// `CryptoError::InvalidKey` if the peer public key is not a valid
    /// curve point.
    pub fn shared_secret(&self, peer: &Identity) -> Result<CipherKey, CryptoError> {
        let peer_x = ed_pub_to_x25519(&peer.pub_key).ok_or(CryptoError::InvalidKey)?;
        let own_scalar = ed_seed_to_x25519(&self.signing.to_bytes());
        let secret = StaticSecret::from(own_scalar);
        let shared = secret.diffie_hellman(&peer_x);
        Ok(CipherKey::new(*shared.as_bytes()))
    }
}

/// Ed25519 public key to X25519 public key (Edwards -> Montgomery)
fn ed_pub_to_x25519(ed_pk: &[u8; 32]) -> Option<XPublicKey> {
    let point = CompressedEdwardsY(*ed_pk).decompress()?;
    Some(XPublicKey::from(point.to_montgomery().0))
}

/// Ed25519 seed to X25519 scalar (clamped low half of SHA-512)
fn ed_seed_to_x25519(seed: &[u8; 32]) -> [u8; 32] {
    let digest = Sha512::digest(seed);
    let mut scalar = [0u8; 32];
    scalar.copy_from_slice(&digest[..32]);
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;
    scalar
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRng(u8);

    impl CryptoRng for FixedRng {
        fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), CryptoError> {
            for b in dest.iter_mut() {
                self.0 = self.0.wrapping_mul(31).wrapping_add(17);
                *b = self.0;
            }
            Ok(())
        }
    }

    #[test]
    fn sign_and_verify() {
        let id = LocalIdentity::new_random(&mut FixedRng(1)).unwrap();
        let sig = id.sign(b"advert body");
        assert!(id.identity().verify(b"advert body", &sig));
        assert!(!id.identity().verify(b"advert bodY", &sig));
    }

    #[test]
    fn ecdh_is_symmetric() {
        let a = LocalIdentity::new_random(&mut FixedRng(1)).unwrap();
        let b = LocalIdentity::new_random(&mut FixedRng(99)).unwrap();

        let ab = a.shared_secret(b.identity()).unwrap();
        let ba = b.shared_secret(a.identity()).unwrap();
        assert_eq!(ab.as_bytes(), ba.as_bytes());
    }

    #[test]
    fn distinct_peers_distinct_secrets() {
        let a = LocalIdentity::new_random(&mut FixedRng(1)).unwrap();
        let b = LocalIdentity::new_random(&mut FixedRng(2)).unwrap();
        let c = LocalIdentity::new_random(&mut FixedRng(3)).unwrap();

        let ab = a.shared_secret(b.identity()).unwrap();
        let ac = a.shared_secret(c.identity()).unwrap();
        assert_ne!(ab.as_bytes(), ac.as_bytes());
    }

    #[test]
    fn blob_roundtrip() {
        let id = LocalIdentity::new_random(&mut FixedRng(5)).unwrap();
        let blob = id.to_blob();
        let restored = LocalIdentity::from_blob(&blob).unwrap();
        assert!(restored.identity().matches(id.identity()));

        // Corrupt public half: restore must fail
        let mut bad = blob;
        bad[IDENTITY_BLOB_SIZE - 1] ^= 0xFF;
        assert!(LocalIdentity::from_blob(&bad).is_err());
    }

    #[test]
    fn hash_id_is_first_pub_byte() {
        let id = LocalIdentity::new_random(&mut FixedRng(7)).unwrap();
        assert_eq!(id.hash_id(), id.identity().pub_key[0]);
        assert!(id.identity().is_hash_match(id.hash_id()));
    }
}
