// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Packet payload envelope
//!
//! Authenticated encryption for mesh payloads using ChaCha20-Poly1305.
//! Output format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//!
//! The nonce is synthetic (SIV-like): derived from the key and the
//! plaintext, so encrypting the same content under the same key yields
//! identical bytes on the wire. That keeps the packet hash stable across
//! retries of an unchanged message and needs no nonce bookkeeping.
//! Identical plaintexts are therefore linkable; senders perturb repeats
//! with a timestamp and attempt counter in the first payload bytes.
//!
//! A failed tag check means the candidate key is wrong; the dispatcher
//! relies on this to scan contacts sharing a hash byte.

use crate::error::CryptoError;
use crate::hash::sha256_parts;
use chacha20poly1305::aead::AeadInPlace;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce, Tag};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Nonce size in bytes
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Bytes added to a plaintext by [`seal`]
pub const ENVELOPE_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Symmetric envelope key (32 bytes)
///
/// Holds either a cached ECDH peer secret or a group channel key.
/// Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey([u8; 32]);

impl CipherKey {
    /// Wrap raw key bytes
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build from a slice; `None` unless exactly 32 bytes
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Some(Self(bytes))
    }

    /// Raw key bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for CipherKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn synthetic_nonce(key: &CipherKey, plaintext: &[u8]) -> [u8; NONCE_SIZE] {
    let len = (plaintext.len() as u64).to_le_bytes();
    let digest = sha256_parts(&[b"fern-siv", key.as_bytes(), &len, plaintext]);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&digest[..NONCE_SIZE]);
    nonce
}

/// Encrypt `plaintext` into `out` as `nonce || ciphertext || tag`
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// `CryptoError::BufferTooSmall` if `out` cannot hold
/// `plaintext.len() + ENVELOPE_OVERHEAD` bytes.
pub fn seal(key: &CipherKey, plaintext: &[u8], out: &mut [u8]) -> Result<usize, CryptoError> {
    let total = plaintext.len() + ENVELOPE_OVERHEAD;
    if out.len() < total {
        return Err(CryptoError::BufferTooSmall);
    }

    let nonce_bytes = synthetic_nonce(key, plaintext);
    out[..NONCE_SIZE].copy_from_slice(&nonce_bytes);

    let body = &mut out[NONCE_SIZE..NONCE_SIZE + plaintext.len()];
    body.copy_from_slice(plaintext);

    let cipher =
        ChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKey)?;
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce_bytes), b"", body)
        .map_err(|_| CryptoError::InvalidCiphertext)?;

    out[NONCE_SIZE + plaintext.len()..total].copy_from_slice(&tag);
    Ok(total)
}

/// Decrypt an envelope produced by [`seal`]
///
/// Returns the plaintext length.
///
/// # Errors
///
/// `CryptoError::AuthenticationFailed` if the tag does not verify under
/// `key` (wrong candidate key or tampered data).
pub fn open(key: &CipherKey, envelope: &[u8], out: &mut [u8]) -> Result<usize, CryptoError> {
    if envelope.len() < ENVELOPE_OVERHEAD {
        return Err(CryptoError::InvalidCiphertext);
    }
    let body_len = envelope.len() - ENVELOPE_OVERHEAD;
    if out.len() < body_len {
        return Err(CryptoError::BufferTooSmall);
    }

    let nonce = Nonce::from_slice(&envelope[..NONCE_SIZE]);
    let body = &mut out[..body_len];
    body.copy_from_slice(&envelope[NONCE_SIZE..NONCE_SIZE + body_len]);
    let tag = Tag::from_slice(&envelope[NONCE_SIZE + body_len..]);

    let cipher =
        ChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKey)?;
    cipher
        .decrypt_in_place_detached(nonce, b"", body, tag)
        .map_err(|_| {
            body.zeroize();
            CryptoError::AuthenticationFailed
        })?;

    Ok(body_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = CipherKey::new([0x42; 32]);
        let msg = b"short text message";

        let mut envelope = [0u8; 64];
        let n = seal(&key, msg, &mut envelope).unwrap();
        assert_eq!(n, msg.len() + ENVELOPE_OVERHEAD);

        let mut plain = [0u8; 64];
        let m = open(&key, &envelope[..n], &mut plain).unwrap();
        assert_eq!(&plain[..m], msg);
    }

    #[test]
    fn deterministic_for_same_content() {
        let key = CipherKey::new([7; 32]);
        let mut a = [0u8; 64];
        let mut b = [0u8; 64];
        let n = seal(&key, b"hello", &mut a).unwrap();
        let m = seal(&key, b"hello", &mut b).unwrap();
        assert_eq!(&a[..n], &b[..m]);
    }

    #[test]
    fn wrong_key_rejected() {
        let key = CipherKey::new([1; 32]);
        let other = CipherKey::new([2; 32]);

        let mut envelope = [0u8; 64];
        let n = seal(&key, b"secret", &mut envelope).unwrap();

        let mut plain = [0u8; 64];
        assert_eq!(
            open(&other, &envelope[..n], &mut plain),
            Err(CryptoError::AuthenticationFailed)
        );
    }

    #[test]
    fn tamper_rejected() {
        let key = CipherKey::new([9; 32]);
        let mut envelope = [0u8; 64];
        let n = seal(&key, b"payload", &mut envelope).unwrap();
        envelope[NONCE_SIZE] ^= 0x01;

        let mut plain = [0u8; 64];
        assert_eq!(
            open(&key, &envelope[..n], &mut plain),
            Err(CryptoError::AuthenticationFailed)
        );
    }

    #[test]
    fn short_envelope_rejected() {
        let key = CipherKey::new([3; 32]);
        let mut plain = [0u8; 16];
        assert_eq!(
            open(&key, &[0u8; 10], &mut plain),
            Err(CryptoError::InvalidCiphertext)
        );
    }
}
