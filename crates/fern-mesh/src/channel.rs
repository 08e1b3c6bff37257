// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Group channels
//!
//! A group channel is a symmetric pre-shared key plus a one-byte channel
//! hash (the first byte of SHA-256 of the decoded key). Membership is
//! static configuration: whoever was given the PSK is in the group.
//! Inbound group text tries every configured channel whose hash byte
//! matches; the envelope tag decides which one actually applies.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use fern_crypto::aead::CipherKey;
use fern_crypto::hash::sha256;
use fern_common::{Error, Result};

/// Maximum configured group channels per node
pub const MAX_GROUP_CHANNELS: usize = 8;

/// A symmetric broadcast group
#[derive(Clone)]
pub struct GroupChannel {
    /// One-byte wire tag: `SHA-256(key)[0]`
    pub hash: u8,
    secret: CipherKey,
}

impl GroupChannel {
    /// Decode a base64 pre-shared key of 16 or 32 bytes
    ///
    /// A 16-byte PSK is stretched to the 32-byte envelope key size by
    /// hashing; the channel hash is always computed over the decoded PSK.
    ///
    /// # Errors
    ///
    /// `Error::InvalidParameter` if the input is not valid base64 of an
    /// accepted key length.
    pub fn from_psk_base64(psk_base64: &str) -> Result<Self> {
        let mut decoded = [0u8; 33];
        let len = BASE64
            .decode_slice(psk_base64.as_bytes(), &mut decoded)
            .map_err(|_| Error::InvalidParameter)?;
        if len != 16 && len != 32 {
            return Err(Error::InvalidParameter);
        }

        let hash = sha256(&decoded[..len])[0];
        let secret = if len == 32 {
            CipherKey::from_slice(&decoded[..32]).ok_or(Error::InvalidParameter)?
        } else {
            CipherKey::new(sha256(&decoded[..16]))
        };

        Ok(Self { hash, secret })
    }

    /// The envelope key for this channel
    #[must_use]
    pub const fn secret(&self) -> &CipherKey {
        &self.secret
    }
}
