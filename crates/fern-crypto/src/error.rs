// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Cryptographic error types

use core::fmt;

/// Error type for cryptographic operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid key format or size
    InvalidKey,
    /// Signature verification failed
    InvalidSignature,
    /// Ciphertext is malformed (too short for nonce + tag)
    InvalidCiphertext,
    /// AEAD tag did not verify; the candidate key is wrong or the data is forged
    AuthenticationFailed,
    /// Random number generator failure
    RngFailure,
    /// Output buffer too small
    BufferTooSmall,
}

impl CryptoError {
    /// Short description for diagnostics
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::InvalidKey => "invalid key",
            Self::InvalidSignature => "invalid signature",
            Self::InvalidCiphertext => "invalid ciphertext",
            Self::AuthenticationFailed => "authentication failed",
            Self::RngFailure => "RNG failure",
            Self::BufferTooSmall => "buffer too small",
        }
    }
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl From<CryptoError> for fern_common::Error {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidKey => Self::InvalidKey,
            CryptoError::InvalidSignature => Self::InvalidSignature,
            CryptoError::InvalidCiphertext | CryptoError::AuthenticationFailed => Self::DecryptFailed,
            CryptoError::RngFailure => Self::RngFailure,
            CryptoError::BufferTooSmall => Self::BufferTooSmall,
        }
    }
}
