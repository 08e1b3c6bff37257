// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Random number generation interface
//!
//! The platform layer supplies an implementation backed by a hardware TRNG
//! or a seeded DRBG; the mesh only needs `fill_bytes` for key generation
//! and small jitter values.

use crate::error::CryptoError;

/// Source of cryptographic-quality randomness
pub trait CryptoRng {
    /// Fill `dest` with random bytes
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::RngFailure` if the underlying source fails
    /// its health checks or is not ready.
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), CryptoError>;

    /// Generate a random u32
    fn next_u32(&mut self) -> Result<u32, CryptoError> {
        let mut buf = [0u8; 4];
        self.fill_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
}
