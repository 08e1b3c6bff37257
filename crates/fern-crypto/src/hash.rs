// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! SHA-256 helpers
//!
//! The wire protocol uses two truncations of SHA-256: 8 bytes for the
//! packet hash (dedup and forwarding suppression) and 4 bytes for ACK
//! references. Truncation lengths are part of the wire format; do not
//! change them without revisiting the ACK collision analysis.

use sha2::{Digest, Sha256};

/// SHA-256 over a list of segments, as if they were concatenated
#[must_use]
pub fn sha256_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    hasher.finalize().into()
}

/// SHA-256 of a single message
#[must_use]
pub fn sha256(msg: &[u8]) -> [u8; 32] {
    sha256_parts(&[msg])
}

/// 8-byte truncated digest (packet hash)
#[must_use]
pub fn hash8(parts: &[&[u8]]) -> [u8; 8] {
    let full = sha256_parts(parts);
    let mut out = [0u8; 8];
    out.copy_from_slice(&full[..8]);
    out
}

/// 4-byte truncated digest (ACK hash)
#[must_use]
pub fn hash4(parts: &[&[u8]]) -> [u8; 4] {
    let full = sha256_parts(parts);
    let mut out = [0u8; 4];
    out.copy_from_slice(&full[..4]);
    out
}
