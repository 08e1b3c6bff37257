// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! FernMesh cryptography
//!
//! The cryptographic surface of a mesh node:
//!
//! - **Identity**: long-term Ed25519 keypair; adverts are signed with it,
//!   per-peer secrets are derived from it via X25519
//! - **Envelope**: authenticated encryption of packet payloads under a
//!   peer secret or a group channel key
//! - **Hashing**: SHA-256 with the truncated forms used on the wire
//!
//! All types are no_std and allocation-free. Secret material is zeroized
//! on drop and never logged.

#![no_std]
#![warn(missing_docs)]

pub mod aead;
pub mod error;
pub mod hash;
pub mod identity;
pub mod rng;

pub use aead::{CipherKey, ENVELOPE_OVERHEAD};
pub use error::CryptoError;
pub use identity::{Identity, LocalIdentity, IDENTITY_BLOB_SIZE, PUB_KEY_SIZE, SIGNATURE_SIZE};
pub use rng::CryptoRng;
