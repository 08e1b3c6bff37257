// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Error types for FernMesh
//!
//! One unified error enum, no_std compatible, no heap allocation.
//! Every failure on the mesh hot path is converted into one of these and
//! then into a counter increment or a debug log line; nothing propagates
//! out of the cooperative loop.

use core::fmt;

/// Result type alias for FernMesh operations
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for FernMesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Cryptographic errors (0x01xx)
    // =========================================================================
    /// Invalid key format or size
    InvalidKey,
    /// Signature verification failed
    InvalidSignature,
    /// Payload did not authenticate under the candidate key
    DecryptFailed,
    /// Random number generator failure
    RngFailure,

    // =========================================================================
    // Packet / routing errors (0x02xx)
    // =========================================================================
    /// Frame could not be parsed into a packet
    InvalidPacket,
    /// Path would exceed the hop cap
    PathTooLong,
    /// Advertisement malformed or unsigned
    InvalidAdvert,
    /// Timestamp not strictly newer than the last one seen from this peer
    ReplaySuspected,

    // =========================================================================
    // Resource errors (0x03xx)
    // =========================================================================
    /// Packet pool has no free slot
    PoolExhausted,
    /// Contact or client table is at capacity
    ContactTableFull,
    /// Peer not found in the contact table
    PeerNotFound,

    // =========================================================================
    // Radio errors (0x04xx)
    // =========================================================================
    /// Radio failed to initialize (fatal at boot)
    RadioInitFailed,
    /// Radio rejected the outbound frame
    RadioTxFailed,

    // =========================================================================
    // Command errors (0x05xx)
    // =========================================================================
    /// Command not recognized; reply with the help string
    UnknownCommand,

    // =========================================================================
    // General errors (0xFFxx)
    // =========================================================================
    /// Buffer too small for the operation
    BufferTooSmall,
    /// Invalid parameter supplied
    InvalidParameter,
    /// Requested item not found
    NotFound,
    /// Invalid state for the operation
    InvalidState,
}

impl Error {
    /// Get the numeric code for this error
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::InvalidKey => 0x0101,
            Self::InvalidSignature => 0x0102,
            Self::DecryptFailed => 0x0103,
            Self::RngFailure => 0x0104,

            Self::InvalidPacket => 0x0201,
            Self::PathTooLong => 0x0202,
            Self::InvalidAdvert => 0x0203,
            Self::ReplaySuspected => 0x0204,

            Self::PoolExhausted => 0x0301,
            Self::ContactTableFull => 0x0302,
            Self::PeerNotFound => 0x0303,

            Self::RadioInitFailed => 0x0401,
            Self::RadioTxFailed => 0x0402,

            Self::UnknownCommand => 0x0501,

            Self::BufferTooSmall => 0xFF01,
            Self::InvalidParameter => 0xFF02,
            Self::NotFound => 0xFF03,
            Self::InvalidState => 0xFF04,
        }
    }

    /// Check if this error indicates a possible attack
    #[must_use]
    pub const fn is_security_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature | Self::DecryptFailed | Self::ReplaySuspected | Self::InvalidAdvert
        )
    }

    /// Get a short description of the error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::InvalidKey => "invalid key",
            Self::InvalidSignature => "signature verification failed",
            Self::DecryptFailed => "payload did not authenticate",
            Self::RngFailure => "RNG failure",
            Self::InvalidPacket => "malformed packet",
            Self::PathTooLong => "path exceeds hop cap",
            Self::InvalidAdvert => "invalid advertisement",
            Self::ReplaySuspected => "replay suspected",
            Self::PoolExhausted => "packet pool exhausted",
            Self::ContactTableFull => "contact table full",
            Self::PeerNotFound => "peer not found",
            Self::RadioInitFailed => "radio init failed",
            Self::RadioTxFailed => "radio TX failed",
            Self::UnknownCommand => "unknown command",
            Self::BufferTooSmall => "buffer too small",
            Self::InvalidParameter => "invalid parameter",
            Self::NotFound => "not found",
            Self::InvalidState => "invalid state",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:04X}] {}", self.code(), self.description())
    }
}
