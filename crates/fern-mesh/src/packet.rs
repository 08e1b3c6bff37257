// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Wire packet format
//!
//! Frame layout:
//!
//! ```text
//! [header:1] [path_len:1] [path:path_len] [payload:rest]
//! ```
//!
//! The header byte packs, MSB to LSB: version (2 bits), payload type
//! (4 bits), route kind (2 bits). These values are the wire contract;
//! interoperability depends on them not moving.

use fern_common::{Error, Result};
use heapless::Vec;

/// Hop cap: a path never grows beyond this many hash bytes
pub const MAX_PATH_SIZE: usize = 8;

/// Maximum payload bytes after the path
pub const MAX_PACKET_PAYLOAD: usize = 184;

/// Largest possible frame on the wire
pub const MAX_FRAME_SIZE: usize = 2 + MAX_PATH_SIZE + MAX_PACKET_PAYLOAD;

/// Bytes of truncated SHA-256 identifying a packet (dedup, suppression)
pub const PACKET_HASH_SIZE: usize = 8;

/// Bytes of truncated SHA-256 in an ACK payload
pub const ACK_HASH_SIZE: usize = 4;

/// How a packet travels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RouteKind {
    /// Re-broadcast by every node that has not seen it, growing the path
    Flood = 0b00,
    /// Unicast along a prepended source route of hop hashes
    Direct = 0b01,
    /// A reply routed like [`RouteKind::Direct`] along a reversed flood path
    Response = 0b10,
}

impl RouteKind {
    /// Decode the two route bits
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0b11 {
            0b00 => Some(Self::Flood),
            0b01 => Some(Self::Direct),
            0b10 => Some(Self::Response),
            _ => None,
        }
    }

    /// Forwarded by next-hop stripping rather than re-flooding?
    #[must_use]
    pub const fn is_direct(&self) -> bool {
        matches!(self, Self::Direct | Self::Response)
    }
}

/// What the payload contains and which key opens it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadType {
    /// Request from a known (authenticated) peer
    Req = 0,
    /// Reply to a `Req` or `AnonReq`
    Response = 1,
    /// 4-byte acknowledgement, plaintext
    Ack = 2,
    /// Signed identity announcement, plaintext
    Advert = 3,
    /// First-contact request carrying the sender's public key
    AnonReq = 4,
    /// Path-return teaching the recipient a direct route
    Path = 5,
    /// Text message between known peers
    TxtMsg = 6,
    /// Group channel text under a pre-shared key
    GrpTxt = 7,
}

impl PayloadType {
    /// Decode the four payload-type bits
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0x0F {
            0 => Some(Self::Req),
            1 => Some(Self::Response),
            2 => Some(Self::Ack),
            3 => Some(Self::Advert),
            4 => Some(Self::AnonReq),
            5 => Some(Self::Path),
            6 => Some(Self::TxtMsg),
            7 => Some(Self::GrpTxt),
            _ => None,
        }
    }
}

/// A mesh packet, in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Routing discipline
    pub route: RouteKind,
    /// Payload classification
    pub payload_type: PayloadType,
    /// Protocol version bits (currently 0)
    pub version: u8,
    /// Hop hashes accumulated (flood) or remaining (direct)
    pub path: Vec<u8, MAX_PATH_SIZE>,
    /// Everything after the path
    pub payload: Vec<u8, MAX_PACKET_PAYLOAD>,
}

impl Packet {
    /// Empty packet of the given kind
    #[must_use]
    pub fn new(route: RouteKind, payload_type: PayloadType) -> Self {
        Self {
            route,
            payload_type,
            version: 0,
            path: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Pack the header byte
    #[must_use]
    pub fn header_byte(&self) -> u8 {
        ((self.version & 0b11) << 6) | ((self.payload_type as u8) << 2) | (self.route as u8)
    }

    /// Is this a flood-routed packet?
    #[must_use]
    pub fn is_route_flood(&self) -> bool {
        self.route == RouteKind::Flood
    }

    /// Serialized size on the wire
    #[must_use]
    pub fn wire_len(&self) -> usize {
        2 + self.path.len() + self.payload.len()
    }

    /// Serialize for transmission
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8, MAX_FRAME_SIZE> {
        let mut out = Vec::new();
        // Capacity is MAX_FRAME_SIZE by construction; pushes cannot fail.
        let _ = out.push(self.header_byte());
        let _ = out.push(self.path.len() as u8);
        let _ = out.extend_from_slice(&self.path);
        let _ = out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a received frame
    ///
    /// # Errors
    ///
    /// `Error::InvalidPacket` for anything that does not parse: short
    /// frames, unknown header bits, or a path length beyond the hop cap.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(Error::InvalidPacket);
        }

        let header = data[0];
        let route = RouteKind::from_bits(header & 0b11).ok_or(Error::InvalidPacket)?;
        let payload_type = PayloadType::from_bits((header >> 2) & 0x0F).ok_or(Error::InvalidPacket)?;
        let version = (header >> 6) & 0b11;

        let path_len = data[1] as usize;
        if path_len > MAX_PATH_SIZE || data.len() < 2 + path_len {
            return Err(Error::InvalidPacket);
        }

        let path = Vec::from_slice(&data[2..2 + path_len]).map_err(|()| Error::InvalidPacket)?;
        let payload =
            Vec::from_slice(&data[2 + path_len..]).map_err(|()| Error::InvalidPacket)?;

        Ok(Self {
            route,
            payload_type,
            version,
            path,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_bit_layout() {
        // Normative example: flood-routed text message, version 0
        let mut p = Packet::new(RouteKind::Flood, PayloadType::TxtMsg);
        assert_eq!(p.header_byte(), 0b00_0110_00);

        p.route = RouteKind::Direct;
        p.payload_type = PayloadType::Ack;
        assert_eq!(p.header_byte(), 0b00_0010_01);
    }

    #[test]
    fn wire_roundtrip() {
        let mut p = Packet::new(RouteKind::Flood, PayloadType::AnonReq);
        p.path.extend_from_slice(&[0xAA, 0xBB]).unwrap();
        p.payload.extend_from_slice(b"ciphertext").unwrap();

        let bytes = p.to_bytes();
        assert_eq!(bytes.len(), p.wire_len());

        let q = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(p, q);
    }

    #[test]
    fn rejects_bad_frames() {
        // Too short
        assert!(Packet::from_bytes(&[0x00]).is_err());

        // Path length beyond the cap
        let bad = [0x00, (MAX_PATH_SIZE + 1) as u8, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(Packet::from_bytes(&bad).is_err());

        // Path length longer than the frame
        assert!(Packet::from_bytes(&[0x00, 4, 1, 2]).is_err());

        // Reserved route bits
        assert!(Packet::from_bytes(&[0b0000_0011, 0]).is_err());
    }

    #[test]
    fn route_kinds_forwarded_by_next_hop() {
        assert!(!RouteKind::Flood.is_direct());
        assert!(RouteKind::Direct.is_direct());
        assert!(RouteKind::Response.is_direct());
    }

    #[test]
    fn payload_type_bits_are_stable() {
        // Wire contract: these values must never change
        assert_eq!(PayloadType::Req as u8, 0);
        assert_eq!(PayloadType::Response as u8, 1);
        assert_eq!(PayloadType::Ack as u8, 2);
        assert_eq!(PayloadType::Advert as u8, 3);
        assert_eq!(PayloadType::AnonReq as u8, 4);
        assert_eq!(PayloadType::Path as u8, 5);
        assert_eq!(PayloadType::TxtMsg as u8, 6);
        assert_eq!(PayloadType::GrpTxt as u8, 7);
    }
}
