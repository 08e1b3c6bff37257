// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Packet construction and envelope handling
//!
//! Payload layouts by type (the payload is everything after the path):
//!
//! ```text
//! Advert:   [pub:32] [timestamp:4 LE] [sig:64] [app_data...]     plaintext
//! AnonReq:  [dest_hash:1] [sender_pub:32] [envelope]
//! Req/Response/TxtMsg:
//!           [dest_hash:1] [src_hash:1] [envelope]
//! Path:     [dest_hash:1] [src_hash:1] [envelope of
//!               [timestamp:4 LE] [path_len:1] [path] [extra_type:1] [extra...]]
//! Ack:      [ack_hash:4]                                         plaintext
//! GrpTxt:   [channel_hash:1] [envelope]
//! ```
//!
//! The packet hash is SHA-256 over the payload-type byte and the payload,
//! truncated to 8 bytes. The path is deliberately excluded: it grows at
//! every re-flood and the hash must stay stable for dedup to work.

use crate::channel::GroupChannel;
use crate::packet::{
    Packet, PayloadType, RouteKind, ACK_HASH_SIZE, MAX_PACKET_PAYLOAD, MAX_PATH_SIZE,
    PACKET_HASH_SIZE,
};
use fern_common::{Error, Result};
use fern_crypto::aead::{self, CipherKey, ENVELOPE_OVERHEAD};
use fern_crypto::hash;
use fern_crypto::identity::{Identity, LocalIdentity, PUB_KEY_SIZE, SIGNATURE_SIZE};
use heapless::Vec;

/// Largest plaintext in a peer datagram
pub const MAX_DATAGRAM_PLAINTEXT: usize = MAX_PACKET_PAYLOAD - 2 - ENVELOPE_OVERHEAD;

/// Largest plaintext in an anonymous request
pub const MAX_ANON_PLAINTEXT: usize = MAX_PACKET_PAYLOAD - 1 - PUB_KEY_SIZE - ENVELOPE_OVERHEAD;

/// Largest advert application data blob
pub const MAX_ADVERT_DATA: usize = MAX_PACKET_PAYLOAD - PUB_KEY_SIZE - 4 - SIGNATURE_SIZE;

/// Largest plaintext in a group text
pub const MAX_GROUP_PLAINTEXT: usize = MAX_PACKET_PAYLOAD - 1 - ENVELOPE_OVERHEAD;

/// Marker for "no piggy-backed payload" in a path-return
pub const PATH_EXTRA_NONE: u8 = 0xFF;

/// The packet's identity on the wire: dedup key and forwarding suppressor
#[must_use]
pub fn packet_hash(pkt: &Packet) -> [u8; PACKET_HASH_SIZE] {
    hash::hash8(&[&[pkt.payload_type as u8], pkt.payload.as_slice()])
}

fn seal_into(
    payload: &mut Vec<u8, MAX_PACKET_PAYLOAD>,
    key: &CipherKey,
    plaintext: &[u8],
) -> Result<()> {
    let start = payload.len();
    let total = plaintext.len() + ENVELOPE_OVERHEAD;
    payload
        .resize(start + total, 0)
        .map_err(|()| Error::BufferTooSmall)?;
    aead::seal(key, plaintext, &mut payload[start..])?;
    Ok(())
}

/// Decrypt an envelope, yielding the plaintext
///
/// # Errors
///
/// `Error::DecryptFailed` when the candidate key does not authenticate.
pub fn open_envelope(key: &CipherKey, envelope: &[u8]) -> Result<Vec<u8, MAX_PACKET_PAYLOAD>> {
    let mut out: Vec<u8, MAX_PACKET_PAYLOAD> = Vec::new();
    let body_len = envelope.len().saturating_sub(ENVELOPE_OVERHEAD);
    out.resize(body_len, 0).map_err(|()| Error::BufferTooSmall)?;
    let n = aead::open(key, envelope, &mut out)?;
    out.truncate(n);
    Ok(out)
}

/// Build an encrypted peer datagram (REQ, RESPONSE or TXT_MSG)
///
/// Route defaults to flood; the send path overrides it for direct sends.
///
/// # Errors
///
/// `Error::BufferTooSmall` if the plaintext exceeds
/// [`MAX_DATAGRAM_PLAINTEXT`].
pub fn make_datagram(
    payload_type: PayloadType,
    dest: &Identity,
    src: &Identity,
    secret: &CipherKey,
    plaintext: &[u8],
) -> Result<Packet> {
    if plaintext.len() > MAX_DATAGRAM_PLAINTEXT {
        return Err(Error::BufferTooSmall);
    }
    let mut pkt = Packet::new(RouteKind::Flood, payload_type);
    let _ = pkt.payload.push(dest.hash_id());
    let _ = pkt.payload.push(src.hash_id());
    seal_into(&mut pkt.payload, secret, plaintext)?;
    Ok(pkt)
}

/// Build an anonymous request carrying the sender's public key
///
/// # Errors
///
/// `Error::InvalidKey` if `dest` is not a valid curve point,
/// `Error::BufferTooSmall` if the plaintext is oversized.
pub fn make_anon_req(
    dest: &Identity,
    sender: &LocalIdentity,
    plaintext: &[u8],
) -> Result<Packet> {
    if plaintext.len() > MAX_ANON_PLAINTEXT {
        return Err(Error::BufferTooSmall);
    }
    let secret = sender.shared_secret(dest)?;
    let mut pkt = Packet::new(RouteKind::Flood, PayloadType::AnonReq);
    let _ = pkt.payload.push(dest.hash_id());
    let _ = pkt.payload.extend_from_slice(&sender.identity().pub_key);
    seal_into(&mut pkt.payload, &secret, plaintext)?;
    Ok(pkt)
}

/// Build a 4-byte acknowledgement
#[must_use]
pub fn make_ack(ack_hash: [u8; ACK_HASH_SIZE]) -> Packet {
    let mut pkt = Packet::new(RouteKind::Flood, PayloadType::Ack);
    let _ = pkt.payload.extend_from_slice(&ack_hash);
    pkt
}

/// Build a signed advertisement
///
/// # Errors
///
/// `Error::BufferTooSmall` if `app_data` exceeds [`MAX_ADVERT_DATA`].
pub fn make_advert(local: &LocalIdentity, timestamp: u32, app_data: &[u8]) -> Result<Packet> {
    if app_data.len() > MAX_ADVERT_DATA {
        return Err(Error::BufferTooSmall);
    }

    let ts = timestamp.to_le_bytes();
    let mut signed: Vec<u8, { PUB_KEY_SIZE + 4 + MAX_ADVERT_DATA }> = Vec::new();
    let _ = signed.extend_from_slice(&local.identity().pub_key);
    let _ = signed.extend_from_slice(&ts);
    let _ = signed.extend_from_slice(app_data);
    let sig = local.sign(&signed);

    let mut pkt = Packet::new(RouteKind::Flood, PayloadType::Advert);
    let _ = pkt.payload.extend_from_slice(&local.identity().pub_key);
    let _ = pkt.payload.extend_from_slice(&ts);
    let _ = pkt.payload.extend_from_slice(&sig);
    let _ = pkt.payload.extend_from_slice(app_data);
    Ok(pkt)
}

/// Parse and verify an advertisement payload
///
/// The signature is checked before anything is returned, so callers can
/// never act on an unverified identity.
///
/// # Errors
///
/// `Error::InvalidAdvert` on truncation or signature failure.
pub fn decode_advert(payload: &[u8]) -> Result<(Identity, u32, &[u8])> {
    const HEAD: usize = PUB_KEY_SIZE + 4 + SIGNATURE_SIZE;
    if payload.len() < HEAD {
        return Err(Error::InvalidAdvert);
    }

    let mut pub_key = [0u8; PUB_KEY_SIZE];
    pub_key.copy_from_slice(&payload[..PUB_KEY_SIZE]);
    let id = Identity::new(pub_key);

    let timestamp = u32::from_le_bytes([
        payload[PUB_KEY_SIZE],
        payload[PUB_KEY_SIZE + 1],
        payload[PUB_KEY_SIZE + 2],
        payload[PUB_KEY_SIZE + 3],
    ]);

    let mut sig = [0u8; SIGNATURE_SIZE];
    sig.copy_from_slice(&payload[PUB_KEY_SIZE + 4..HEAD]);
    let app_data = &payload[HEAD..];

    let mut signed: Vec<u8, { PUB_KEY_SIZE + 4 + MAX_ADVERT_DATA }> = Vec::new();
    let _ = signed.extend_from_slice(&payload[..PUB_KEY_SIZE + 4]);
    signed
        .extend_from_slice(app_data)
        .map_err(|()| Error::InvalidAdvert)?;

    if !id.verify(&signed, &sig) {
        return Err(Error::InvalidAdvert);
    }
    Ok((id, timestamp, app_data))
}

/// Build a path-return: a reply routed back along a reversed flood path
///
/// The wire path is the reverse of `inbound_path` (the hops back to the
/// flood's origin); the encrypted body carries `inbound_path` in its
/// original orientation, which is exactly the out-path the origin should
/// store for future direct sends. `timestamp` feeds the recipient's
/// replay guard. An optional `extra` piggy-backs an ACK or response.
///
/// # Errors
///
/// `Error::PathTooLong` if `inbound_path` exceeds the hop cap,
/// `Error::BufferTooSmall` if the extra payload is oversized.
pub fn make_path_return(
    dest: &Identity,
    src: &Identity,
    secret: &CipherKey,
    inbound_path: &[u8],
    timestamp: u32,
    extra_type: u8,
    extra: &[u8],
) -> Result<Packet> {
    if inbound_path.len() > MAX_PATH_SIZE {
        return Err(Error::PathTooLong);
    }

    let mut plain: Vec<u8, MAX_DATAGRAM_PLAINTEXT> = Vec::new();
    plain
        .extend_from_slice(&timestamp.to_le_bytes())
        .map_err(|()| Error::BufferTooSmall)?;
    let _ = plain.push(inbound_path.len() as u8);
    plain
        .extend_from_slice(inbound_path)
        .map_err(|()| Error::BufferTooSmall)?;
    let _ = plain.push(extra_type);
    plain
        .extend_from_slice(extra)
        .map_err(|()| Error::BufferTooSmall)?;

    let mut pkt = Packet::new(RouteKind::Response, PayloadType::Path);
    let _ = pkt.payload.push(dest.hash_id());
    let _ = pkt.payload.push(src.hash_id());
    seal_into(&mut pkt.payload, secret, &plain)?;

    for hop in inbound_path.iter().rev() {
        let _ = pkt.path.push(*hop);
    }
    Ok(pkt)
}

/// Decoded body of a path-return
pub struct PathReturn<'a> {
    /// Sender timestamp for the replay guard
    pub timestamp: u32,
    /// Out-path the recipient should store, origin-to-sender orientation
    pub path: &'a [u8],
    /// Type of the piggy-backed payload, or [`PATH_EXTRA_NONE`]
    pub extra_type: u8,
    /// Piggy-backed payload bytes
    pub extra: &'a [u8],
}

/// Parse a decrypted path-return body
///
/// # Errors
///
/// `Error::InvalidPacket` on truncation or an oversized embedded path.
pub fn decode_path_return(plain: &[u8]) -> Result<PathReturn<'_>> {
    if plain.len() < 6 {
        return Err(Error::InvalidPacket);
    }
    let timestamp = u32::from_le_bytes([plain[0], plain[1], plain[2], plain[3]]);
    let path_len = plain[4] as usize;
    if path_len > MAX_PATH_SIZE || plain.len() < 5 + path_len + 1 {
        return Err(Error::InvalidPacket);
    }
    let path = &plain[5..5 + path_len];
    let extra_type = plain[5 + path_len];
    let extra = &plain[5 + path_len + 1..];
    Ok(PathReturn {
        timestamp,
        path,
        extra_type,
        extra,
    })
}

/// Build an encrypted group text
///
/// # Errors
///
/// `Error::BufferTooSmall` if the plaintext exceeds
/// [`MAX_GROUP_PLAINTEXT`].
pub fn make_group_text(channel: &GroupChannel, plaintext: &[u8]) -> Result<Packet> {
    if plaintext.len() > MAX_GROUP_PLAINTEXT {
        return Err(Error::BufferTooSmall);
    }
    let mut pkt = Packet::new(RouteKind::Flood, PayloadType::GrpTxt);
    let _ = pkt.payload.push(channel.hash);
    seal_into(&mut pkt.payload, channel.secret(), plaintext)?;
    Ok(pkt)
}
