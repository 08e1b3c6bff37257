// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Chat application
//!
//! Keeps the contact table fresh from signed adverts, composes and
//! acknowledges text messages, learns direct paths from path-returns,
//! and delivers everything user-visible through [`ChatEvents`].
//!
//! Message payload format, shared with the repeater CLI:
//!
//! ```text
//! [timestamp:4 LE] [flags:1] [text...]
//! ```
//!
//! `flags` carries the send attempt in its low two bits; the high bits
//! select the message kind (0 = plain text). The expected ACK is the
//! 4-byte truncated SHA-256 over that payload followed by the sender's
//! public key.

use crate::advert::{AdvertData, ADVERT_DELAY_MS, ADV_KIND_CHAT};
use crate::contact::{ContactInfo, ContactTable};
use fern_common::{log_debug, Error, Result};
use fern_crypto::aead::CipherKey;
use fern_crypto::hash;
use fern_crypto::identity::Identity;
use fern_mesh::channel::{GroupChannel, MAX_GROUP_CHANNELS};
use fern_mesh::codec::MAX_DATAGRAM_PLAINTEXT;
use fern_mesh::mesh::{
    calc_direct_timeout_ms, calc_flood_timeout_ms, MeshApp, MeshCtx, PacketOrigin,
    MAX_CHANNEL_MATCHES, MAX_SEARCH_RESULTS,
};
use fern_mesh::packet::{PayloadType, ACK_HASH_SIZE};
use heapless::Vec;

/// Longest text accepted by `send_message`
pub const MAX_TEXT_LEN: usize = MAX_DATAGRAM_PLAINTEXT - 5;

const LOG_MOD: &str = "chat";

/// How a message left the node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    /// Sent along a learned path; ACK timeout scaled by path length
    SentDirect,
    /// No known path; flooded
    SentFlood,
    /// Could not compose or enqueue
    Failed,
}

/// User-facing callbacks
///
/// All run synchronously inside the cooperative loop; keep them short.
pub trait ChatEvents {
    /// A contact was created or refreshed from a verified advert
    fn on_discovered_contact(&mut self, _contact: &ContactInfo, _is_new: bool) {}

    /// A path-return replaced the contact's out-path
    fn on_contact_path_updated(&mut self, _contact: &ContactInfo) {}

    /// A text message arrived (already ACKed)
    fn on_message_recv(&mut self, _from: &ContactInfo, _is_flood: bool, _timestamp: u32, _text: &str) {
    }

    /// A RESPONSE payload arrived from a known peer (admin replies)
    fn on_response_recv(&mut self, _from: &ContactInfo, _data: &[u8]) {}

    /// A group channel message arrived
    fn on_channel_message_recv(
        &mut self,
        _channel_hash: u8,
        _hops: Option<usize>,
        _timestamp: u32,
        _text: &str,
    ) {
    }

    /// The ACK wait expired; the application may retry with a bumped attempt
    fn on_send_timeout(&mut self) {}
}

/// The chat personality
pub struct ChatApp<E: ChatEvents> {
    /// Known peers
    pub contacts: ContactTable,
    /// Event sink
    pub events: E,
    channels: Vec<GroupChannel, MAX_GROUP_CHANNELS>,
    matching: Vec<u8, MAX_SEARCH_RESULTS>,
    name: &'static str,
}

impl<E: ChatEvents> ChatApp<E> {
    /// New chat app advertising under `name`
    pub fn new(name: &'static str, events: E) -> Self {
        Self {
            contacts: ContactTable::new(),
            events,
            channels: Vec::new(),
            matching: Vec::new(),
            name,
        }
    }

    /// Join a group channel from its base64 pre-shared key
    ///
    /// Returns the channel hash byte.
    ///
    /// # Errors
    ///
    /// `Error::InvalidParameter` for a malformed PSK,
    /// `Error::BufferTooSmall` when the channel table is full.
    pub fn add_channel(&mut self, psk_base64: &str) -> Result<u8> {
        let channel = GroupChannel::from_psk_base64(psk_base64)?;
        let hash = channel.hash;
        self.channels
            .push(channel)
            .map_err(|_| Error::BufferTooSmall)?;
        Ok(hash)
    }

    /// Flood a signed advertisement of this node
    ///
    /// # Errors
    ///
    /// Pool exhaustion or advert encoding failures.
    pub fn send_self_advertisement(&mut self, ctx: &mut MeshCtx<'_>) -> Result<()> {
        let app_data = AdvertData::new(ADV_KIND_CHAT, self.name).encode();
        let pkt = ctx.create_advert(&app_data)?;
        ctx.send_flood(pkt, ADVERT_DELAY_MS)
    }

    /// Compose, encrypt and send a text message to a contact
    ///
    /// Chooses direct when an out-path is known, flood otherwise, and
    /// arms the ACK-wait timer accordingly. `attempt` perturbs the
    /// payload so retries get a fresh packet hash.
    pub fn send_message(
        &mut self,
        ctx: &mut MeshCtx<'_>,
        recipient_idx: usize,
        attempt: u8,
        text: &str,
    ) -> SendResult {
        if text.len() > MAX_TEXT_LEN {
            return SendResult::Failed;
        }
        let Some(contact) = self.contacts.get(recipient_idx) else {
            return SendResult::Failed;
        };

        let mut payload: Vec<u8, MAX_DATAGRAM_PLAINTEXT> = Vec::new();
        let _ = payload.extend_from_slice(&ctx.rtc_now().to_le_bytes());
        let _ = payload.push(attempt & 3);
        let _ = payload.extend_from_slice(text.as_bytes());

        let expected_ack = hash::hash4(&[payload.as_slice(), &ctx.self_id().pub_key]);

        let Ok(pkt) = ctx.create_datagram(PayloadType::TxtMsg, &contact.id, &contact.secret, &payload)
        else {
            return SendResult::Failed;
        };
        let airtime = ctx.est_airtime_ms(pkt.wire_len());

        match contact.out_path.clone() {
            Some(path) => {
                if ctx.send_direct(pkt, &path, 0).is_err() {
                    return SendResult::Failed;
                }
                ctx.start_ack_wait(expected_ack, calc_direct_timeout_ms(airtime, path.len()));
                SendResult::SentDirect
            }
            None => {
                if ctx.send_flood(pkt, 0).is_err() {
                    return SendResult::Failed;
                }
                ctx.start_ack_wait(expected_ack, calc_flood_timeout_ms(airtime));
                SendResult::SentFlood
            }
        }
    }

    /// Send an admin login to a contact: `[timestamp:4][password...]`
    ///
    /// # Errors
    ///
    /// Composition or pool errors; oversized passwords are rejected.
    pub fn send_login(
        &mut self,
        ctx: &mut MeshCtx<'_>,
        recipient_idx: usize,
        password: &str,
    ) -> Result<()> {
        let contact = self.contacts.get(recipient_idx).ok_or(Error::PeerNotFound)?;

        let mut payload: Vec<u8, MAX_DATAGRAM_PLAINTEXT> = Vec::new();
        let _ = payload.extend_from_slice(&ctx.rtc_now().to_le_bytes());
        payload
            .extend_from_slice(password.as_bytes())
            .map_err(|()| Error::BufferTooSmall)?;

        let pkt = ctx.create_anon_req(&contact.id, &payload)?;
        match contact.out_path.clone() {
            Some(path) => ctx.send_direct(pkt, &path, 0),
            None => ctx.send_flood(pkt, 0),
        }
    }

    /// Broadcast a text on a joined group channel
    ///
    /// # Errors
    ///
    /// `Error::NotFound` for an unknown channel hash, composition or
    /// pool errors otherwise.
    pub fn send_channel_message(
        &mut self,
        ctx: &mut MeshCtx<'_>,
        channel_hash: u8,
        text: &str,
    ) -> Result<()> {
        let channel = self
            .channels
            .iter()
            .find(|c| c.hash == channel_hash)
            .ok_or(Error::NotFound)?;

        let mut payload: Vec<u8, MAX_DATAGRAM_PLAINTEXT> = Vec::new();
        let _ = payload.extend_from_slice(&ctx.rtc_now().to_le_bytes());
        let _ = payload.push(0);
        payload
            .extend_from_slice(text.as_bytes())
            .map_err(|()| Error::BufferTooSmall)?;

        let pkt = ctx.create_group_text(channel, &payload)?;
        ctx.send_flood(pkt, 0)
    }

    /// Forget the learned path to a contact
    pub fn reset_path_to(&mut self, idx: usize) {
        self.contacts.reset_path(idx);
    }

    fn contact_idx(&self, peer_idx: usize) -> Option<usize> {
        self.matching.get(peer_idx).map(|&i| i as usize)
    }

    fn send_ack_to(
        ctx: &mut MeshCtx<'_>,
        out_path: Option<&[u8]>,
        ack: [u8; ACK_HASH_SIZE],
    ) {
        let pkt = ctx.create_ack(ack);
        let result = match out_path {
            Some(path) => ctx.send_direct(pkt, path, 0),
            None => ctx.send_flood(pkt, 0),
        };
        if result.is_err() {
            let now = ctx.now_ms();
            log_debug!(ctx.log(), now, LOG_MOD, "ack dropped, pool full");
        }
    }
}

impl<E: ChatEvents> MeshApp for ChatApp<E> {
    fn search_peers_by_hash(&mut self, hash: u8) -> usize {
        self.matching.clear();
        for (i, c) in self.contacts.iter().enumerate() {
            if self.matching.is_full() {
                break;
            }
            if c.id.is_hash_match(hash) {
                let _ = self.matching.push(i as u8);
            }
        }
        self.matching.len()
    }

    fn peer_secret(&self, idx: usize) -> Option<&CipherKey> {
        let i = self.contact_idx(idx)?;
        self.contacts.get(i).map(|c| &c.secret)
    }

    fn search_channels_by_hash(
        &self,
        hash: u8,
        out: &mut Vec<GroupChannel, MAX_CHANNEL_MATCHES>,
    ) -> usize {
        for ch in self.channels.iter() {
            if out.is_full() {
                break;
            }
            if ch.hash == hash {
                let _ = out.push(ch.clone());
            }
        }
        out.len()
    }

    fn on_advert_recv(
        &mut self,
        ctx: &mut MeshCtx<'_>,
        id: &Identity,
        timestamp: u32,
        app_data: &[u8],
    ) {
        let Ok(adv) = AdvertData::decode(app_data) else {
            let now = ctx.now_ms();
            log_debug!(ctx.log(), now, LOG_MOD, "advert app data invalid or nameless");
            return;
        };

        let existing = self.contacts.find_by_id(id);
        if let Some(i) = existing {
            // Strictly monotone: an equal timestamp is a replay
            if timestamp <= self.contacts.get(i).map_or(0, |c| c.last_advert_timestamp) {
                let now = ctx.now_ms();
                log_debug!(ctx.log(), now, LOG_MOD, "advert replay suspected");
                return;
            }
        }

        let (idx, is_new) = match existing {
            Some(i) => (i, false),
            None => match self.contacts.add(ctx.local_identity(), *id) {
                Ok(i) => (i, true),
                Err(_) => {
                    let now = ctx.now_ms();
                    log_debug!(ctx.log(), now, LOG_MOD, "contact table full, advert dropped");
                    return;
                }
            },
        };

        if let Some(c) = self.contacts.get_mut(idx) {
            c.name = adv.name;
            c.kind = adv.kind;
            c.last_advert_timestamp = timestamp;
        }
        if let Some(c) = self.contacts.get(idx) {
            self.events.on_discovered_contact(c, is_new);
        }
    }

    fn on_peer_data_recv(
        &mut self,
        ctx: &mut MeshCtx<'_>,
        payload_type: PayloadType,
        peer_idx: usize,
        data: &[u8],
        origin: &PacketOrigin,
    ) {
        let Some(idx) = self.contact_idx(peer_idx) else {
            return;
        };

        match payload_type {
            PayloadType::TxtMsg if data.len() > 5 => {
                let timestamp = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                let flags = data[4];
                if flags >> 2 != 0 {
                    let now = ctx.now_ms();
                    log_debug!(ctx.log(), now, LOG_MOD, "unsupported txt kind {}", flags >> 2);
                    return;
                }
                let Ok(text) = core::str::from_utf8(&data[5..]) else {
                    return;
                };

                let (ack, id, secret, out_path) = {
                    let Some(c) = self.contacts.get_mut(idx) else {
                        return;
                    };
                    if timestamp <= c.last_timestamp {
                        // Replay: drop silently, produce no ACK
                        return;
                    }
                    c.last_timestamp = timestamp;
                    let ack = hash::hash4(&[data, &c.id.pub_key]);
                    (ack, c.id, c.secret.clone(), c.out_path.clone())
                };

                if origin.is_flood {
                    // Teach the sender our path while carrying the ACK
                    match ctx.create_path_return(
                        &id,
                        &secret,
                        &origin.path,
                        PayloadType::Ack as u8,
                        &ack,
                    ) {
                        Ok(pkt) => {
                            let _ = ctx.send(pkt, 0);
                        }
                        Err(_) => Self::send_ack_to(ctx, None, ack),
                    }
                } else {
                    Self::send_ack_to(ctx, out_path.as_deref(), ack);
                }

                if let Some(c) = self.contacts.get(idx) {
                    self.events.on_message_recv(c, origin.is_flood, timestamp, text);
                }
            }

            PayloadType::Response if data.len() >= 4 => {
                let timestamp = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                let Some(c) = self.contacts.get_mut(idx) else {
                    return;
                };
                if timestamp <= c.last_timestamp {
                    return;
                }
                c.last_timestamp = timestamp;
                if let Some(c) = self.contacts.get(idx) {
                    self.events.on_response_recv(c, &data[4..]);
                }
            }

            _ => {}
        }
    }

    fn on_peer_path_recv(
        &mut self,
        ctx: &mut MeshCtx<'_>,
        peer_idx: usize,
        timestamp: u32,
        path: &[u8],
        extra_type: u8,
        extra: &[u8],
    ) {
        let Some(idx) = self.contact_idx(peer_idx) else {
            return;
        };
        let Some(c) = self.contacts.get_mut(idx) else {
            return;
        };
        if timestamp <= c.last_timestamp {
            let now = ctx.now_ms();
            log_debug!(ctx.log(), now, LOG_MOD, "path replay suspected");
            return;
        }
        c.last_timestamp = timestamp;

        // The newest path wins unconditionally
        c.out_path = Vec::from_slice(path).ok();

        if let Some(c) = self.contacts.get(idx) {
            self.events.on_contact_path_updated(c);
        }
        if extra_type == PayloadType::Response as u8 && extra.len() >= 4 {
            if let Some(c) = self.contacts.get(idx) {
                self.events.on_response_recv(c, &extra[4..]);
            }
        }
    }

    fn on_group_data_recv(
        &mut self,
        _ctx: &mut MeshCtx<'_>,
        channel: &GroupChannel,
        data: &[u8],
        origin: &PacketOrigin,
    ) {
        if data.len() <= 5 || data[4] >> 2 != 0 {
            return;
        }
        let timestamp = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let Ok(text) = core::str::from_utf8(&data[5..]) else {
            return;
        };
        let hops = origin.is_flood.then_some(origin.path.len());
        self.events
            .on_channel_message_recv(channel.hash, hops, timestamp, text);
    }

    fn on_send_timeout(&mut self, _ctx: &mut MeshCtx<'_>) {
        self.events.on_send_timeout();
    }
}
