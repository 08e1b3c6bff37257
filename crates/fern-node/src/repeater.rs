// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Repeater application
//!
//! An unattended relay node. It forwards everything the mesh allows and
//! serves a small authenticated admin surface:
//!
//! - **Login** (ANON_REQ): `[timestamp:4][password...]`. A correct
//!   password inserts the sender into the client table with a cached
//!   ECDH secret and replies `"OK"`.
//! - **Requests** (REQ): `[timestamp:4][cmd:1][args...]` from known
//!   clients; `GET_STATS` returns a fixed binary struct.
//! - **CLI over text** (TXT_MSG): `[timestamp:4][flags:1][text]`; the
//!   text goes to the command handler, the reply comes back as a text
//!   message after a spacing delay.
//!
//! Every authenticated path carries the sender's timestamp and is
//! checked against a strictly-monotone per-client guard, including
//! path-returns.

use crate::advert::{AdvertData, ADVERT_DELAY_MS, ADV_KIND_REPEATER};
use crate::hal::Board;
use fern_common::{log_debug, log_info};
use fern_common::{AdvertConfig, NodeConfig, Result};
use fern_crypto::aead::CipherKey;
use fern_crypto::hash;
use fern_crypto::identity::Identity;
use fern_mesh::codec::MAX_DATAGRAM_PLAINTEXT;
use fern_mesh::mesh::{MeshApp, MeshCtx, PacketOrigin, MAX_SEARCH_RESULTS};
use fern_mesh::packet::{PayloadType, MAX_PATH_SIZE};
use heapless::{String, Vec};

/// Admin client table capacity
pub const MAX_CLIENTS: usize = 4;

/// Spacing between the CLI ACK and the reply text
pub const CLI_REPLY_DELAY_MS: u32 = 1500;

/// Request opcode: fetch the stats struct
pub const CMD_GET_STATS: u8 = 0x01;

/// Longest CLI reply text
pub const MAX_REPLY_LEN: usize = 140;

const LOG_MOD: &str = "repeater";

/// An authenticated admin client
pub struct ClientInfo {
    /// Client identity
    pub id: Identity,
    /// Cached ECDH secret
    pub secret: CipherKey,
    /// Strictly-monotone replay guard across all request kinds
    pub last_timestamp: u32,
    /// Learned route back to the client
    pub out_path: Option<Vec<u8, MAX_PATH_SIZE>>,
}

/// Binary stats reply, 44 bytes little-endian
#[derive(Debug, Clone, Copy, Default)]
pub struct RepeaterStats {
    /// Battery voltage in millivolts
    pub batt_milli_volts: u16,
    /// Packets waiting to transmit
    pub curr_tx_queue_len: u16,
    /// Free packet slots
    pub curr_free_queue_len: u16,
    /// RSSI of the last reception in dBm
    pub last_rssi: i16,
    /// Frames received since boot
    pub n_packets_recv: u32,
    /// Frames transmitted since boot
    pub n_packets_sent: u32,
    /// Cumulative on-air time in seconds
    pub total_air_time_secs: u32,
    /// Uptime in seconds
    pub total_up_time_secs: u32,
    /// Flood packets transmitted
    pub n_sent_flood: u32,
    /// Direct packets transmitted
    pub n_sent_direct: u32,
    /// Flood packets received for us
    pub n_recv_flood: u32,
    /// Direct packets received for us
    pub n_recv_direct: u32,
    /// Pool allocation failures
    pub n_full_events: u32,
}

impl RepeaterStats {
    /// Serialized size
    pub const SIZE: usize = 44;

    /// Fixed little-endian layout for the `GET_STATS` reply
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.batt_milli_volts.to_le_bytes());
        out[2..4].copy_from_slice(&self.curr_tx_queue_len.to_le_bytes());
        out[4..6].copy_from_slice(&self.curr_free_queue_len.to_le_bytes());
        out[6..8].copy_from_slice(&self.last_rssi.to_le_bytes());
        out[8..12].copy_from_slice(&self.n_packets_recv.to_le_bytes());
        out[12..16].copy_from_slice(&self.n_packets_sent.to_le_bytes());
        out[16..20].copy_from_slice(&self.total_air_time_secs.to_le_bytes());
        out[20..24].copy_from_slice(&self.total_up_time_secs.to_le_bytes());
        out[24..28].copy_from_slice(&self.n_sent_flood.to_le_bytes());
        out[28..32].copy_from_slice(&self.n_sent_direct.to_le_bytes());
        out[32..36].copy_from_slice(&self.n_recv_flood.to_le_bytes());
        out[36..40].copy_from_slice(&self.n_recv_direct.to_le_bytes());
        out[40..44].copy_from_slice(&self.n_full_events.to_le_bytes());
        out
    }
}

/// The repeater personality
pub struct RepeaterApp<B: Board> {
    pub(crate) board: B,
    pub(crate) advert: AdvertConfig,
    pub(crate) airtime_factor: f32,
    admin_password: &'static str,
    clients: Vec<ClientInfo, MAX_CLIENTS>,
    matching: Vec<u8, MAX_SEARCH_RESULTS>,
    logins_ok: u32,
}

impl<B: Board> RepeaterApp<B> {
    /// Build from node configuration
    pub fn new(cfg: &NodeConfig, board: B) -> Self {
        Self {
            board,
            advert: cfg.advert,
            airtime_factor: cfg.airtime_factor,
            admin_password: cfg.admin_password,
            clients: Vec::new(),
            matching: Vec::new(),
            logins_ok: 0,
        }
    }

    /// Known admin clients
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Successful logins since boot
    #[must_use]
    pub const fn login_count(&self) -> u32 {
        self.logins_ok
    }

    /// Current airtime budget factor
    #[must_use]
    pub const fn airtime_factor(&self) -> f32 {
        self.airtime_factor
    }

    /// Flood a signed advertisement of this repeater
    ///
    /// # Errors
    ///
    /// Pool exhaustion or advert encoding failures.
    pub fn send_self_advertisement(&mut self, ctx: &mut MeshCtx<'_>) -> Result<()> {
        let mut adv = AdvertData::new(ADV_KIND_REPEATER, self.advert.name);
        if self.advert.lat != 0.0 || self.advert.lon != 0.0 {
            adv = adv.with_location(self.advert.lat, self.advert.lon);
        }
        let pkt = ctx.create_advert(&adv.encode())?;
        ctx.send_flood(pkt, ADVERT_DELAY_MS)
    }

    fn put_client(&mut self, ctx: &MeshCtx<'_>, id: &Identity) -> Option<usize> {
        if let Some(i) = self.clients.iter().position(|c| c.id.matches(id)) {
            return Some(i);
        }
        if self.clients.is_full() {
            return None;
        }
        let secret = ctx.shared_secret(id).ok()?;
        let _ = self.clients.push(ClientInfo {
            id: *id,
            secret,
            last_timestamp: 0,
            out_path: None,
        });
        Some(self.clients.len() - 1)
    }

    /// Serve a request from an authenticated client; empty means unknown
    fn handle_request(
        &mut self,
        ctx: &MeshCtx<'_>,
        payload: &[u8],
    ) -> Vec<u8, MAX_DATAGRAM_PLAINTEXT> {
        let mut reply: Vec<u8, MAX_DATAGRAM_PLAINTEXT> = Vec::new();
        if payload.is_empty() {
            return reply;
        }

        match payload[0] {
            CMD_GET_STATS => {
                let link = ctx.link();
                let stats = ctx.stats();
                let snapshot = RepeaterStats {
                    batt_milli_volts: self.board.batt_milli_volts(),
                    curr_tx_queue_len: ctx.outbound_count() as u16,
                    curr_free_queue_len: ctx.free_count() as u16,
                    last_rssi: link.last_rssi_dbm,
                    n_packets_recv: link.packets_recv,
                    n_packets_sent: link.packets_sent,
                    total_air_time_secs: (link.total_air_ms / 1000) as u32,
                    total_up_time_secs: (link.uptime_ms / 1000) as u32,
                    n_sent_flood: stats.n_sent_flood,
                    n_sent_direct: stats.n_sent_direct,
                    n_recv_flood: stats.n_recv_flood,
                    n_recv_direct: stats.n_recv_direct,
                    n_full_events: ctx.full_events(),
                };
                let _ = reply.extend_from_slice(&ctx.rtc_now().to_le_bytes());
                let _ = reply.extend_from_slice(&snapshot.to_bytes());
                reply
            }
            _ => reply,
        }
    }

    /// Send an encrypted reply, teaching our path when the request flooded
    fn send_reply(
        &self,
        ctx: &mut MeshCtx<'_>,
        client_idx: usize,
        origin: &PacketOrigin,
        payload_type: PayloadType,
        reply: &[u8],
        delay_ms: u32,
    ) {
        let Some(client) = self.clients.get(client_idx) else {
            return;
        };

        let result = if origin.is_flood {
            ctx.create_path_return(
                &client.id,
                &client.secret,
                &origin.path,
                payload_type as u8,
                reply,
            )
            .and_then(|pkt| ctx.send(pkt, delay_ms))
        } else {
            ctx.create_datagram(payload_type, &client.id, &client.secret, reply)
                .and_then(|pkt| match client.out_path.as_ref() {
                    Some(path) => ctx.send_direct(pkt, path, delay_ms),
                    None => ctx.send_flood(pkt, delay_ms),
                })
        };

        if result.is_err() {
            let now = ctx.now_ms();
            log_debug!(ctx.log(), now, LOG_MOD, "reply dropped, pool full");
        }
    }
}

impl<B: Board> MeshApp for RepeaterApp<B> {
    fn airtime_budget_factor(&self) -> f32 {
        self.airtime_factor
    }

    fn search_peers_by_hash(&mut self, hash: u8) -> usize {
        self.matching.clear();
        for (i, c) in self.clients.iter().enumerate() {
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
        let i = *self.matching.get(idx)? as usize;
        self.clients.get(i).map(|c| &c.secret)
    }

    fn on_anon_data_recv(
        &mut self,
        ctx: &mut MeshCtx<'_>,
        sender: &Identity,
        data: &[u8],
        origin: &PacketOrigin,
    ) {
        let pw = self.admin_password.as_bytes();
        if data.len() < 4 + pw.len() || &data[4..4 + pw.len()] != pw {
            let now = ctx.now_ms();
            log_debug!(ctx.log(), now, LOG_MOD, "login with wrong password");
            return;
        }
        let timestamp = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);

        let Some(idx) = self.put_client(ctx, sender) else {
            let now = ctx.now_ms();
            log_debug!(ctx.log(), now, LOG_MOD, "client table full");
            return;
        };
        {
            let client = &mut self.clients[idx];
            if timestamp <= client.last_timestamp {
                let now = ctx.now_ms();
                log_debug!(ctx.log(), now, LOG_MOD, "login replay suspected");
                return;
            }
            client.last_timestamp = timestamp;
        }
        self.logins_ok += 1;
        {
            let now = ctx.now_ms();
            log_info!(ctx.log(), now, LOG_MOD, "admin login ok");
        }

        let mut reply: Vec<u8, 8> = Vec::new();
        let _ = reply.extend_from_slice(&ctx.rtc_now().to_le_bytes());
        let _ = reply.extend_from_slice(b"OK");
        self.send_reply(ctx, idx, origin, PayloadType::Response, &reply, 0);
    }

    fn on_peer_data_recv(
        &mut self,
        ctx: &mut MeshCtx<'_>,
        payload_type: PayloadType,
        peer_idx: usize,
        data: &[u8],
        origin: &PacketOrigin,
    ) {
        let Some(&m) = self.matching.get(peer_idx) else {
            return;
        };
        let idx = m as usize;

        match payload_type {
            PayloadType::Req if data.len() >= 5 => {
                let timestamp = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                {
                    let Some(client) = self.clients.get(idx) else {
                        return;
                    };
                    if timestamp <= client.last_timestamp {
                        let now = ctx.now_ms();
                        log_debug!(ctx.log(), now, LOG_MOD, "request replay suspected");
                        return;
                    }
                }

                let reply = self.handle_request(ctx, &data[4..]);
                if reply.is_empty() {
                    return;
                }
                if let Some(client) = self.clients.get_mut(idx) {
                    client.last_timestamp = timestamp;
                }
                self.send_reply(ctx, idx, origin, PayloadType::Response, &reply, 0);
            }

            PayloadType::TxtMsg if data.len() > 5 => {
                let sender_timestamp = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                let flags = data[4];
                if flags != 0 {
                    let now = ctx.now_ms();
                    log_debug!(ctx.log(), now, LOG_MOD, "unsupported CLI text flags {:02x}", flags);
                    return;
                }
                let Ok(text) = core::str::from_utf8(&data[5..]) else {
                    return;
                };

                let (ack, out_path) = {
                    let Some(client) = self.clients.get_mut(idx) else {
                        return;
                    };
                    if sender_timestamp <= client.last_timestamp {
                        let now = ctx.now_ms();
                        log_debug!(ctx.log(), now, LOG_MOD, "CLI replay suspected");
                        return;
                    }
                    client.last_timestamp = sender_timestamp;
                    let ack = hash::hash4(&[data, &client.id.pub_key]);
                    (ack, client.out_path.clone())
                };

                // ACK first, spaced apart from the reply text
                let ack_pkt = ctx.create_ack(ack);
                let sent = match out_path.as_deref() {
                    Some(path) => ctx.send_direct(ack_pkt, path, 0),
                    None => ctx.send_flood(ack_pkt, 0),
                };
                if sent.is_err() {
                    let now = ctx.now_ms();
                    log_debug!(ctx.log(), now, LOG_MOD, "CLI ack dropped, pool full");
                }

                let mut reply_text: String<MAX_REPLY_LEN> = String::new();
                self.handle_command(ctx, sender_timestamp, text, &mut reply_text);
                if reply_text.is_empty() {
                    return;
                }

                let mut timestamp = ctx.rtc_now();
                if timestamp == sender_timestamp {
                    // The CLI shows both timestamps; keep them distinct so
                    // the reply's packet hash differs too
                    timestamp += 1;
                }
                let mut reply: Vec<u8, MAX_DATAGRAM_PLAINTEXT> = Vec::new();
                let _ = reply.extend_from_slice(&timestamp.to_le_bytes());
                let _ = reply.push(0);
                if reply.extend_from_slice(reply_text.as_bytes()).is_err() {
                    return;
                }
                self.send_reply(
                    ctx,
                    idx,
                    origin,
                    PayloadType::TxtMsg,
                    &reply,
                    CLI_REPLY_DELAY_MS,
                );
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
        _extra_type: u8,
        _extra: &[u8],
    ) {
        let Some(&m) = self.matching.get(peer_idx) else {
            return;
        };
        let Some(client) = self.clients.get_mut(m as usize) else {
            return;
        };
        if timestamp <= client.last_timestamp {
            let now = ctx.now_ms();
            log_debug!(ctx.log(), now, LOG_MOD, "path replay suspected");
            return;
        }
        client.last_timestamp = timestamp;
        client.out_path = Vec::from_slice(path).ok();
        let now = ctx.now_ms();
        log_debug!(ctx.log(), now, LOG_MOD, "client path learned, {} hops", path.len());
    }
}
