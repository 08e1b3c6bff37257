// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! The mesh: a single-threaded cooperative loop
//!
//! One `poll` call per iteration of the platform's main loop does all the
//! work: drain the radio, classify and dispatch one inbound frame, check
//! the ACK-wait timer, expire retained floods, and transmit at most one
//! outbound frame if the airtime budget allows.
//!
//! Application logic plugs in through [`MeshApp`]. Upcalls receive a
//! [`MeshCtx`] that exposes packet construction, sending, the wall clock
//! and counters; they run to completion and must not recurse into `poll`.

use crate::channel::GroupChannel;
use crate::codec;
use crate::dedup::DedupSet;
use crate::packet::{Packet, PayloadType, RouteKind, ACK_HASH_SIZE, MAX_PATH_SIZE};
use crate::pool::PacketPool;
use crate::radio::{AirtimeEstimator, Radio, RxFrame};
use fern_common::{log_debug, log_warn};
use fern_common::time::{Deadline, MillisClock, RtcClock};
use fern_common::{Error, LogBuffer, RadioConfig, Result};
use fern_crypto::aead::{CipherKey, ENVELOPE_OVERHEAD};
use fern_crypto::identity::{Identity, LocalIdentity, PUB_KEY_SIZE};
use fern_crypto::rng::CryptoRng;
use heapless::Vec;

/// Upper bound on contacts sharing one hash byte that a dispatch will try
pub const MAX_SEARCH_RESULTS: usize = 8;

/// Upper bound on group channels sharing one hash byte
pub const MAX_CHANNEL_MATCHES: usize = 4;

/// Multiplier on estimated airtime for flood ACK timeouts
pub const FLOOD_TIMEOUT_FACTOR: u32 = 16;

/// Per-hop multiplier on estimated airtime for direct ACK timeouts
pub const DIRECT_TIMEOUT_FACTOR: u32 = 4;

/// Fixed slack added to every ACK timeout
pub const TIMEOUT_BASE_MS: u32 = 500;

const LOG_MOD: &str = "mesh";

/// ACK timeout for a flood send, given the packet's estimated airtime
#[must_use]
pub const fn calc_flood_timeout_ms(airtime_ms: u32) -> u32 {
    airtime_ms.saturating_mul(FLOOD_TIMEOUT_FACTOR).saturating_add(TIMEOUT_BASE_MS)
}

/// ACK timeout for a direct send along a known path
#[must_use]
pub const fn calc_direct_timeout_ms(airtime_ms: u32, path_len: usize) -> u32 {
    airtime_ms
        .saturating_mul(DIRECT_TIMEOUT_FACTOR)
        .saturating_mul(path_len as u32 + 1)
        .saturating_add(TIMEOUT_BASE_MS)
}

/// Per-direction send/receive counters
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshStats {
    /// Flood packets transmitted (own and forwarded)
    pub n_sent_flood: u32,
    /// Direct packets transmitted (own and forwarded)
    pub n_sent_direct: u32,
    /// Flood packets accepted for local processing
    pub n_recv_flood: u32,
    /// Direct packets delivered locally
    pub n_recv_direct: u32,
}

/// Link-level numbers snapshotted for upcalls (stats replies)
#[derive(Debug, Clone, Copy)]
pub struct LinkStats {
    /// RSSI of the most recent reception in dBm
    pub last_rssi_dbm: i16,
    /// Frames transmitted since boot
    pub packets_sent: u32,
    /// Frames received since boot
    pub packets_recv: u32,
    /// Cumulative estimated on-air time in milliseconds
    pub total_air_ms: u64,
    /// Milliseconds since `begin`
    pub uptime_ms: u64,
}

/// Where an inbound packet came from, as seen by upcalls
pub struct PacketOrigin {
    /// Arrived by flood (true) or along a direct route (false)
    pub is_flood: bool,
    /// The accumulated flood path; empty for direct deliveries
    pub path: Vec<u8, MAX_PATH_SIZE>,
}

struct AckWait {
    expected: [u8; ACK_HASH_SIZE],
    deadline: Deadline,
}

/// Capabilities handed to application upcalls
///
/// Borrows the mesh internals an upcall may touch: packet construction,
/// the send queues, the wall clock, counters and the log. Upcalls cannot
/// reach the radio or re-enter the loop.
pub struct MeshCtx<'a> {
    ident: &'a LocalIdentity,
    pool: &'a mut PacketPool,
    rtc: &'a mut dyn RtcClock,
    airtime: &'a dyn AirtimeEstimator,
    ack_wait: &'a mut Option<AckWait>,
    stats: &'a MeshStats,
    log: &'a mut LogBuffer,
    link: LinkStats,
    now_ms: u64,
}

impl MeshCtx<'_> {
    /// Milliseconds since boot
    #[must_use]
    pub const fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Wall clock, UTC seconds
    #[must_use]
    pub fn rtc_now(&self) -> u32 {
        self.rtc.now_secs()
    }

    /// Set the wall clock (clock-sync command)
    pub fn rtc_set(&mut self, secs: u32) {
        self.rtc.set_secs(secs);
    }

    /// This node's public identity
    #[must_use]
    pub const fn self_id(&self) -> &Identity {
        self.ident.identity()
    }

    /// This node's one-byte wire address
    #[must_use]
    pub const fn hash_id(&self) -> u8 {
        self.ident.hash_id()
    }

    /// This node's keypair, for secret derivation at contact insert
    #[must_use]
    pub const fn local_identity(&self) -> &LocalIdentity {
        self.ident
    }

    /// Derive the envelope key shared with a peer
    ///
    /// # Errors
    ///
    /// `Error::InvalidKey` if the peer key is not a valid curve point.
    pub fn shared_secret(&self, peer: &Identity) -> Result<CipherKey> {
        Ok(self.ident.shared_secret(peer)?)
    }

    /// Link counters snapshotted at dispatch time
    #[must_use]
    pub const fn link(&self) -> &LinkStats {
        &self.link
    }

    /// Send/receive counters
    #[must_use]
    pub const fn stats(&self) -> &MeshStats {
        self.stats
    }

    /// Estimated on-air milliseconds for a frame of `len` bytes
    #[must_use]
    pub fn est_airtime_ms(&self, len: usize) -> u32 {
        self.airtime.est_airtime_ms(len)
    }

    /// Packets waiting in the outbound queue
    #[must_use]
    pub fn outbound_count(&self) -> usize {
        self.pool.outbound_count()
    }

    /// Free packet slots
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.pool.free_count()
    }

    /// Pool allocation failures since boot
    #[must_use]
    pub fn full_events(&self) -> u32 {
        self.pool.full_events()
    }

    /// The node's log buffer
    pub fn log(&mut self) -> &mut LogBuffer {
        self.log
    }

    /// Build an encrypted peer datagram from this node
    ///
    /// # Errors
    ///
    /// See [`codec::make_datagram`].
    pub fn create_datagram(
        &self,
        payload_type: PayloadType,
        dest: &Identity,
        secret: &CipherKey,
        plaintext: &[u8],
    ) -> Result<Packet> {
        codec::make_datagram(payload_type, dest, self.self_id(), secret, plaintext)
    }

    /// Build an anonymous request to `dest`
    ///
    /// # Errors
    ///
    /// See [`codec::make_anon_req`].
    pub fn create_anon_req(&self, dest: &Identity, plaintext: &[u8]) -> Result<Packet> {
        codec::make_anon_req(dest, self.ident, plaintext)
    }

    /// Build a 4-byte acknowledgement
    #[must_use]
    pub fn create_ack(&self, ack_hash: [u8; ACK_HASH_SIZE]) -> Packet {
        codec::make_ack(ack_hash)
    }

    /// Build a signed advert, timestamped from the wall clock
    ///
    /// # Errors
    ///
    /// See [`codec::make_advert`].
    pub fn create_advert(&self, app_data: &[u8]) -> Result<Packet> {
        codec::make_advert(self.ident, self.rtc.now_secs(), app_data)
    }

    /// Build a path-return for a flood received over `inbound_path`
    ///
    /// # Errors
    ///
    /// See [`codec::make_path_return`].
    pub fn create_path_return(
        &self,
        dest: &Identity,
        secret: &CipherKey,
        inbound_path: &[u8],
        extra_type: u8,
        extra: &[u8],
    ) -> Result<Packet> {
        codec::make_path_return(
            dest,
            self.self_id(),
            secret,
            inbound_path,
            self.rtc.now_secs(),
            extra_type,
            extra,
        )
    }

    /// Build an encrypted group text
    ///
    /// # Errors
    ///
    /// See [`codec::make_group_text`].
    pub fn create_group_text(&self, channel: &GroupChannel, plaintext: &[u8]) -> Result<Packet> {
        codec::make_group_text(channel, plaintext)
    }

    /// Enqueue a packet exactly as formed (path-returns arrive here)
    ///
    /// # Errors
    ///
    /// `Error::PoolExhausted` when no slot is free.
    pub fn send(&mut self, pkt: Packet, delay_ms: u32) -> Result<()> {
        self.pool.enqueue(pkt, self.now_ms + u64::from(delay_ms))
    }

    /// Enqueue with broadcast semantics
    ///
    /// # Errors
    ///
    /// `Error::PoolExhausted` when no slot is free.
    pub fn send_flood(&mut self, mut pkt: Packet, delay_ms: u32) -> Result<()> {
        pkt.route = RouteKind::Flood;
        pkt.path.clear();
        self.send(pkt, delay_ms)
    }

    /// Enqueue along a known source route
    ///
    /// # Errors
    ///
    /// `Error::PathTooLong` if `path` exceeds the hop cap,
    /// `Error::PoolExhausted` when no slot is free.
    pub fn send_direct(&mut self, mut pkt: Packet, path: &[u8], delay_ms: u32) -> Result<()> {
        if pkt.route != RouteKind::Response {
            pkt.route = RouteKind::Direct;
        }
        pkt.path = Vec::from_slice(path).map_err(|()| Error::PathTooLong)?;
        self.send(pkt, delay_ms)
    }

    /// Arm the single ACK-wait timer
    ///
    /// A matching ACK (or a path-return carrying one) cancels it; expiry
    /// fires [`MeshApp::on_send_timeout`] once. Re-arming replaces any
    /// previous wait.
    pub fn start_ack_wait(&mut self, expected: [u8; ACK_HASH_SIZE], timeout_ms: u32) {
        *self.ack_wait = Some(AckWait {
            expected,
            deadline: Deadline::new(self.now_ms, u64::from(timeout_ms)),
        });
    }

    /// Drop the ACK-wait timer without firing it
    pub fn cancel_ack_wait(&mut self) {
        *self.ack_wait = None;
    }

    /// True while an ACK is awaited
    #[must_use]
    pub fn ack_pending(&self) -> bool {
        self.ack_wait.is_some()
    }

    fn consume_ack(&mut self, ack: [u8; ACK_HASH_SIZE]) -> bool {
        let matched = matches!(self.ack_wait.as_ref(), Some(w) if w.expected == ack);
        if matched {
            *self.ack_wait = None;
        }
        matched
    }
}

/// Application hooks the mesh dispatches into
///
/// The mesh owns the routing machinery and calls these on decoded,
/// classified packets. Peer-keyed types use the index-arena pattern:
/// `search_peers_by_hash` records matching contact indexes internally and
/// later calls refer to them by position.
pub trait MeshApp {
    /// Fraction of wall time this node may spend transmitting
    fn airtime_budget_factor(&self) -> f32 {
        1.0
    }

    /// May this packet be re-flooded / forwarded on?
    fn allow_packet_forward(&mut self, _pkt: &Packet) -> bool {
        true
    }

    /// Record contacts whose hash ID matches; returns how many
    fn search_peers_by_hash(&mut self, hash: u8) -> usize;

    /// Cached ECDH secret of the idx-th match from the last search
    fn peer_secret(&self, idx: usize) -> Option<&CipherKey>;

    /// Collect group channels whose hash byte matches; returns how many
    fn search_channels_by_hash(
        &self,
        _hash: u8,
        _out: &mut Vec<GroupChannel, MAX_CHANNEL_MATCHES>,
    ) -> usize {
        0
    }

    /// A verified advertisement arrived
    fn on_advert_recv(
        &mut self,
        _ctx: &mut MeshCtx<'_>,
        _id: &Identity,
        _timestamp: u32,
        _app_data: &[u8],
    ) {
    }

    /// An anonymous request decrypted with our long-term key arrived
    fn on_anon_data_recv(
        &mut self,
        _ctx: &mut MeshCtx<'_>,
        _sender: &Identity,
        _data: &[u8],
        _origin: &PacketOrigin,
    ) {
    }

    /// A peer-keyed payload authenticated under the idx-th candidate
    fn on_peer_data_recv(
        &mut self,
        _ctx: &mut MeshCtx<'_>,
        _payload_type: PayloadType,
        _peer_idx: usize,
        _data: &[u8],
        _origin: &PacketOrigin,
    ) {
    }

    /// A path-return from the idx-th candidate taught us an out-path
    fn on_peer_path_recv(
        &mut self,
        _ctx: &mut MeshCtx<'_>,
        _peer_idx: usize,
        _timestamp: u32,
        _path: &[u8],
        _extra_type: u8,
        _extra: &[u8],
    ) {
    }

    /// A 4-byte acknowledgement arrived
    fn on_ack_recv(&mut self, _ctx: &mut MeshCtx<'_>, _ack_hash: [u8; ACK_HASH_SIZE]) {}

    /// A group text decrypted under a configured channel key
    fn on_group_data_recv(
        &mut self,
        _ctx: &mut MeshCtx<'_>,
        _channel: &GroupChannel,
        _data: &[u8],
        _origin: &PacketOrigin,
    ) {
    }

    /// The ACK-wait timer expired without a matching ACK
    fn on_send_timeout(&mut self, _ctx: &mut MeshCtx<'_>) {}
}

/// The mesh node core
pub struct Mesh<R, M, C, G>
where
    R: Radio,
    M: MillisClock,
    C: RtcClock,
    G: CryptoRng,
{
    ident: LocalIdentity,
    radio: R,
    millis: M,
    rtc: C,
    rng: G,
    pool: PacketPool,
    dedup: DedupSet,
    stats: MeshStats,
    log: LogBuffer,
    ack_wait: Option<AckWait>,
    total_air_ms: u64,
    started_ms: u64,
}

impl<R, M, C, G> Mesh<R, M, C, G>
where
    R: Radio,
    M: MillisClock,
    C: RtcClock,
    G: CryptoRng,
{
    /// Assemble a mesh from its platform collaborators
    pub fn new(ident: LocalIdentity, radio: R, millis: M, rtc: C, rng: G) -> Self {
        Self {
            ident,
            radio,
            millis,
            rtc,
            rng,
            pool: PacketPool::new(),
            dedup: DedupSet::new(),
            stats: MeshStats::default(),
            log: LogBuffer::new(),
            ack_wait: None,
            total_air_ms: 0,
            started_ms: 0,
        }
    }

    /// Initialize the radio and start the uptime clock
    ///
    /// # Errors
    ///
    /// `Error::RadioInitFailed` is fatal; the boot code should halt.
    pub fn begin(&mut self, cfg: &RadioConfig) -> Result<()> {
        self.started_ms = self.millis.millis();
        self.radio.begin(cfg)
    }

    /// This node's public identity
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        self.ident.identity()
    }

    /// This node's keypair
    #[must_use]
    pub const fn local_identity(&self) -> &LocalIdentity {
        &self.ident
    }

    /// Send/receive counters
    #[must_use]
    pub const fn stats(&self) -> &MeshStats {
        &self.stats
    }

    /// Cumulative estimated airtime in milliseconds
    #[must_use]
    pub const fn total_air_time_ms(&self) -> u64 {
        self.total_air_ms
    }

    /// Milliseconds since `begin`
    #[must_use]
    pub fn uptime_ms(&self) -> u64 {
        self.millis.millis().saturating_sub(self.started_ms)
    }

    /// True while an ACK is awaited
    #[must_use]
    pub const fn ack_pending(&self) -> bool {
        self.ack_wait.is_some()
    }

    /// The packet pool (queue depths, full events)
    #[must_use]
    pub const fn pool(&self) -> &PacketPool {
        &self.pool
    }

    /// The node's log buffer
    pub fn log(&mut self) -> &mut LogBuffer {
        &mut self.log
    }

    /// The radio, for platform-level access (sleep, tuning)
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Run application code with a dispatch context outside an upcall
    ///
    /// This is how the application initiates traffic (adverts, messages,
    /// logins) between loop iterations.
    pub fn with_ctx<T>(&mut self, f: impl FnOnce(&mut MeshCtx<'_>) -> T) -> T {
        let now = self.millis.millis();
        let mut ctx = self.make_ctx(now);
        f(&mut ctx)
    }

    /// One iteration of the cooperative loop
    ///
    /// Never blocks beyond one radio interaction. Call it from the
    /// platform main loop as often as possible.
    pub fn poll(&mut self, app: &mut impl MeshApp) {
        let now = self.millis.millis();

        if let Some(frame) = self.radio.poll() {
            self.handle_rx(app, &frame, now);
        }

        if matches!(&self.ack_wait, Some(w) if w.deadline.is_expired(now)) {
            self.ack_wait = None;
            let mut ctx = self.make_ctx(now);
            app.on_send_timeout(&mut ctx);
        }

        self.pool.expire_pending(now);
        self.pump_tx(app.airtime_budget_factor(), now);
    }

    fn make_ctx(&mut self, now: u64) -> MeshCtx<'_> {
        let link = LinkStats {
            last_rssi_dbm: self.radio.last_rssi_dbm(),
            packets_sent: self.radio.packets_sent(),
            packets_recv: self.radio.packets_recv(),
            total_air_ms: self.total_air_ms,
            uptime_ms: now.saturating_sub(self.started_ms),
        };
        MeshCtx {
            ident: &self.ident,
            pool: &mut self.pool,
            rtc: &mut self.rtc,
            airtime: &self.radio,
            ack_wait: &mut self.ack_wait,
            stats: &self.stats,
            log: &mut self.log,
            link,
            now_ms: now,
        }
    }

    fn handle_rx(&mut self, app: &mut impl MeshApp, frame: &RxFrame, now: u64) {
        let rssi = frame.rssi_dbm;
        let pkt = match Packet::from_bytes(&frame.data) {
            Ok(p) => p,
            Err(_) => {
                log_debug!(self.log, now, LOG_MOD, "unparseable frame, {} bytes", frame.data.len());
                return;
            }
        };
        let hash = codec::packet_hash(&pkt);

        if pkt.is_route_flood() {
            if self.dedup.seen(hash, now) {
                return;
            }
            self.stats.n_recv_flood += 1;

            let origin = PacketOrigin {
                is_flood: true,
                path: pkt.path.clone(),
            };
            let handled = {
                let mut ctx = self.make_ctx(now);
                dispatch_packet(app, &mut ctx, &pkt, &origin)
            };

            if !handled && pkt.path.len() < MAX_PATH_SIZE && app.allow_packet_forward(&pkt) {
                let mut fwd = pkt;
                let _ = fwd.path.push(self.ident.hash_id());
                let delay = self.flood_forward_delay(rssi);
                if self.pool.enqueue(fwd, now + u64::from(delay)).is_err() {
                    log_debug!(self.log, now, LOG_MOD, "pool full, flood not forwarded");
                }
            }
        } else if pkt.route.is_direct() {
            if pkt.path.is_empty() {
                // Terminal hop of a direct route; the address byte decides
                if self.dedup.seen(hash, now) {
                    return;
                }
                self.stats.n_recv_direct += 1;
                let origin = PacketOrigin {
                    is_flood: false,
                    path: Vec::new(),
                };
                let mut ctx = self.make_ctx(now);
                dispatch_packet(app, &mut ctx, &pkt, &origin);
            } else if pkt.path[0] == self.ident.hash_id() {
                // We are the next hop: strip ourselves and pass it on
                if self.dedup.seen(hash, now) {
                    return;
                }
                let mut fwd = pkt;
                fwd.path.remove(0);
                if self.pool.enqueue(fwd, now).is_err() {
                    log_debug!(self.log, now, LOG_MOD, "pool full, direct not forwarded");
                }
            }
            // Next hop is some other node: not ours, drop silently
        }
    }

    /// Randomized re-flood back-off: weaker signal waits longer
    fn flood_forward_delay(&mut self, rssi: i16) -> u32 {
        let margin = (-30 - rssi.clamp(-120, -30)) as u32; // 0 strong .. 90 weak
        let jitter = self.rng.next_u32().unwrap_or(0) & 0x3F;
        margin * 2 + jitter
    }

    fn airtime_ok(&self, factor: f32, now: u64) -> bool {
        let uptime = now.saturating_sub(self.started_ms).max(1);
        (self.total_air_ms as f32) <= factor * (uptime as f32)
    }

    fn pump_tx(&mut self, factor: f32, now: u64) {
        if !matches!(self.pool.head_ready_at(), Some(t) if t <= now) {
            return;
        }
        if !self.airtime_ok(factor, now) {
            return;
        }
        let Some(pkt) = self.pool.next_ready(now) else {
            return;
        };

        let bytes = pkt.to_bytes();
        if self.radio.send_frame(&bytes).is_err() {
            log_warn!(self.log, now, LOG_MOD, "radio TX failed, frame dropped");
            return;
        }
        self.total_air_ms += u64::from(self.radio.est_airtime_ms(bytes.len()));

        if pkt.is_route_flood() {
            self.stats.n_sent_flood += 1;
            let hash = codec::packet_hash(&pkt);
            let _ = self.dedup.seen(hash, now);
            if pkt.path.is_empty() {
                // Self-originated flood: retain for ACK correlation
                self.pool.retain_pending(pkt, hash, now);
            }
        } else {
            self.stats.n_sent_direct += 1;
        }
    }
}

/// Classify one decoded packet and invoke the right upcall.
/// Returns true when the packet terminated here (do not forward).
fn dispatch_packet<A: MeshApp>(
    app: &mut A,
    ctx: &mut MeshCtx<'_>,
    pkt: &Packet,
    origin: &PacketOrigin,
) -> bool {
    let payload = &pkt.payload;
    match pkt.payload_type {
        PayloadType::Advert => match codec::decode_advert(payload) {
            Ok((id, timestamp, app_data)) => {
                if id.matches(ctx.self_id()) {
                    return true;
                }
                app.on_advert_recv(ctx, &id, timestamp, app_data);
                false
            }
            Err(_) => {
                let now = ctx.now_ms();
                log_debug!(ctx.log(), now, LOG_MOD, "advert rejected");
                true
            }
        },

        PayloadType::Ack => {
            if payload.len() < ACK_HASH_SIZE {
                return true;
            }
            let mut ack = [0u8; ACK_HASH_SIZE];
            ack.copy_from_slice(&payload[..ACK_HASH_SIZE]);
            let matched = ctx.consume_ack(ack);
            app.on_ack_recv(ctx, ack);
            // An ACK that was for us stops here; others keep flooding
            matched
        }

        PayloadType::AnonReq => {
            if payload.len() < 1 + PUB_KEY_SIZE + ENVELOPE_OVERHEAD
                || payload[0] != ctx.hash_id()
            {
                return false;
            }
            let mut sender_pub = [0u8; PUB_KEY_SIZE];
            sender_pub.copy_from_slice(&payload[1..1 + PUB_KEY_SIZE]);
            let sender = Identity::new(sender_pub);
            let Ok(secret) = ctx.shared_secret(&sender) else {
                return false;
            };
            match codec::open_envelope(&secret, &payload[1 + PUB_KEY_SIZE..]) {
                Ok(plain) => {
                    app.on_anon_data_recv(ctx, &sender, &plain, origin);
                    true
                }
                Err(_) => false,
            }
        }

        PayloadType::Req | PayloadType::Response | PayloadType::TxtMsg => {
            if payload.len() < 2 + ENVELOPE_OVERHEAD || payload[0] != ctx.hash_id() {
                return false;
            }
            let n = app.search_peers_by_hash(payload[1]).min(MAX_SEARCH_RESULTS);
            for i in 0..n {
                let Some(secret) = app.peer_secret(i).cloned() else {
                    continue;
                };
                if let Ok(plain) = codec::open_envelope(&secret, &payload[2..]) {
                    app.on_peer_data_recv(ctx, pkt.payload_type, i, &plain, origin);
                    return true;
                }
            }
            // No candidate authenticated: silent drop, no log at info
            false
        }

        PayloadType::Path => {
            if payload.len() < 2 + ENVELOPE_OVERHEAD || payload[0] != ctx.hash_id() {
                return false;
            }
            let n = app.search_peers_by_hash(payload[1]).min(MAX_SEARCH_RESULTS);
            for i in 0..n {
                let Some(secret) = app.peer_secret(i).cloned() else {
                    continue;
                };
                if let Ok(plain) = codec::open_envelope(&secret, &payload[2..]) {
                    let Ok(pr) = codec::decode_path_return(&plain) else {
                        return true;
                    };
                    if pr.extra_type == PayloadType::Ack as u8 && pr.extra.len() >= ACK_HASH_SIZE
                    {
                        let mut ack = [0u8; ACK_HASH_SIZE];
                        ack.copy_from_slice(&pr.extra[..ACK_HASH_SIZE]);
                        let _ = ctx.consume_ack(ack);
                    }
                    app.on_peer_path_recv(
                        ctx,
                        i,
                        pr.timestamp,
                        pr.path,
                        pr.extra_type,
                        pr.extra,
                    );
                    return true;
                }
            }
            false
        }

        PayloadType::GrpTxt => {
            if payload.len() < 1 + ENVELOPE_OVERHEAD {
                return true;
            }
            let mut channels: Vec<GroupChannel, MAX_CHANNEL_MATCHES> = Vec::new();
            let n = app.search_channels_by_hash(payload[0], &mut channels);
            for ch in channels.iter().take(n) {
                if let Ok(plain) = codec::open_envelope(ch.secret(), &payload[1..]) {
                    app.on_group_data_recv(ctx, ch, &plain, origin);
                    break;
                }
            }
            // Group text is broadcast: keep flooding either way
            false
        }
    }
}
