// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Multi-node tests for the mesh core
//!
//! Nodes run against an in-memory radio; the test driver moves frames
//! between inboxes according to a link topology, advancing a shared
//! manual clock in small steps.

#![cfg(test)]

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use fern_common::time::{MillisClock, RtcClock};
use fern_common::RadioConfig;
use fern_crypto::aead::CipherKey;
use fern_crypto::identity::{Identity, LocalIdentity};
use fern_crypto::rng::CryptoRng;
use fern_crypto::CryptoError;
use fern_mesh::channel::GroupChannel;
use fern_mesh::codec;
use fern_mesh::mesh::{
    calc_flood_timeout_ms, Mesh, MeshApp, MeshCtx, PacketOrigin, MAX_CHANNEL_MATCHES,
};
use fern_mesh::packet::{PayloadType, MAX_FRAME_SIZE};
use fern_mesh::radio::{AirtimeEstimator, Radio, RxFrame};
use heapless::Vec as HVec;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

struct TestRng(u64);

impl TestRng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
}

impl CryptoRng for TestRng {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), CryptoError> {
        for chunk in dest.chunks_mut(8) {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            let bytes = self.0.to_le_bytes();
            let n = chunk.len();
            chunk.copy_from_slice(&bytes[..n]);
        }
        Ok(())
    }
}

#[derive(Clone)]
struct SharedMillis(Rc<Cell<u64>>);

impl MillisClock for SharedMillis {
    fn millis(&self) -> u64 {
        self.0.get()
    }
}

#[derive(Clone)]
struct SharedRtc(Rc<Cell<u32>>);

impl RtcClock for SharedRtc {
    fn now_secs(&self) -> u32 {
        self.0.get()
    }

    fn set_secs(&mut self, secs: u32) {
        self.0.set(secs);
    }
}

struct MockRadio {
    inbox: VecDeque<(Vec<u8>, i16)>,
    outbox: Vec<Vec<u8>>,
    sent: u32,
    recvd: u32,
    last_rssi: i16,
}

impl MockRadio {
    fn new() -> Self {
        Self {
            inbox: VecDeque::new(),
            outbox: Vec::new(),
            sent: 0,
            recvd: 0,
            last_rssi: -60,
        }
    }

    fn push_frame(&mut self, frame: &[u8], rssi: i16) {
        self.inbox.push_back((frame.to_vec(), rssi));
    }

    fn take_outbox(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbox)
    }
}

impl AirtimeEstimator for MockRadio {
    fn est_airtime_ms(&self, len_bytes: usize) -> u32 {
        20 + len_bytes as u32
    }
}

impl Radio for MockRadio {
    fn begin(&mut self, _cfg: &RadioConfig) -> fern_common::Result<()> {
        Ok(())
    }

    fn send_frame(&mut self, frame: &[u8]) -> fern_common::Result<()> {
        self.outbox.push(frame.to_vec());
        self.sent += 1;
        Ok(())
    }

    fn poll(&mut self) -> Option<RxFrame> {
        let (data, rssi) = self.inbox.pop_front()?;
        self.recvd += 1;
        self.last_rssi = rssi;
        Some(RxFrame {
            data: HVec::<u8, MAX_FRAME_SIZE>::from_slice(&data).ok()?,
            rssi_dbm: rssi,
        })
    }

    fn last_rssi_dbm(&self) -> i16 {
        self.last_rssi
    }

    fn packets_sent(&self) -> u32 {
        self.sent
    }

    fn packets_recv(&self) -> u32 {
        self.recvd
    }
}

type TestMesh = Mesh<MockRadio, SharedMillis, SharedRtc, TestRng>;

/// Minimal application recording every upcall
#[derive(Default)]
struct TestApp {
    peers: Vec<(Identity, CipherKey)>,
    channels: Vec<GroupChannel>,
    matching: Vec<usize>,
    factor: f32,
    reply_to_anon: bool,
    adverts: Vec<(Identity, u32, Vec<u8>)>,
    anon: Vec<(Identity, Vec<u8>)>,
    peer_data: Vec<(PayloadType, usize, Vec<u8>, bool)>,
    paths: Vec<(usize, Vec<u8>, u32)>,
    acks: Vec<[u8; 4]>,
    group: Vec<(u8, Vec<u8>)>,
    timeouts: u32,
}

impl TestApp {
    fn new() -> Self {
        Self {
            factor: 1.0,
            ..Self::default()
        }
    }

    fn with_peer(mut self, local: &LocalIdentity, peer: &Identity) -> Self {
        let secret = local.shared_secret(peer).unwrap();
        self.peers.push((*peer, secret));
        self
    }
}

impl MeshApp for TestApp {
    fn airtime_budget_factor(&self) -> f32 {
        self.factor
    }

    fn search_peers_by_hash(&mut self, hash: u8) -> usize {
        self.matching = self
            .peers
            .iter()
            .enumerate()
            .filter(|(_, (id, _))| id.is_hash_match(hash))
            .map(|(i, _)| i)
            .collect();
        self.matching.len()
    }

    fn peer_secret(&self, idx: usize) -> Option<&CipherKey> {
        let i = *self.matching.get(idx)?;
        self.peers.get(i).map(|(_, s)| s)
    }

    fn search_channels_by_hash(
        &self,
        hash: u8,
        out: &mut HVec<GroupChannel, MAX_CHANNEL_MATCHES>,
    ) -> usize {
        for ch in self.channels.iter().filter(|c| c.hash == hash) {
            if out.push(ch.clone()).is_err() {
                break;
            }
        }
        out.len()
    }

    fn on_advert_recv(
        &mut self,
        _ctx: &mut MeshCtx<'_>,
        id: &Identity,
        timestamp: u32,
        app_data: &[u8],
    ) {
        self.adverts.push((*id, timestamp, app_data.to_vec()));
    }

    fn on_anon_data_recv(
        &mut self,
        ctx: &mut MeshCtx<'_>,
        sender: &Identity,
        data: &[u8],
        origin: &PacketOrigin,
    ) {
        self.anon.push((*sender, data.to_vec()));
        if self.reply_to_anon {
            let secret = ctx.shared_secret(sender).unwrap();
            let mut reply = ctx.rtc_now().to_le_bytes().to_vec();
            reply.extend_from_slice(b"OK");
            let pkt = ctx
                .create_path_return(
                    sender,
                    &secret,
                    &origin.path,
                    PayloadType::Response as u8,
                    &reply,
                )
                .unwrap();
            ctx.send(pkt, 0).unwrap();
        }
    }

    fn on_peer_data_recv(
        &mut self,
        _ctx: &mut MeshCtx<'_>,
        payload_type: PayloadType,
        peer_idx: usize,
        data: &[u8],
        origin: &PacketOrigin,
    ) {
        let i = self.matching[peer_idx];
        self.peer_data
            .push((payload_type, i, data.to_vec(), origin.is_flood));
    }

    fn on_peer_path_recv(
        &mut self,
        _ctx: &mut MeshCtx<'_>,
        peer_idx: usize,
        timestamp: u32,
        path: &[u8],
        _extra_type: u8,
        _extra: &[u8],
    ) {
        let i = self.matching[peer_idx];
        self.paths.push((i, path.to_vec(), timestamp));
    }

    fn on_ack_recv(&mut self, _ctx: &mut MeshCtx<'_>, ack_hash: [u8; 4]) {
        self.acks.push(ack_hash);
    }

    fn on_group_data_recv(
        &mut self,
        _ctx: &mut MeshCtx<'_>,
        channel: &GroupChannel,
        data: &[u8],
        _origin: &PacketOrigin,
    ) {
        self.group.push((channel.hash, data.to_vec()));
    }

    fn on_send_timeout(&mut self, _ctx: &mut MeshCtx<'_>) {
        self.timeouts += 1;
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Sim {
    clock: Rc<Cell<u64>>,
    rtc: Rc<Cell<u32>>,
}

impl Sim {
    fn new() -> Self {
        Self {
            clock: Rc::new(Cell::new(0)),
            rtc: Rc::new(Cell::new(1_000_000)),
        }
    }

    fn node(&self, seed: u64) -> TestMesh {
        let ident = LocalIdentity::new_random(&mut TestRng::new(seed)).unwrap();
        let mut mesh = Mesh::new(
            ident,
            MockRadio::new(),
            SharedMillis(self.clock.clone()),
            SharedRtc(self.rtc.clone()),
            TestRng::new(seed ^ 0x5555),
        );
        mesh.begin(&RadioConfig::DEFAULT).unwrap();
        mesh
    }

    fn advance(&self, ms: u64) {
        self.clock.set(self.clock.get() + ms);
    }
}

/// Deliver every transmitted frame to each link neighbor
fn exchange(meshes: &mut [&mut TestMesh], links: &[(usize, usize)]) {
    let mut transfers: Vec<(usize, Vec<u8>)> = Vec::new();
    for (i, mesh) in meshes.iter_mut().enumerate() {
        for frame in mesh.radio_mut().take_outbox() {
            for &(a, b) in links {
                if a == i {
                    transfers.push((b, frame.clone()));
                } else if b == i {
                    transfers.push((a, frame.clone()));
                }
            }
        }
    }
    for (dst, frame) in transfers {
        meshes[dst].radio_mut().push_frame(&frame, -60);
    }
}

/// Step the whole simulation for `total_ms` in 10 ms ticks
fn run(
    sim: &Sim,
    meshes: &mut [&mut TestMesh],
    apps: &mut [&mut TestApp],
    links: &[(usize, usize)],
    total_ms: u64,
) {
    let steps = total_ms / 10;
    for _ in 0..steps {
        sim.advance(10);
        for (mesh, app) in meshes.iter_mut().zip(apps.iter_mut()) {
            mesh.poll(&mut **app);
        }
        exchange(meshes, links);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn flood_suppression_in_three_node_line() {
    let sim = Sim::new();
    let mut a = sim.node(1);
    let mut b = sim.node(2);
    let mut c = sim.node(3);
    let mut app_a = TestApp::new();
    let mut app_b = TestApp::new();
    let mut app_c = TestApp::new();

    a.with_ctx(|ctx| {
        let pkt = ctx.create_advert(b"\x01\x00alpha").unwrap();
        ctx.send_flood(pkt, 0).unwrap();
    });

    run(
        &sim,
        &mut [&mut a, &mut b, &mut c],
        &mut [&mut app_a, &mut app_b, &mut app_c],
        &[(0, 1), (1, 2)],
        3_000,
    );

    // Each non-origin node retransmits exactly once; duplicates are
    // dedup-dropped everywhere
    assert_eq!(a.radio_mut().packets_sent(), 1);
    assert_eq!(b.radio_mut().packets_sent(), 1);
    assert_eq!(c.radio_mut().packets_sent(), 1);

    assert_eq!(app_b.adverts.len(), 1);
    assert_eq!(app_c.adverts.len(), 1);
}

#[test]
fn flood_forwarding_appends_own_hop_hash() {
    let sim = Sim::new();
    let mut a = sim.node(10);
    let mut b = sim.node(11);
    let b_hash = b.identity().hash_id();
    let mut app_a = TestApp::new();
    let mut app_b = TestApp::new();

    a.with_ctx(|ctx| {
        let pkt = ctx.create_advert(b"\x01\x00alpha").unwrap();
        ctx.send_flood(pkt, 0).unwrap();
    });
    sim.advance(10);
    a.poll(&mut app_a);
    let original = a.radio_mut().take_outbox().pop().expect("A must transmit");
    assert_eq!(original[1], 0, "self-originated flood starts with empty path");

    // B re-floods after its RSSI back-off, with itself appended
    b.radio_mut().push_frame(&original, -60);
    let mut forwarded = None;
    for _ in 0..100 {
        sim.advance(10);
        b.poll(&mut app_b);
        if let Some(f) = b.radio_mut().take_outbox().pop() {
            forwarded = Some(f);
            break;
        }
    }
    let forwarded = forwarded.expect("B must forward the flood");
    assert_eq!(forwarded[0], original[0]);
    assert_eq!(forwarded[1], 1);
    assert_eq!(forwarded[2], b_hash);
    assert_eq!(&forwarded[3..], &original[2..]);
}

#[test]
fn path_learning_round_trip_then_direct() {
    // S - R1 - R2 - D; S floods an anon request, D answers with a
    // path-return, S learns [R1, R2] and the next send goes direct.
    let sim = Sim::new();
    let mut s = sim.node(20);
    let mut r1 = sim.node(21);
    let mut r2 = sim.node(22);
    let mut d = sim.node(23);

    let s_id = *s.identity();
    let d_id = *d.identity();
    let r1_hash = r1.identity().hash_id();
    let r2_hash = r2.identity().hash_id();

    let mut app_s = TestApp::new().with_peer(s.local_identity(), &d_id);
    let mut app_r1 = TestApp::new();
    let mut app_r2 = TestApp::new();
    let mut app_d = TestApp::new().with_peer(d.local_identity(), &s_id);
    app_d.reply_to_anon = true;

    s.with_ctx(|ctx| {
        let mut payload = ctx.rtc_now().to_le_bytes().to_vec();
        payload.extend_from_slice(b"hello-admin");
        let pkt = ctx.create_anon_req(&d_id, &payload).unwrap();
        ctx.send_flood(pkt, 0).unwrap();
    });

    let links = [(0, 1), (1, 2), (2, 3)];
    run(
        &sim,
        &mut [&mut s, &mut r1, &mut r2, &mut d],
        &mut [&mut app_s, &mut app_r1, &mut app_r2, &mut app_d],
        &links,
        5_000,
    );

    // D got the request with the accumulated two-hop path
    assert_eq!(app_d.anon.len(), 1);
    assert_eq!(app_d.anon[0].1.ends_with(b"hello-admin"), true);

    // S learned the out-path in origin orientation
    assert_eq!(app_s.paths.len(), 1);
    assert_eq!(app_s.paths[0].1, vec![r1_hash, r2_hash]);

    // Now send a datagram along the learned path: it must arrive as a
    // direct (non-flood) delivery at D
    let learned = app_s.paths[0].1.clone();
    let secret = s.local_identity().shared_secret(&d_id).unwrap();
    sim.rtc.set(sim.rtc.get() + 5);
    s.with_ctx(|ctx| {
        let mut payload = ctx.rtc_now().to_le_bytes().to_vec();
        payload.push(0);
        payload.extend_from_slice(b"direct now");
        let pkt = ctx
            .create_datagram(PayloadType::TxtMsg, &d_id, &secret, &payload)
            .unwrap();
        ctx.send_direct(pkt, &learned, 0).unwrap();
    });

    run(
        &sim,
        &mut [&mut s, &mut r1, &mut r2, &mut d],
        &mut [&mut app_s, &mut app_r1, &mut app_r2, &mut app_d],
        &links,
        2_000,
    );

    let delivered = app_d
        .peer_data
        .iter()
        .find(|(t, _, data, _)| *t == PayloadType::TxtMsg && data.ends_with(b"direct now"))
        .expect("direct datagram must reach D");
    assert!(!delivered.3, "delivery must not be a flood");
}

#[test]
fn airtime_budget_caps_transmission() {
    let sim = Sim::new();
    let mut node = sim.node(30);
    let mut app = TestApp::new();
    app.factor = 0.1;

    // Saturate the outbound queue continuously for 60 simulated seconds
    let steps = 60_000 / 10;
    for i in 0u64..steps {
        sim.advance(10);
        node.with_ctx(|ctx| {
            let mut data = b"\x01\x00spam-".to_vec();
            data.extend_from_slice(&i.to_le_bytes());
            if let Ok(pkt) = ctx.create_advert(&data) {
                let _ = ctx.send_flood(pkt, 0);
            }
        });
        node.poll(&mut app);
        node.radio_mut().take_outbox();
    }

    // With factor 0.1 over 60 s, at most ~6 s of airtime may accumulate
    // (plus at most one frame of overshoot)
    let cap_ms = 6_000 + 250;
    assert!(
        node.total_air_time_ms() <= cap_ms,
        "airtime {} exceeded cap {}",
        node.total_air_time_ms(),
        cap_ms
    );
    // And the budget is actually being used, not stuck at zero
    assert!(node.total_air_time_ms() > 4_000);
}

#[test]
fn ack_cancels_wait_exactly_once() {
    let sim = Sim::new();
    let mut a = sim.node(40);
    let mut b = sim.node(41);
    let a_id = *a.identity();
    let b_id = *b.identity();

    let mut app_a = TestApp::new().with_peer(a.local_identity(), &b_id);
    let mut app_b = TestApp::new().with_peer(b.local_identity(), &a_id);

    let secret = a.local_identity().shared_secret(&b_id).unwrap();
    let mut expected_ack = [0u8; 4];
    a.with_ctx(|ctx| {
        let mut payload = ctx.rtc_now().to_le_bytes().to_vec();
        payload.push(0);
        payload.extend_from_slice(b"ping");
        expected_ack = fern_crypto::hash::hash4(&[payload.as_slice(), &ctx.self_id().pub_key]);
        let pkt = ctx
            .create_datagram(PayloadType::TxtMsg, &b_id, &secret, &payload)
            .unwrap();
        let airtime = ctx.est_airtime_ms(pkt.wire_len());
        ctx.send_flood(pkt, 0).unwrap();
        ctx.start_ack_wait(expected_ack, calc_flood_timeout_ms(airtime));
    });
    assert!(a.ack_pending());

    let links = [(0, 1)];
    run(
        &sim,
        &mut [&mut a, &mut b],
        &mut [&mut app_a, &mut app_b],
        &links,
        500,
    );
    assert_eq!(app_b.peer_data.len(), 1);

    // B acknowledges
    b.with_ctx(|ctx| {
        let pkt = ctx.create_ack(expected_ack);
        ctx.send_flood(pkt, 0).unwrap();
    });
    run(
        &sim,
        &mut [&mut a, &mut b],
        &mut [&mut app_a, &mut app_b],
        &links,
        500,
    );

    assert!(!a.ack_pending(), "matching ACK must cancel the wait");
    assert_eq!(app_a.acks.len(), 1);
    assert_eq!(app_a.acks[0], expected_ack);
    assert_eq!(app_a.timeouts, 0);

    // A second identical ACK is dedup-dropped and must not re-fire anything
    b.with_ctx(|ctx| {
        let pkt = ctx.create_ack(expected_ack);
        ctx.send_flood(pkt, 0).unwrap();
    });
    run(
        &sim,
        &mut [&mut a, &mut b],
        &mut [&mut app_a, &mut app_b],
        &links,
        500,
    );
    assert_eq!(app_a.acks.len(), 1);
    assert_eq!(app_a.timeouts, 0);
}

#[test]
fn unacked_send_times_out_once() {
    let sim = Sim::new();
    let mut a = sim.node(50);
    let b_ident = LocalIdentity::new_random(&mut TestRng::new(51)).unwrap();
    let mut app_a = TestApp::new().with_peer(a.local_identity(), b_ident.identity());

    let secret = a
        .local_identity()
        .shared_secret(b_ident.identity())
        .unwrap();
    a.with_ctx(|ctx| {
        let mut payload = ctx.rtc_now().to_le_bytes().to_vec();
        payload.push(0);
        payload.extend_from_slice(b"anyone?");
        let expected = fern_crypto::hash::hash4(&[payload.as_slice(), &ctx.self_id().pub_key]);
        let pkt = ctx
            .create_datagram(PayloadType::TxtMsg, b_ident.identity(), &secret, &payload)
            .unwrap();
        let airtime = ctx.est_airtime_ms(pkt.wire_len());
        ctx.send_flood(pkt, 0).unwrap();
        ctx.start_ack_wait(expected, calc_flood_timeout_ms(airtime));
    });

    // Nobody is listening; run well past the timeout
    run(&sim, &mut [&mut a], &mut [&mut app_a], &[], 10_000);

    assert!(!a.ack_pending());
    assert_eq!(app_a.timeouts, 1);
}

#[test]
fn group_text_reaches_channel_members_only() {
    let sim = Sim::new();
    let mut a = sim.node(60);
    let mut b = sim.node(61);
    let mut c = sim.node(62);

    // 32 x 'A' PSK
    const PSK: &str = "QUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUE=";
    let channel = GroupChannel::from_psk_base64(PSK).unwrap();

    let mut app_a = TestApp::new();
    app_a.channels.push(channel.clone());
    let mut app_b = TestApp::new();
    app_b.channels.push(channel.clone());
    let mut app_c = TestApp::new(); // not a member

    a.with_ctx(|ctx| {
        let mut payload = ctx.rtc_now().to_le_bytes().to_vec();
        payload.push(0);
        payload.extend_from_slice(b"group hello");
        let pkt = ctx.create_group_text(&channel, &payload).unwrap();
        ctx.send_flood(pkt, 0).unwrap();
    });

    run(
        &sim,
        &mut [&mut a, &mut b, &mut c],
        &mut [&mut app_a, &mut app_b, &mut app_c],
        &[(0, 1), (0, 2), (1, 2)],
        3_000,
    );

    assert_eq!(app_b.group.len(), 1);
    assert!(app_b.group[0].1.ends_with(b"group hello"));
    assert!(app_c.group.is_empty());
}

#[test]
fn text_scenario_end_to_end() {
    // Inbound flood TXT_MSG decrypts under the pair secret, the receiver
    // sees (is_flood=true, timestamp, text) and the ACK is the truncated
    // hash over payload || sender pub
    let sim = Sim::new();
    let mut rx = sim.node(70);
    let peer = LocalIdentity::new_random(&mut TestRng::new(71)).unwrap();
    let rx_id = *rx.identity();

    let mut app = TestApp::new().with_peer(rx.local_identity(), peer.identity());

    // Peer composes the frame out-of-band
    let secret = peer.shared_secret(&rx_id).unwrap();
    let mut payload = 1000u32.to_le_bytes().to_vec();
    payload.push(0);
    payload.extend_from_slice(b"hello");
    let pkt = codec::make_datagram(
        PayloadType::TxtMsg,
        &rx_id,
        peer.identity(),
        &secret,
        &payload,
    )
    .unwrap();
    rx.radio_mut().push_frame(&pkt.to_bytes(), -72);

    run(&sim, &mut [&mut rx], &mut [&mut app], &[], 100);

    assert_eq!(app.peer_data.len(), 1);
    let (ptype, _, data, is_flood) = &app.peer_data[0];
    assert_eq!(*ptype, PayloadType::TxtMsg);
    assert!(*is_flood);
    assert_eq!(u32::from_le_bytes([data[0], data[1], data[2], data[3]]), 1000);
    assert_eq!(&data[5..], b"hello");

    // The normative ACK for this message
    let expected = fern_crypto::hash::hash4(&[payload.as_slice(), &peer.identity().pub_key]);
    assert_eq!(expected.len(), 4);
}
