// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Packet pool
//!
//! A fixed array of packet slots with three disjoint states: free,
//! outbound (waiting to transmit, each with an earliest-TX time) and
//! pending (transmitted floods retained briefly for ACK correlation).
//! A slot is referenced by at most one queue at a time.
//!
//! Allocation failure is a first-class condition: it increments
//! `full_events`, which the repeater exposes in its stats reply.

use crate::packet::{Packet, PACKET_HASH_SIZE};
use fern_common::{Error, Result};
use heapless::Vec;

/// Number of packet slots
pub const POOL_SIZE: usize = 32;

/// How long a transmitted flood stays in the pending set
pub const PENDING_TTL_MS: u64 = 5_000;

#[derive(Clone, Copy)]
struct OutboundRef {
    slot: u8,
    earliest_tx: u64,
}

#[derive(Clone, Copy)]
struct PendingRef {
    slot: u8,
    hash: [u8; PACKET_HASH_SIZE],
    expires_at: u64,
}

/// Fixed-capacity pool of reusable packet buffers
pub struct PacketPool {
    slots: [Option<Packet>; POOL_SIZE],
    outbound: Vec<OutboundRef, POOL_SIZE>,
    pending: Vec<PendingRef, POOL_SIZE>,
    full_events: u32,
}

impl PacketPool {
    /// Empty pool, all slots free
    #[must_use]
    pub const fn new() -> Self {
        const NONE: Option<Packet> = None;
        Self {
            slots: [NONE; POOL_SIZE],
            outbound: Vec::new(),
            pending: Vec::new(),
            full_events: 0,
        }
    }

    fn alloc(&mut self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    /// Queue a packet for transmission no earlier than `earliest_tx`
    ///
    /// # Errors
    ///
    /// `Error::PoolExhausted` when no slot is free; `full_events` is
    /// incremented and the packet is dropped.
    pub fn enqueue(&mut self, pkt: Packet, earliest_tx: u64) -> Result<()> {
        let Some(slot) = self.alloc() else {
            self.full_events = self.full_events.saturating_add(1);
            return Err(Error::PoolExhausted);
        };
        self.slots[slot] = Some(pkt);
        // One queue entry per occupied slot, so this cannot overflow
        let _ = self.outbound.push(OutboundRef {
            slot: slot as u8,
            earliest_tx,
        });
        Ok(())
    }

    /// Pop the next transmittable packet
    ///
    /// Strict insertion order, gated per-entry by `earliest_tx`; an entry
    /// whose time has not come does not let later entries jump ahead of it.
    pub fn next_ready(&mut self, now: u64) -> Option<Packet> {
        let head = *self.outbound.first()?;
        if head.earliest_tx > now {
            return None;
        }
        self.outbound.remove(0);
        self.slots[head.slot as usize].take()
    }

    /// Earliest-TX time of the queue head, if any
    #[must_use]
    pub fn head_ready_at(&self) -> Option<u64> {
        self.outbound.first().map(|r| r.earliest_tx)
    }

    /// Retain a transmitted flood for ACK correlation
    ///
    /// Best effort: silently dropped when no slot is free, since the
    /// packet has already been sent.
    pub fn retain_pending(&mut self, pkt: Packet, hash: [u8; PACKET_HASH_SIZE], now: u64) {
        let Some(slot) = self.alloc() else {
            return;
        };
        self.slots[slot] = Some(pkt);
        let _ = self.pending.push(PendingRef {
            slot: slot as u8,
            hash,
            expires_at: now + PENDING_TTL_MS,
        });
    }

    /// Is a recently sent packet with this hash still retained?
    #[must_use]
    pub fn pending_contains(&self, hash: &[u8; PACKET_HASH_SIZE]) -> bool {
        self.pending.iter().any(|p| &p.hash == hash)
    }

    /// Release pending packets whose retention has lapsed
    pub fn expire_pending(&mut self, now: u64) {
        let slots = &mut self.slots;
        self.pending.retain(|p| {
            if p.expires_at <= now {
                slots[p.slot as usize] = None;
                false
            } else {
                true
            }
        });
    }

    /// Packets waiting to transmit
    #[must_use]
    pub fn outbound_count(&self) -> usize {
        self.outbound.len()
    }

    /// Free slots remaining
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// Times allocation failed because the pool was full
    #[must_use]
    pub const fn full_events(&self) -> u32 {
        self.full_events
    }
}

impl Default for PacketPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PayloadType, RouteKind};

    fn pkt(tag: u8) -> Packet {
        let mut p = Packet::new(RouteKind::Flood, PayloadType::TxtMsg);
        p.payload.push(tag).unwrap();
        p
    }

    #[test]
    fn fifo_order() {
        let mut pool = PacketPool::new();
        pool.enqueue(pkt(1), 0).unwrap();
        pool.enqueue(pkt(2), 0).unwrap();

        assert_eq!(pool.next_ready(10).unwrap().payload[0], 1);
        assert_eq!(pool.next_ready(10).unwrap().payload[0], 2);
        assert!(pool.next_ready(10).is_none());
        assert_eq!(pool.free_count(), POOL_SIZE);
    }

    #[test]
    fn earliest_tx_gates_the_head() {
        let mut pool = PacketPool::new();
        pool.enqueue(pkt(1), 500).unwrap();
        pool.enqueue(pkt(2), 0).unwrap();

        // Head not due yet; later entries must not overtake it
        assert!(pool.next_ready(100).is_none());
        assert_eq!(pool.next_ready(500).unwrap().payload[0], 1);
        assert_eq!(pool.next_ready(500).unwrap().payload[0], 2);
    }

    #[test]
    fn exhaustion_counts_full_events() {
        let mut pool = PacketPool::new();
        for i in 0..POOL_SIZE {
            pool.enqueue(pkt(i as u8), 0).unwrap();
        }
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.enqueue(pkt(0xFF), 0), Err(Error::PoolExhausted));
        assert_eq!(pool.full_events(), 1);
    }

    #[test]
    fn pending_retention_and_expiry() {
        let mut pool = PacketPool::new();
        let hash = [0xAB; PACKET_HASH_SIZE];
        pool.retain_pending(pkt(1), hash, 1_000);

        assert!(pool.pending_contains(&hash));
        assert_eq!(pool.free_count(), POOL_SIZE - 1);

        pool.expire_pending(1_000 + PENDING_TTL_MS);
        assert!(!pool.pending_contains(&hash));
        assert_eq!(pool.free_count(), POOL_SIZE);
    }

    #[test]
    fn slots_never_shared_between_queues() {
        let mut pool = PacketPool::new();
        pool.enqueue(pkt(1), 0).unwrap();
        let sent = pool.next_ready(0).unwrap();
        pool.retain_pending(sent, [1; PACKET_HASH_SIZE], 0);

        // One slot in pending, the rest free, outbound empty
        assert_eq!(pool.outbound_count(), 0);
        assert_eq!(pool.free_count(), POOL_SIZE - 1);
    }
}
