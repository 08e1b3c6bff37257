// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Duplicate-packet suppression
//!
//! A bounded set of recently seen packet hashes. Entries expire after a
//! TTL comfortably longer than a flood can take to cross the mesh, or are
//! overwritten oldest-first when the set is full. Truncated-hash
//! collisions suppress a real packet only rarely; that trade is accepted
//! because floods re-deliver aggressively and a false negative costs a
//! whole duplicate storm.

use crate::packet::PACKET_HASH_SIZE;

/// Capacity, sized to absorb a burst of distinct floods
pub const DEDUP_CAPACITY: usize = 64;

/// Entry lifetime in milliseconds
pub const DEDUP_TTL_MS: u64 = 60_000;

#[derive(Clone, Copy)]
struct Entry {
    hash: [u8; PACKET_HASH_SIZE],
    expires_at: u64,
}

/// Sliding set of recent packet hashes
pub struct DedupSet {
    entries: [Option<Entry>; DEDUP_CAPACITY],
    next_slot: usize,
}

impl DedupSet {
    /// Empty set
    #[must_use]
    pub const fn new() -> Self {
        const NONE: Option<Entry> = None;
        Self {
            entries: [NONE; DEDUP_CAPACITY],
            next_slot: 0,
        }
    }

    /// Mark `hash` as observed; returns whether it was already present
    ///
    /// Returns `false` exactly once per hash within the TTL window.
    pub fn seen(&mut self, hash: [u8; PACKET_HASH_SIZE], now_ms: u64) -> bool {
        let mut free = None;
        for (i, entry) in self.entries.iter_mut().enumerate() {
            match entry {
                Some(e) if e.expires_at <= now_ms => {
                    *entry = None;
                    free.get_or_insert(i);
                }
                Some(e) if e.hash == hash => return true,
                Some(_) => {}
                None => {
                    free.get_or_insert(i);
                }
            }
        }

        let slot = match free {
            Some(i) => i,
            None => {
                // Full of live entries: overwrite round-robin
                let i = self.next_slot;
                self.next_slot = (self.next_slot + 1) % DEDUP_CAPACITY;
                i
            }
        };
        self.entries[slot] = Some(Entry {
            hash,
            expires_at: now_ms + DEDUP_TTL_MS,
        });
        false
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self, now_ms: u64) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Some(e) if e.expires_at > now_ms))
            .count()
    }

    /// True when no live entries remain
    #[must_use]
    pub fn is_empty(&self, now_ms: u64) -> bool {
        self.len(now_ms) == 0
    }
}

impl Default for DedupSet {
    fn default() -> Self {
        Self::new()
    }
}
