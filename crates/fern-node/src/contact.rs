// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Contact table
//!
//! Known peers with their cached ECDH secrets, learned names and
//! out-paths. Fixed capacity; the ECDH secret is computed exactly once,
//! at insert. Eviction is by least-recent advert, exposed as an explicit
//! hook rather than wired into insert.

use crate::advert::MAX_NAME_LEN;
use fern_common::{Error, Result};
use fern_crypto::aead::CipherKey;
use fern_crypto::identity::{Identity, LocalIdentity};
use fern_mesh::packet::MAX_PATH_SIZE;
use heapless::{String, Vec};

/// Contact table capacity
pub const MAX_CONTACTS: usize = 32;

/// One known peer
pub struct ContactInfo {
    /// Peer identity
    pub id: Identity,
    /// Cached ECDH shared secret, computed at insert
    pub secret: CipherKey,
    /// Name from the peer's most recent advert
    pub name: String<MAX_NAME_LEN>,
    /// Advertised node kind
    pub kind: u8,
    /// Timestamp of the newest accepted advert (replay guard)
    pub last_advert_timestamp: u32,
    /// Newest accepted message timestamp from this peer (replay guard)
    pub last_timestamp: u32,
    /// Learned route to the peer; `None` means flood
    pub out_path: Option<Vec<u8, MAX_PATH_SIZE>>,
}

/// Fixed-capacity table of known peers
pub struct ContactTable {
    entries: Vec<ContactInfo, MAX_CONTACTS>,
}

impl ContactTable {
    /// Empty table
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Number of known contacts
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no contacts are known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Contact by table index
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&ContactInfo> {
        self.entries.get(idx)
    }

    /// Mutable contact by table index
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut ContactInfo> {
        self.entries.get_mut(idx)
    }

    /// Index of the contact with this identity
    #[must_use]
    pub fn find_by_id(&self, id: &Identity) -> Option<usize> {
        self.entries.iter().position(|c| c.id.matches(id))
    }

    /// Insert a new contact, deriving its shared secret once
    ///
    /// # Errors
    ///
    /// `Error::ContactTableFull` at capacity, `Error::InvalidKey` if the
    /// peer key is not a valid curve point.
    pub fn add(&mut self, local: &LocalIdentity, id: Identity) -> Result<usize> {
        if self.entries.is_full() {
            return Err(Error::ContactTableFull);
        }
        let secret = local.shared_secret(&id)?;
        let contact = ContactInfo {
            id,
            secret,
            name: String::new(),
            kind: 0,
            last_advert_timestamp: 0,
            last_timestamp: 0,
            out_path: None,
        };
        // Capacity was just checked
        let _ = self.entries.push(contact);
        Ok(self.entries.len() - 1)
    }

    /// First contact whose name starts with `prefix`
    #[must_use]
    pub fn search_by_prefix(&self, prefix: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|c| c.name.as_str().starts_with(prefix))
    }

    /// Indexes of all contacts, most recently heard first
    ///
    /// Sorting happens on an index array keyed by the advert timestamp;
    /// the contact entries themselves never move.
    #[must_use]
    pub fn recent_indices(&self) -> Vec<u8, MAX_CONTACTS> {
        let mut order: Vec<u8, MAX_CONTACTS> = (0..self.entries.len() as u8).collect();
        order.sort_unstable_by(|&a, &b| {
            let ta = self.entries[a as usize].last_advert_timestamp;
            let tb = self.entries[b as usize].last_advert_timestamp;
            tb.cmp(&ta)
        });
        order
    }

    /// Forget the learned route to a contact, forcing floods again
    pub fn reset_path(&mut self, idx: usize) {
        if let Some(c) = self.entries.get_mut(idx) {
            c.out_path = None;
        }
    }

    /// Eviction hook: drop the contact heard from least recently
    pub fn evict_lru(&mut self) -> Option<Identity> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| c.last_advert_timestamp)
            .map(|(i, _)| i)?;
        let removed = self.entries.remove(idx);
        Some(removed.id)
    }

    /// Iterate over all contacts in table order
    pub fn iter(&self) -> impl Iterator<Item = &ContactInfo> {
        self.entries.iter()
    }
}

impl Default for ContactTable {
    fn default() -> Self {
        Self::new()
    }
}
