// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Advertisement application data
//!
//! The mesh treats advert app data as an opaque blob; this is its shape:
//!
//! ```text
//! [kind:1] [flags:1] ([lat:4 LE i32] [lon:4 LE i32]) [name...]
//! ```
//!
//! Coordinates are micro-degrees, present only when the location flag is
//! set. The name is required: peers drop nameless adverts.

use fern_common::{Error, Result};
use fern_mesh::codec::MAX_ADVERT_DATA;
use heapless::{String, Vec};

/// Longest advertised node name
pub const MAX_NAME_LEN: usize = 32;

/// Advertised by interactive chat nodes
pub const ADV_KIND_CHAT: u8 = 1;

/// Advertised by unattended repeaters
pub const ADV_KIND_REPEATER: u8 = 2;

/// Delay before flooding a self-advert, to spread self-generated traffic
pub const ADVERT_DELAY_MS: u32 = 800;

const FLAG_HAS_LOCATION: u8 = 0x01;

/// Parsed advertisement contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertData {
    /// Node kind ([`ADV_KIND_CHAT`], [`ADV_KIND_REPEATER`], ...)
    pub kind: u8,
    /// Node name
    pub name: String<MAX_NAME_LEN>,
    /// Micro-degree latitude/longitude, if advertised
    pub location: Option<(i32, i32)>,
}

impl AdvertData {
    /// Advert with a name and no location
    #[must_use]
    pub fn new(kind: u8, name: &str) -> Self {
        let mut n = String::new();
        let take = name.len().min(MAX_NAME_LEN);
        let _ = n.push_str(&name[..take]);
        Self {
            kind,
            name: n,
            location: None,
        }
    }

    /// Attach a position in degrees
    #[must_use]
    pub fn with_location(mut self, lat_deg: f32, lon_deg: f32) -> Self {
        self.location = Some(((lat_deg * 1e6) as i32, (lon_deg * 1e6) as i32));
        self
    }

    /// Serialize into an advert app-data blob
    #[must_use]
    pub fn encode(&self) -> Vec<u8, MAX_ADVERT_DATA> {
        let mut out = Vec::new();
        let _ = out.push(self.kind);
        let _ = out.push(if self.location.is_some() {
            FLAG_HAS_LOCATION
        } else {
            0
        });
        if let Some((lat, lon)) = self.location {
            let _ = out.extend_from_slice(&lat.to_le_bytes());
            let _ = out.extend_from_slice(&lon.to_le_bytes());
        }
        let _ = out.extend_from_slice(self.name.as_bytes());
        out
    }

    /// Parse an advert app-data blob
    ///
    /// # Errors
    ///
    /// `Error::InvalidAdvert` on truncation, a missing name, or a name
    /// that is not UTF-8.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(Error::InvalidAdvert);
        }
        let kind = data[0];
        let flags = data[1];
        let mut rest = &data[2..];

        let location = if flags & FLAG_HAS_LOCATION != 0 {
            if rest.len() < 8 {
                return Err(Error::InvalidAdvert);
            }
            let lat = i32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
            let lon = i32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]);
            rest = &rest[8..];
            Some((lat, lon))
        } else {
            None
        };

        if rest.is_empty() || rest.len() > MAX_NAME_LEN {
            return Err(Error::InvalidAdvert);
        }
        let name_str = core::str::from_utf8(rest).map_err(|_| Error::InvalidAdvert)?;
        let mut name = String::new();
        let _ = name.push_str(name_str);

        Ok(Self {
            kind,
            name,
            location,
        })
    }
}
