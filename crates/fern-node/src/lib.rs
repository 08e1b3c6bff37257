// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! FernMesh node applications
//!
//! The two application personalities that ride on the mesh core:
//!
//! - **Chat**: a contact table learned from adverts, text messages with
//!   ACKs and path learning, group channels
//! - **Repeater**: an unattended relay with a password-gated admin
//!   surface (stats, clock, airtime tuning) reachable over the mesh and
//!   the serial CLI
//!
//! Plus the platform traits both need: the board (battery, reboot) and
//! the persistent identity store.

#![no_std]
#![warn(missing_docs)]

pub mod advert;
pub mod chat;
pub mod command;
pub mod contact;
pub mod hal;
pub mod repeater;

pub use advert::{AdvertData, ADV_KIND_CHAT, ADV_KIND_REPEATER, MAX_NAME_LEN};
pub use chat::{ChatApp, ChatEvents, SendResult, MAX_TEXT_LEN};
pub use contact::{ContactInfo, ContactTable, MAX_CONTACTS};
pub use hal::{load_or_create_identity, Board, IdentityStore};
pub use repeater::{ClientInfo, RepeaterApp, RepeaterStats, MAX_CLIENTS};

/// Firmware version reported by the `ver` command
pub const FIRMWARE_VERSION: &str = "v1.0.0";
