// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! FernMesh core
//!
//! The mesh layer of a LoRa node:
//!
//! - **Packet**: wire framing, header bits, size limits
//! - **Pool**: fixed-capacity packet slots with outbound and pending queues
//! - **Dedup**: short-horizon set of seen packet hashes
//! - **Codec**: packet construction and envelope open/seal
//! - **Radio**: the contract the physical driver implements
//! - **Channel**: symmetric pre-shared-key broadcast groups
//! - **Mesh**: the single-threaded cooperative loop tying it together,
//!   dispatching decoded payloads into a [`MeshApp`]
//!
//! Everything is no_std, allocation-free, and driven from one `poll` call.

#![no_std]
#![warn(missing_docs)]

pub mod channel;
pub mod codec;
pub mod dedup;
pub mod mesh;
pub mod packet;
pub mod pool;
pub mod radio;

pub use channel::{GroupChannel, MAX_GROUP_CHANNELS};
pub use dedup::DedupSet;
pub use mesh::{Mesh, MeshApp, MeshCtx, MeshStats, PacketOrigin, MAX_SEARCH_RESULTS};
pub use packet::{Packet, PayloadType, RouteKind, MAX_PACKET_PAYLOAD, MAX_PATH_SIZE};
pub use pool::PacketPool;
pub use radio::{AirtimeEstimator, Radio, RxFrame};
