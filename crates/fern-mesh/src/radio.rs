// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Radio contract
//!
//! The physical link is behind this trait: the platform layer wraps its
//! SX12xx (or test loopback) driver and hands it to the mesh constructor.
//! All calls are non-blocking; the driver's IRQ handler may only set
//! flags, with decoding deferred to `poll` on the cooperative loop.

use crate::packet::MAX_FRAME_SIZE;
use fern_common::{RadioConfig, Result};
use heapless::Vec;

/// A received frame with its signal strength
pub struct RxFrame {
    /// Raw frame bytes
    pub data: Vec<u8, MAX_FRAME_SIZE>,
    /// RSSI of this reception in dBm
    pub rssi_dbm: i16,
}

/// Time-on-air estimation, separated out so the dispatch context can
/// borrow it immutably while the rest of the radio stays untouched
pub trait AirtimeEstimator {
    /// Estimated on-air time in milliseconds for a frame of `len_bytes`
    fn est_airtime_ms(&self, len_bytes: usize) -> u32;
}

/// Contract over the physical LoRa link
pub trait Radio: AirtimeEstimator {
    /// Initialize the hardware with the configured RF parameters
    ///
    /// # Errors
    ///
    /// `Error::RadioInitFailed` on hardware failure; fatal at boot.
    fn begin(&mut self, cfg: &RadioConfig) -> Result<()>;

    /// Transmit one frame
    ///
    /// # Errors
    ///
    /// `Error::RadioTxFailed` if the driver rejects the frame.
    fn send_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Fetch the next received frame, if one is waiting
    fn poll(&mut self) -> Option<RxFrame>;

    /// RSSI of the most recent reception in dBm
    fn last_rssi_dbm(&self) -> i16;

    /// Frames transmitted since boot
    fn packets_sent(&self) -> u32;

    /// Frames received since boot
    fn packets_recv(&self) -> u32;
}
