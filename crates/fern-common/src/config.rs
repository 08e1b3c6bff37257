// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Node configuration
//!
//! Radio parameters, advertised identity and administrative settings.
//! Everything here is compile-time or provisioning-time; the one runtime
//! tunable is the airtime budget factor (admin `set AF`), which lives in
//! the application, seeded from this config.

/// LoRa radio parameters, handed to `Radio::begin`
#[derive(Debug, Clone, Copy)]
pub struct RadioConfig {
    /// Center frequency in kHz (e.g. 915_000)
    pub freq_khz: u32,
    /// Bandwidth in kHz (e.g. 250)
    pub bw_khz: u32,
    /// Spreading factor, 6-12
    pub spreading_factor: u8,
    /// Coding rate denominator, 5-8 (4/5 .. 4/8)
    pub coding_rate: u8,
    /// Sync word; keep off the LoRaWAN public value
    pub sync_word: u8,
    /// TX power in dBm
    pub tx_power_dbm: i8,
    /// Preamble length in symbols
    pub preamble_syms: u16,
    /// TCXO reference voltage in millivolts
    pub tcxo_millivolts: u16,
}

impl RadioConfig {
    /// Default US915 profile
    pub const DEFAULT: Self = Self {
        freq_khz: 915_000,
        bw_khz: 250,
        spreading_factor: 10,
        coding_rate: 5,
        sync_word: 0x12,
        tx_power_dbm: 20,
        preamble_syms: 8,
        tcxo_millivolts: 1600,
    };
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// What this node announces about itself
#[derive(Debug, Clone, Copy)]
pub struct AdvertConfig {
    /// Node name, required (peers reject nameless adverts)
    pub name: &'static str,
    /// Latitude in degrees; 0.0 together with `lon` 0.0 means unset
    pub lat: f32,
    /// Longitude in degrees
    pub lon: f32,
}

impl AdvertConfig {
    /// Default advert settings
    pub const DEFAULT: Self = Self {
        name: "node",
        lat: 0.0,
        lon: 0.0,
    };
}

/// Complete node configuration
#[derive(Debug, Clone, Copy)]
pub struct NodeConfig {
    /// Radio parameters
    pub radio: RadioConfig,
    /// Advertisement contents
    pub advert: AdvertConfig,
    /// Password expected in admin login requests
    pub admin_password: &'static str,
    /// Initial airtime budget factor (fraction of wall time allowed on air)
    pub airtime_factor: f32,
}

impl NodeConfig {
    /// Default configuration
    pub const DEFAULT: Self = Self {
        radio: RadioConfig::DEFAULT,
        advert: AdvertConfig::DEFAULT,
        admin_password: "h^(kl@#)",
        airtime_factor: 1.0,
    };
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
