// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Platform traits
//!
//! The node core never talks to hardware directly. The target platform
//! implements these and hands them in at construction, alongside the
//! radio and clock traits from the mesh crate.

use fern_common::Result;
use fern_crypto::identity::LocalIdentity;
use fern_crypto::rng::CryptoRng;

/// Host board services
pub trait Board {
    /// Battery voltage in millivolts
    fn batt_milli_volts(&mut self) -> u16;

    /// Reset the device. Does not return on real hardware; test doubles
    /// record the call instead.
    fn reboot(&mut self);
}

/// Persistent identity storage
///
/// The blob format is fixed by [`LocalIdentity`]: 32-byte private seed
/// followed by the 32-byte public key, under a name in some filesystem.
pub trait IdentityStore {
    /// Load a stored identity, if present and intact
    fn load(&mut self, name: &str) -> Option<LocalIdentity>;

    /// Persist an identity
    ///
    /// # Errors
    ///
    /// Storage-layer failures surface as `Error` from the implementation.
    fn save(&mut self, name: &str, ident: &LocalIdentity) -> Result<()>;
}

/// First-boot identity bootstrap: load, or generate and persist
///
/// # Errors
///
/// `Error::RngFailure` if key generation fails, or whatever the store
/// reports on save.
pub fn load_or_create_identity<S, R>(store: &mut S, name: &str, rng: &mut R) -> Result<LocalIdentity>
where
    S: IdentityStore,
    R: CryptoRng,
{
    if let Some(ident) = store.load(name) {
        return Ok(ident);
    }
    let ident = LocalIdentity::new_random(rng)?;
    store.save(name, &ident)?;
    Ok(ident)
}
