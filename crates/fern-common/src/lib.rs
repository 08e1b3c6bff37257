// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! FernMesh common library
//!
//! Shared foundation for all FernMesh crates:
//!
//! - **Errors**: unified error type with numeric codes
//! - **Logging**: fixed-capacity circular log buffer
//! - **Time**: millisecond/wall-clock abstractions and deadlines
//! - **Config**: node and radio configuration

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod errors;
pub mod log;
pub mod time;

pub use config::{AdvertConfig, NodeConfig, RadioConfig};
pub use errors::{Error, Result};
pub use log::{LogBuffer, LogLevel};
pub use time::{Deadline, MillisClock, RtcClock, UtcTime};
