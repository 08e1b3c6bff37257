// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Logging for FernMesh nodes
//!
//! A small circular buffer of log entries. Nothing is printed from the mesh
//! itself; the host (CLI, debugger) drains the buffer when it wants to.
//! Decrypt failures and similar per-packet drops are recorded at `Debug`
//! level only, never `Info`, so a scanner probing keys leaves no visible
//! trace in normal operation.
//!
//! Key material must never be logged.

use core::fmt::{self, Write};
use heapless::String;

/// Maximum length of a single log message
pub const MAX_LOG_MESSAGE_LEN: usize = 96;

/// Number of entries retained
pub const LOG_BUFFER_SIZE: usize = 24;

/// Log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Needs attention; node may be degraded
    Error = 0,
    /// Something unexpected but survivable
    Warn = 1,
    /// Normal operational events
    Info = 2,
    /// Per-packet diagnostics
    Debug = 3,
}

impl LogLevel {
    /// Single-character prefix used when rendering entries
    #[must_use]
    pub const fn prefix(&self) -> char {
        match self {
            Self::Error => 'E',
            Self::Warn => 'W',
            Self::Info => 'I',
            Self::Debug => 'D',
        }
    }
}

/// One recorded log line
#[derive(Clone)]
pub struct LogEntry {
    /// Severity
    pub level: LogLevel,
    /// Milliseconds since boot when recorded
    pub at_ms: u64,
    /// Originating component ("mesh", "chat", ...)
    pub module: &'static str,
    /// Rendered message, truncated to [`MAX_LOG_MESSAGE_LEN`]
    pub message: String<MAX_LOG_MESSAGE_LEN>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:>10}] {} [{}] {}",
            self.at_ms,
            self.level.prefix(),
            self.module,
            self.message
        )
    }
}

/// Circular buffer of recent log entries
pub struct LogBuffer {
    entries: [Option<LogEntry>; LOG_BUFFER_SIZE],
    head: usize,
    count: usize,
    min_level: LogLevel,
}

impl LogBuffer {
    /// Create an empty buffer recording `Info` and above
    #[must_use]
    pub const fn new() -> Self {
        const NONE: Option<LogEntry> = None;
        Self {
            entries: [NONE; LOG_BUFFER_SIZE],
            head: 0,
            count: 0,
            min_level: LogLevel::Info,
        }
    }

    /// Set the minimum recorded level
    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    /// Would a message at `level` be recorded?
    #[must_use]
    pub const fn enabled(&self, level: LogLevel) -> bool {
        (level as u8) <= (self.min_level as u8)
    }

    /// Record a formatted message
    pub fn log(&mut self, level: LogLevel, at_ms: u64, module: &'static str, args: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }

        let mut message = String::new();
        let _ = message.write_fmt(args);

        self.entries[self.head] = Some(LogEntry {
            level,
            at_ms,
            module,
            message,
        });
        self.head = (self.head + 1) % LOG_BUFFER_SIZE;
        if self.count < LOG_BUFFER_SIZE {
            self.count += 1;
        }
    }

    /// Number of retained entries
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// True when no entries are retained
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Drop all entries
    pub fn clear(&mut self) {
        for e in &mut self.entries {
            *e = None;
        }
        self.head = 0;
        self.count = 0;
    }

    /// Iterate oldest-first
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        let oldest = if self.count < LOG_BUFFER_SIZE { 0 } else { self.head };
        (0..self.count).filter_map(move |i| {
            self.entries[(oldest + i) % LOG_BUFFER_SIZE].as_ref()
        })
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Record an error-level message
#[macro_export]
macro_rules! log_error {
    ($buf:expr, $ts:expr, $module:expr, $($arg:tt)*) => {
        $buf.log($crate::log::LogLevel::Error, $ts, $module, format_args!($($arg)*))
    };
}

/// Record a warning
#[macro_export]
macro_rules! log_warn {
    ($buf:expr, $ts:expr, $module:expr, $($arg:tt)*) => {
        $buf.log($crate::log::LogLevel::Warn, $ts, $module, format_args!($($arg)*))
    };
}

/// Record an informational message
#[macro_export]
macro_rules! log_info {
    ($buf:expr, $ts:expr, $module:expr, $($arg:tt)*) => {
        $buf.log($crate::log::LogLevel::Info, $ts, $module, format_args!($($arg)*))
    };
}

/// Record a per-packet diagnostic
#[macro_export]
macro_rules! log_debug {
    ($buf:expr, $ts:expr, $module:expr, $($arg:tt)*) => {
        $buf.log($crate::log::LogLevel::Debug, $ts, $module, format_args!($($arg)*))
    };
}
