// SPDX-License-Identifier: Apache-2.0
// Copyright 2025-2026 FernMesh Contributors

//! Admin command handler
//!
//! The same handler serves the serial CLI (with `sender_timestamp` 0)
//! and authenticated text messages over the mesh. Replies go into a
//! caller-supplied buffer; an empty reply means "nothing to say" (only
//! `reboot` does that).

use crate::hal::Board;
use crate::repeater::{RepeaterApp, MAX_REPLY_LEN};
use crate::FIRMWARE_VERSION;
use core::fmt::Write;
use fern_common::time::UtcTime;
use fern_mesh::mesh::MeshCtx;
use heapless::String;

impl<B: Board> RepeaterApp<B> {
    /// Execute one admin command and render the reply
    ///
    /// Known commands: `reboot`, `advert`, `clock`, `clock sync`,
    /// `set AF <factor>`, `ver`. Anything else replies with the help
    /// string.
    pub fn handle_command(
        &mut self,
        ctx: &mut MeshCtx<'_>,
        sender_timestamp: u32,
        command: &str,
        reply: &mut String<MAX_REPLY_LEN>,
    ) {
        reply.clear();
        let command = command.trim_start();

        if command == "reboot" {
            self.board.reboot();
        } else if command == "advert" {
            let _ = match self.send_self_advertisement(ctx) {
                Ok(()) => reply.push_str("OK - Advert sent"),
                Err(_) => reply.push_str("ERR: unable to send advert"),
            };
        } else if command == "clock sync" {
            let curr = ctx.rtc_now();
            if sender_timestamp > curr {
                ctx.rtc_set(sender_timestamp + 1);
                let _ = reply.push_str("OK - clock set");
            } else {
                let _ = reply.push_str("ERR: clock cannot go backwards");
            }
        } else if command == "clock" {
            let t = UtcTime::from_secs(ctx.rtc_now());
            let _ = write!(
                reply,
                "{:02}:{:02} - {}/{}/{} UTC",
                t.hour, t.minute, t.day, t.month, t.year
            );
        } else if let Some(setting) = command.strip_prefix("set ") {
            let setting = setting.trim_start();
            if let Some(value) = setting
                .strip_prefix("AF ")
                .or_else(|| setting.strip_prefix("AF="))
                .or_else(|| setting.strip_prefix("af "))
                .or_else(|| setting.strip_prefix("af="))
            {
                match value.trim().parse::<f32>() {
                    Ok(factor) if factor >= 0.0 => {
                        self.airtime_factor = factor;
                        let _ = reply.push_str("OK");
                    }
                    _ => {
                        let _ = reply.push_str("ERR: bad value");
                    }
                }
            } else {
                let _ = write!(reply, "unknown config: {setting}");
            }
        } else if command == "ver" {
            let _ = reply.push_str(FIRMWARE_VERSION);
        } else {
            let _ = write!(
                reply,
                "Unknown: {command} (commands: reboot, advert, clock, set, ver)"
            );
        }
    }
}
