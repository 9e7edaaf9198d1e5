// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parser for `amixer` simple-control listings.
//!
//! Each control starts with a `Simple mixer control 'Name',0` header followed
//! by indented detail lines:
//!
//! ```text
//! Simple mixer control 'Mic-AN1-AN1',0
//!   Capabilities: pvolume pvolume-joined
//!   Playback channels: Mono
//!   Limits: Playback 0 - 65536
//!   Mono: Playback 32768 [50%]
//! ```

use regex::Regex;
use rmemix_ipc::ControlInfo;
use std::sync::OnceLock;

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Simple mixer control '(.*)',\d+\s*$").unwrap())
}

fn limits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^Limits:(?:\s+(?:Playback|Capture))?\s+(-?\d+)\s+-\s+(-?\d+)").unwrap()
    })
}

fn value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z][A-Za-z ]*?):\s+(?:Playback|Capture)\s*(.*)$").unwrap())
}

fn quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'([^']*)'").unwrap())
}

/// Raw value from the remainder of a channel line.
///
/// A leading integer wins; otherwise `[on]`/`[off]` map to 1/0.
fn parse_channel_value(rest: &str) -> Option<i64> {
    let first = rest.split_whitespace().next()?;
    if let Ok(value) = first.parse::<i64>() {
        return Some(value);
    }
    if rest.contains("[on]") {
        Some(1)
    } else if rest.contains("[off]") {
        Some(0)
    } else {
        None
    }
}

fn apply_detail(control: &mut ControlInfo, line: &str) {
    if let Some(caps) = line.strip_prefix("Capabilities:") {
        control.capabilities = caps.split_whitespace().map(str::to_string).collect();
    } else if let Some(channels) = line
        .strip_prefix("Playback channels:")
        .or_else(|| line.strip_prefix("Capture channels:"))
    {
        control.channels = channels.trim().to_string();
    } else if let Some(caps) = limits_re().captures(line) {
        control.min = caps[1].parse().unwrap_or(0);
        control.max = caps[2].parse().unwrap_or(0);
    } else if let Some(items) = line.strip_prefix("Items:") {
        control.items = quoted_re()
            .captures_iter(items)
            .map(|c| c[1].to_string())
            .collect();
    } else if let Some(item) = line.strip_prefix("Item0:") {
        let item = item.trim();
        control.item = quoted_re()
            .captures(item)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| item.to_string());
    } else if let Some(caps) = value_re().captures(line) {
        if let Some(value) = parse_channel_value(&caps[2]) {
            control.values.insert(caps[1].to_string(), value);
        }
    }
}

/// Parse every control section in an `amixer` listing, in output order.
pub fn parse_controls(output: &str) -> Vec<ControlInfo> {
    let mut controls = Vec::new();
    let mut current: Option<ControlInfo> = None;

    for line in output.lines() {
        if let Some(caps) = header_re().captures(line) {
            controls.extend(current.take());
            current = Some(ControlInfo::new(&caps[1]));
            continue;
        }
        let detail = line.trim();
        if detail.is_empty() {
            continue;
        }
        if let Some(control) = current.as_mut() {
            apply_detail(control, detail);
        }
    }
    controls.extend(current);
    controls
}
