// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Shared wire types and D-Bus interface definitions for RmeMix.
//!
//! This crate defines the contract between the RmeMix gateway daemon, which
//! owns the driver tools, and the control-plane client that drives it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use zbus::zvariant::Type;

/// D-Bus service name for the gateway daemon.
pub const DBUS_NAME: &str = "org.rmemix.Gateway";

/// D-Bus object path for the gateway interface.
pub const DBUS_PATH: &str = "/org/rmemix/Gateway";

/// D-Bus interface name.
pub const DBUS_INTERFACE: &str = "org.rmemix.Gateway1";

/// Channel keys the driver reports values under, in lookup order.
const VALUE_KEYS: [&str; 3] = ["Mono", "Front Left", "Front Right"];

/// Structured description of one mixer control as reported by the driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Type)]
pub struct ControlInfo {
    /// Control name (e.g. "Mic-AN1-AN1", "Mic-AN1 48V").
    pub name: String,
    /// Capability flags ("pvolume", "pswitch", "enum", ...).
    pub capabilities: Vec<String>,
    /// Channel layout as reported ("Mono", "Front Left - Front Right").
    pub channels: String,
    /// Lower raw limit (0 when the control has no limits).
    pub min: i64,
    /// Upper raw limit (0 when the control has no limits).
    pub max: i64,
    /// Current raw values keyed by channel ("Mono", "Front Left", ...).
    /// Switches report 1 for on and 0 for off.
    pub values: HashMap<String, i64>,
    /// Enumerated items for enum controls.
    pub items: Vec<String>,
    /// Currently selected enumerated item (empty string = not an enum).
    pub item: String,
}

impl ControlInfo {
    /// Create an empty descriptor for a control.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whether the control advertises a capability.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Whether this is an on/off switch.
    pub fn is_switch(&self) -> bool {
        self.capabilities
            .iter()
            .any(|c| c == "pswitch" || c == "cswitch" || c == "switch")
    }

    /// Whether this is an enumerated control.
    pub fn is_enum(&self) -> bool {
        self.has_capability("enum") || !self.items.is_empty()
    }

    /// Raw value for one channel key.
    pub fn value(&self, channel: &str) -> Option<i64> {
        self.values.get(channel).copied()
    }

    /// The first value in channel order (mono first, then front left).
    pub fn first_value(&self) -> Option<i64> {
        VALUE_KEYS.iter().find_map(|key| self.value(key))
    }

    /// Switch state, from either a switch value or an "On"/"Off" enum item.
    pub fn switch_state(&self) -> Option<bool> {
        if self.item.eq_ignore_ascii_case("on") {
            return Some(true);
        }
        if self.item.eq_ignore_ascii_case("off") {
            return Some(false);
        }
        self.first_value().map(|v| v != 0)
    }

    /// Currently selected enum item, if any.
    pub fn selected_item(&self) -> Option<&str> {
        if self.item.is_empty() {
            None
        } else {
            Some(&self.item)
        }
    }
}

/// Persisted per-channel display preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct ChannelRecord {
    /// Base control name of the input channel (stable key).
    pub control_name: String,
    /// User-chosen display name.
    pub display_name: String,
    /// Whether this channel is coupled with its right neighbour.
    pub stereo_coupled: bool,
}

impl ChannelRecord {
    pub fn new(
        control_name: impl Into<String>,
        display_name: impl Into<String>,
        stereo_coupled: bool,
    ) -> Self {
        Self {
            control_name: control_name.into(),
            display_name: display_name.into(),
            stereo_coupled,
        }
    }
}

/// Failures at the gateway boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to connect to D-Bus: {0}")]
    ConnectionFailed(String),
    #[error("Gateway daemon is not running: {0}")]
    DaemonNotRunning(String),
    #[error("Method call failed: {0}")]
    MethodCallFailed(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Driver tool failed: {0}")]
    ToolFailed(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<GatewayError> for zbus::fdo::Error {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::InvalidArgument(msg) => zbus::fdo::Error::InvalidArgs(msg),
            other => zbus::fdo::Error::Failed(other.to_string()),
        }
    }
}
