// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Command gateway contract.
//!
//! The gateway executes named operations against the driver and owns the
//! real device state. Every call is an async round-trip that may fail with
//! a [`GatewayError`]. Volumes and gains cross the boundary as raw device
//! units only.

pub mod dbus;
#[cfg(test)]
pub mod fake;

pub use dbus::DbusGateway;
pub use rmemix_ipc::{ChannelRecord, ControlInfo, GatewayError};

use std::collections::HashMap;
use std::future::Future;

/// Result of a gateway call.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Operations the core needs from the driver side.
pub trait CommandGateway: Send + Sync {
    /// Snapshot of every mixer control on an ALSA card, keyed by name.
    fn list_controls(
        &self,
        card: &str,
    ) -> impl Future<Output = GatewayResult<HashMap<String, ControlInfo>>> + Send;

    /// Profile names the card currently supports.
    fn list_profiles(&self) -> impl Future<Output = GatewayResult<Vec<String>>> + Send;

    fn get_active_profile(&self) -> impl Future<Output = GatewayResult<String>> + Send;

    fn set_active_profile(&self, name: &str) -> impl Future<Output = GatewayResult<()>> + Send;

    fn get_volume(&self, control: &str) -> impl Future<Output = GatewayResult<i64>> + Send;

    fn set_volume(&self, control: &str, raw: i64) -> impl Future<Output = GatewayResult<()>> + Send;

    /// Used for both phantom power and pad.
    fn get_switch_state(&self, control: &str) -> impl Future<Output = GatewayResult<bool>> + Send;

    fn set_switch_state(
        &self,
        control: &str,
        on: bool,
    ) -> impl Future<Output = GatewayResult<()>> + Send;

    /// Selected item of a sensitivity selector ("+4dBu", "-10dBV").
    fn get_line_sensitivity(
        &self,
        control: &str,
    ) -> impl Future<Output = GatewayResult<String>> + Send;

    fn set_line_sensitivity(
        &self,
        control: &str,
        value: &str,
    ) -> impl Future<Output = GatewayResult<()>> + Send;

    fn get_input_gain(&self, control: &str) -> impl Future<Output = GatewayResult<i64>> + Send;

    fn set_input_gain(
        &self,
        control: &str,
        raw: i64,
    ) -> impl Future<Output = GatewayResult<()>> + Send;

    /// Store display preferences for one input channel.
    fn persist_channel_config(
        &self,
        control_name: &str,
        display_name: &str,
        stereo_coupled: bool,
    ) -> impl Future<Output = GatewayResult<()>> + Send;

    fn load_all_channel_configs(
        &self,
    ) -> impl Future<Output = GatewayResult<Vec<ChannelRecord>>> + Send;

    /// PipeWire clock quantum in frames.
    fn get_buffer_size(&self) -> impl Future<Output = GatewayResult<u32>> + Send;

    fn set_buffer_size(&self, frames: u32) -> impl Future<Output = GatewayResult<()>> + Send;
}
