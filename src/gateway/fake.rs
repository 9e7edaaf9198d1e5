// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scripted in-memory gateway for tests.

use super::{CommandGateway, GatewayResult};
use rmemix_ipc::{ChannelRecord, ControlInfo, GatewayError};
use std::collections::{HashMap, HashSet};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

#[derive(Debug, Default)]
struct FakeState {
    profiles: Vec<String>,
    active_profile: String,
    /// Controls per profile; the active profile's set is reported.
    controls: HashMap<String, HashMap<String, ControlInfo>>,
    volumes: HashMap<String, i64>,
    switches: HashMap<String, bool>,
    sensitivities: HashMap<String, String>,
    gains: HashMap<String, i64>,
    records: Vec<ChannelRecord>,
    buffer_size: u32,
    failing: HashSet<&'static str>,
    calls: Vec<String>,
}

/// In-memory gateway. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<FakeState>>,
}

impl FakeGateway {
    pub fn new(profiles: &[&str], active: &str) -> Self {
        let gateway = Self::default();
        {
            let mut state = gateway.lock();
            state.profiles = profiles.iter().map(|p| p.to_string()).collect();
            state.active_profile = active.to_string();
            state.buffer_size = 256;
        }
        gateway
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock()
    }

    /// Record a call and fail it if failure was injected for `method`.
    fn enter(&self, method: &'static str, detail: String) -> GatewayResult<MutexGuard<'_, FakeState>> {
        let mut state = self.lock();
        state.calls.push(if detail.is_empty() {
            method.to_string()
        } else {
            format!("{} {}", method, detail)
        });
        if state.failing.contains(method) {
            return Err(GatewayError::ToolFailed(format!("{} failed", method)));
        }
        Ok(state)
    }

    /// Make every call to `method` fail.
    pub fn fail(&self, method: &'static str) {
        self.lock().failing.insert(method);
    }

    /// Calls made so far, formatted as "method args".
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn calls_to(&self, method: &str) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.split(' ').next() == Some(method))
            .cloned()
            .collect()
    }

    pub fn set_controls(&self, profile: &str, controls: Vec<ControlInfo>) {
        self.lock().controls.insert(
            profile.to_string(),
            controls.into_iter().map(|c| (c.name.clone(), c)).collect(),
        );
    }

    pub fn set_profiles(&self, profiles: &[&str]) {
        self.lock().profiles = profiles.iter().map(|p| p.to_string()).collect();
    }

    pub fn active_profile(&self) -> String {
        self.lock().active_profile.clone()
    }

    pub fn volume(&self, control: &str) -> Option<i64> {
        self.lock().volumes.get(control).copied()
    }

    pub fn put_volume(&self, control: &str, raw: i64) {
        self.lock().volumes.insert(control.to_string(), raw);
    }

    pub fn switch(&self, control: &str) -> Option<bool> {
        self.lock().switches.get(control).copied()
    }

    pub fn put_switch(&self, control: &str, on: bool) {
        self.lock().switches.insert(control.to_string(), on);
    }

    pub fn gain(&self, control: &str) -> Option<i64> {
        self.lock().gains.get(control).copied()
    }

    pub fn put_gain(&self, control: &str, raw: i64) {
        self.lock().gains.insert(control.to_string(), raw);
    }

    pub fn sensitivity(&self, control: &str) -> Option<String> {
        self.lock().sensitivities.get(control).cloned()
    }

    pub fn records(&self) -> Vec<ChannelRecord> {
        self.lock().records.clone()
    }

    pub fn buffer_size(&self) -> u32 {
        self.lock().buffer_size
    }
}

/// A volume control descriptor with one mono value.
pub fn volume_control(name: &str, raw: i64) -> ControlInfo {
    let mut control = ControlInfo::new(name);
    control.capabilities = vec!["pvolume".to_string()];
    control.channels = "Mono".to_string();
    control.max = 65535;
    control.values.insert("Mono".to_string(), raw);
    control
}

/// A switch control descriptor.
pub fn switch_control(name: &str, on: bool) -> ControlInfo {
    let mut control = ControlInfo::new(name);
    control.capabilities = vec!["pswitch".to_string()];
    control.channels = "Mono".to_string();
    control.values.insert("Mono".to_string(), i64::from(on));
    control
}

/// An enumerated control descriptor.
pub fn enum_control(name: &str, items: &[&str], selected: &str) -> ControlInfo {
    let mut control = ControlInfo::new(name);
    control.capabilities = vec!["enum".to_string()];
    control.items = items.iter().map(|i| i.to_string()).collect();
    control.item = selected.to_string();
    control
}

impl CommandGateway for FakeGateway {
    async fn list_controls(&self, card: &str) -> GatewayResult<HashMap<String, ControlInfo>> {
        let state = self.enter("list_controls", card.to_string())?;
        Ok(state
            .controls
            .get(&state.active_profile)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_profiles(&self) -> GatewayResult<Vec<String>> {
        let state = self.enter("list_profiles", String::new())?;
        Ok(state.profiles.clone())
    }

    async fn get_active_profile(&self) -> GatewayResult<String> {
        let state = self.enter("get_active_profile", String::new())?;
        Ok(state.active_profile.clone())
    }

    async fn set_active_profile(&self, name: &str) -> GatewayResult<()> {
        let mut state = self.enter("set_active_profile", name.to_string())?;
        if !state.profiles.iter().any(|p| p == name) {
            return Err(GatewayError::NotFound(name.to_string()));
        }
        state.active_profile = name.to_string();
        Ok(())
    }

    async fn get_volume(&self, control: &str) -> GatewayResult<i64> {
        let state = self.enter("get_volume", control.to_string())?;
        state
            .volumes
            .get(control)
            .copied()
            .ok_or_else(|| GatewayError::NotFound(control.to_string()))
    }

    async fn set_volume(&self, control: &str, raw: i64) -> GatewayResult<()> {
        let mut state = self.enter("set_volume", format!("{} {}", control, raw))?;
        state.volumes.insert(control.to_string(), raw);
        Ok(())
    }

    async fn get_switch_state(&self, control: &str) -> GatewayResult<bool> {
        let state = self.enter("get_switch_state", control.to_string())?;
        state
            .switches
            .get(control)
            .copied()
            .ok_or_else(|| GatewayError::NotFound(control.to_string()))
    }

    async fn set_switch_state(&self, control: &str, on: bool) -> GatewayResult<()> {
        let mut state = self.enter("set_switch_state", format!("{} {}", control, on))?;
        state.switches.insert(control.to_string(), on);
        Ok(())
    }

    async fn get_line_sensitivity(&self, control: &str) -> GatewayResult<String> {
        let state = self.enter("get_line_sensitivity", control.to_string())?;
        state
            .sensitivities
            .get(control)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(control.to_string()))
    }

    async fn set_line_sensitivity(&self, control: &str, value: &str) -> GatewayResult<()> {
        let mut state = self.enter("set_line_sensitivity", format!("{} {}", control, value))?;
        state
            .sensitivities
            .insert(control.to_string(), value.to_string());
        Ok(())
    }

    async fn get_input_gain(&self, control: &str) -> GatewayResult<i64> {
        let state = self.enter("get_input_gain", control.to_string())?;
        state
            .gains
            .get(control)
            .copied()
            .ok_or_else(|| GatewayError::NotFound(control.to_string()))
    }

    async fn set_input_gain(&self, control: &str, raw: i64) -> GatewayResult<()> {
        let mut state = self.enter("set_input_gain", format!("{} {}", control, raw))?;
        state.gains.insert(control.to_string(), raw);
        Ok(())
    }

    async fn persist_channel_config(
        &self,
        control_name: &str,
        display_name: &str,
        stereo_coupled: bool,
    ) -> GatewayResult<()> {
        let mut state = self.enter(
            "persist_channel_config",
            format!("{} {} {}", control_name, display_name, stereo_coupled),
        )?;
        let record = ChannelRecord::new(control_name, display_name, stereo_coupled);
        match state
            .records
            .iter_mut()
            .find(|r| r.control_name == control_name)
        {
            Some(existing) => *existing = record,
            None => state.records.push(record),
        }
        Ok(())
    }

    async fn load_all_channel_configs(&self) -> GatewayResult<Vec<ChannelRecord>> {
        let state = self.enter("load_all_channel_configs", String::new())?;
        Ok(state.records.clone())
    }

    async fn get_buffer_size(&self) -> GatewayResult<u32> {
        let state = self.enter("get_buffer_size", String::new())?;
        Ok(state.buffer_size)
    }

    async fn set_buffer_size(&self, frames: u32) -> GatewayResult<()> {
        let mut state = self.enter("set_buffer_size", frames.to_string())?;
        state.buffer_size = frames;
        Ok(())
    }
}
