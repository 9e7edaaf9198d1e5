// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Channel state store.
//!
//! The store is the single owner of the active topology, the profile sets,
//! the control snapshot, and the cached per-channel values. It never talks
//! to the gateway itself: mutations are prepared here, executed elsewhere,
//! and committed back with the epoch they were issued under.

use crate::level;
use crate::mutation::{
    CacheUpdate, CommitOutcome, Completion, DeviceWrite, Epoch, PendingMutation, PreampReads,
    RefreshPlan,
};
use crate::profile::Acquisition;
use crate::resolver::{self, ResolveError};
use crate::topology::{
    AudioProfile, InputChannel, LineSensitivity, OutputClass, SoundcardTopology, StereoPair,
    TopologyCatalog,
};
use rmemix_ipc::{ChannelRecord, ControlInfo, GatewayError};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Smallest accepted buffer size in frames.
pub const MIN_BUFFER_SIZE: u32 = 32;
/// Largest accepted buffer size in frames.
pub const MAX_BUFFER_SIZE: u32 = 2048;

/// Profile lifecycle of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready,
    Reloading,
}

/// Errors from store operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("No input channel with index {0}")]
    UnknownChannel(usize),
    #[error("Channel {0} is odd-indexed and cannot lead a stereo pair")]
    OddChannelCoupling(usize),
    #[error("Channel {0} has no right neighbour to couple with")]
    NoStereoPartner(usize),
    #[error("Channel {0} is the right half of a coupled stereo pair")]
    CoupledRightChannel(usize),
    #[error("Profile '{0}' is not supported by the card")]
    UnsupportedProfile(String),
    #[error("Profile '{0}' is not a known profile")]
    UnknownProfile(String),
    #[error("Store is busy ({0:?})")]
    Busy(Lifecycle),
    #[error("Store is not initialized")]
    NotReady,
    #[error("Invalid buffer size {0}: expected a power of two between 32 and 2048")]
    InvalidBufferSize(u32),
}

/// Cached device values for one input channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InputState {
    /// Send level to the speakers, in dB.
    pub monitor_send: Option<StereoPair<f64>>,
    /// Send level to the headphones, in dB.
    pub headphones_send: Option<StereoPair<f64>>,
    pub gain_db: Option<f64>,
    pub phantom: Option<bool>,
    pub pad: Option<bool>,
    pub sensitivity: Option<LineSensitivity>,
}

/// Check a buffer size before it is sent to the device.
pub fn validate_buffer_size(frames: u32) -> Result<(), StoreError> {
    if frames.is_power_of_two() && (MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&frames) {
        Ok(())
    } else {
        Err(StoreError::InvalidBufferSize(frames))
    }
}

fn is_hidden(inputs: &[InputChannel], channel: &InputChannel) -> bool {
    !channel.is_left()
        && inputs
            .iter()
            .any(|c| c.index + 1 == channel.index && c.stereo_coupled)
}

/// Input channels in display order, with coupled pairs collapsed onto
/// their left member. Clone the iterator to walk it again.
#[derive(Debug, Clone)]
pub struct VisibleChannels<'a> {
    inputs: &'a [InputChannel],
    position: usize,
}

impl<'a> Iterator for VisibleChannels<'a> {
    type Item = &'a InputChannel;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(channel) = self.inputs.get(self.position) {
            self.position += 1;
            if !is_hidden(self.inputs, channel) {
                return Some(channel);
            }
        }
        None
    }
}

/// Live model of the mixer.
#[derive(Debug, Clone)]
pub struct ChannelStore {
    lifecycle: Lifecycle,
    epoch: Epoch,
    compatibility_mode: bool,
    catalog: TopologyCatalog,
    /// Curated profile list, in display order.
    preferred_profiles: Vec<AudioProfile>,
    /// Profiles the card reported as supported.
    supported_profiles: Vec<String>,
    active_profile: Option<AudioProfile>,
    switch_target: Option<AudioProfile>,
    topology: SoundcardTopology,
    controls: HashMap<String, ControlInfo>,
    inputs: HashMap<usize, InputState>,
    outputs: HashMap<OutputClass, StereoPair<f64>>,
    playback: HashMap<OutputClass, StereoPair<f64>>,
    buffer_size: Option<u32>,
}

impl ChannelStore {
    pub fn new(
        preferred_profiles: Vec<AudioProfile>,
        catalog: TopologyCatalog,
        compatibility_mode: bool,
    ) -> Self {
        let topology = catalog.fallback().clone();
        Self {
            lifecycle: Lifecycle::Uninitialized,
            epoch: Epoch::default(),
            compatibility_mode,
            catalog,
            preferred_profiles,
            supported_profiles: Vec::new(),
            active_profile: None,
            switch_target: None,
            topology,
            controls: HashMap::new(),
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            playback: HashMap::new(),
            buffer_size: None,
        }
    }

    // ==================== Queries ====================

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn compatibility_mode(&self) -> bool {
        self.compatibility_mode
    }

    pub fn preferred_profiles(&self) -> &[AudioProfile] {
        &self.preferred_profiles
    }

    pub fn supported_profiles(&self) -> &[String] {
        &self.supported_profiles
    }

    pub fn active_profile(&self) -> Option<&AudioProfile> {
        self.active_profile.as_ref()
    }

    /// Profile a switch is in flight to, if any.
    pub fn switch_target(&self) -> Option<&AudioProfile> {
        self.switch_target.as_ref()
    }

    /// Preferred profiles the card supports, in preferred order.
    pub fn available_profiles(&self) -> Vec<&AudioProfile> {
        self.preferred_profiles
            .iter()
            .filter(|p| self.supported_profiles.contains(&p.name))
            .collect()
    }

    pub fn topology(&self) -> &SoundcardTopology {
        &self.topology
    }

    pub fn input(&self, index: usize) -> Option<&InputChannel> {
        self.topology.input(index)
    }

    pub fn controls(&self) -> &HashMap<String, ControlInfo> {
        &self.controls
    }

    pub fn control(&self, name: &str) -> Option<&ControlInfo> {
        self.controls.get(name)
    }

    pub fn input_state(&self, index: usize) -> Option<&InputState> {
        self.inputs.get(&index)
    }

    pub fn output_level(&self, class: OutputClass) -> Option<StereoPair<f64>> {
        self.outputs.get(&class).copied()
    }

    pub fn playback_level(&self, class: OutputClass) -> Option<StereoPair<f64>> {
        self.playback.get(&class).copied()
    }

    pub fn buffer_size(&self) -> Option<u32> {
        self.buffer_size
    }

    /// Input channels to display.
    ///
    /// Even channels are always visible. An odd channel is hidden when its
    /// left neighbour is stereo-coupled.
    pub fn visible_channels(&self) -> VisibleChannels<'_> {
        VisibleChannels {
            inputs: &self.topology.inputs,
            position: 0,
        }
    }

    /// Right partner of a left (even) channel.
    pub fn right_channel_of(&self, index: usize) -> Option<&InputChannel> {
        if index % 2 != 0 {
            return None;
        }
        self.topology.input(index + 1)
    }

    // ==================== Profiles ====================

    pub fn set_supported_profiles(&mut self, profiles: Vec<String>) {
        debug!("Supported profiles: {:?}", profiles);
        self.supported_profiles = profiles;
    }

    /// Check that a profile is both supported and preferred.
    pub fn validate_profile(&self, name: &str) -> Result<AudioProfile, StoreError> {
        if !self.supported_profiles.iter().any(|p| p == name) {
            warn!("Profile '{}' is not supported by the card", name);
            return Err(StoreError::UnsupportedProfile(name.to_string()));
        }

        match self.preferred_profiles.iter().find(|p| p.name == name) {
            Some(profile) => Ok(profile.clone()),
            None => {
                warn!("Profile '{}' is not in the preferred profile list", name);
                Err(StoreError::UnknownProfile(name.to_string()))
            }
        }
    }

    /// Make a profile active and swap in its topology.
    ///
    /// Validation failures leave everything unchanged.
    pub fn set_active_profile(&mut self, name: &str) -> Result<(), StoreError> {
        if matches!(
            self.lifecycle,
            Lifecycle::Initializing | Lifecycle::Reloading
        ) {
            return Err(StoreError::Busy(self.lifecycle));
        }
        let profile = self.validate_profile(name)?;
        self.adopt_profile(profile);
        Ok(())
    }

    /// Replace topology and caches in one step.
    fn adopt_profile(&mut self, profile: AudioProfile) {
        info!("Adopting profile '{}'", profile.name);
        self.topology = self.catalog.get(&profile.name).clone();
        self.active_profile = Some(profile);
        self.epoch = self.epoch.next();
        self.controls.clear();
        self.inputs.clear();
        self.outputs.clear();
        self.playback.clear();
    }

    fn profile_for(&self, name: &str) -> AudioProfile {
        match self.preferred_profiles.iter().find(|p| p.name == name) {
            Some(profile) => profile.clone(),
            None => {
                warn!("Active profile '{}' is not in the preferred profile list", name);
                AudioProfile::new(name, name)
            }
        }
    }

    // ==================== Lifecycle ====================

    /// Enter `Initializing`. Allowed from `Uninitialized` and `Ready`.
    pub fn begin_initialize(&mut self) -> Result<Epoch, StoreError> {
        if matches!(
            self.lifecycle,
            Lifecycle::Initializing | Lifecycle::Reloading
        ) {
            return Err(StoreError::Busy(self.lifecycle));
        }
        self.lifecycle = Lifecycle::Initializing;
        self.epoch = self.epoch.next();
        Ok(self.epoch)
    }

    /// Enter `Reloading` for a switch to `name`.
    ///
    /// Bumps the epoch so responses to requests issued before the switch
    /// are discarded.
    pub fn begin_profile_switch(&mut self, name: &str) -> Result<AudioProfile, StoreError> {
        match self.lifecycle {
            Lifecycle::Ready => {}
            Lifecycle::Uninitialized => return Err(StoreError::NotReady),
            other => return Err(StoreError::Busy(other)),
        }
        let profile = self.validate_profile(name)?;

        info!("Switching profile to '{}'", profile.name);
        self.lifecycle = Lifecycle::Reloading;
        self.epoch = self.epoch.next();
        self.switch_target = Some(profile.clone());
        Ok(profile)
    }

    /// Return to `Ready` keeping the previous topology.
    pub fn abort_profile_switch(&mut self, reason: &impl fmt::Display) {
        match self.switch_target.take() {
            Some(target) => warn!("Profile switch to '{}' failed: {}", target.name, reason),
            None => warn!("Profile switch failed: {}", reason),
        }
        self.lifecycle = Lifecycle::Ready;
    }

    /// Adopt whatever an acquisition obtained and return to `Ready`.
    ///
    /// The topology is only swapped if the active profile was read.
    pub fn complete_acquisition(&mut self, acquisition: Acquisition) {
        let Acquisition {
            supported,
            active,
            controls,
            records,
            error,
        } = acquisition;

        if let Some(supported) = supported {
            self.set_supported_profiles(supported);
        }

        if let Some(active) = active {
            let profile = self.profile_for(&active);
            self.adopt_profile(profile);
            if let Some(records) = records {
                self.apply_records(&records);
            }
            if let Some(controls) = controls {
                self.seed_from_controls(controls);
            }
        }

        if let Some(e) = error {
            warn!("Acquisition incomplete: {}", e);
        }
        self.switch_target = None;
        self.lifecycle = Lifecycle::Ready;
    }

    /// Seed display names and coupling from persisted records.
    fn apply_records(&mut self, records: &[ChannelRecord]) {
        for record in records {
            let Some(index) = self
                .topology
                .input_by_control(&record.control_name)
                .map(|c| c.index)
            else {
                debug!("No channel for persisted record '{}'", record.control_name);
                continue;
            };

            let can_couple = index % 2 == 0 && self.topology.input(index + 1).is_some();
            if record.stereo_coupled && !can_couple {
                warn!(
                    "Ignoring stereo coupling for '{}': channel {} cannot lead a pair",
                    record.control_name, index
                );
            }

            if let Some(channel) = self.topology.input_mut(index) {
                if !record.display_name.is_empty() {
                    channel.display_name = record.display_name.clone();
                }
                channel.stereo_coupled = record.stereo_coupled && can_couple;
            }
        }
    }

    fn snapshot_db(&self, control: &str) -> Option<f64> {
        self.controls
            .get(control)?
            .first_value()
            .map(level::raw_to_db)
    }

    fn snapshot_pair(&self, controls: &StereoPair<String>) -> Option<StereoPair<f64>> {
        Some(StereoPair::new(
            self.snapshot_db(&controls.left)?,
            self.snapshot_db(&controls.right)?,
        ))
    }

    fn state_from_snapshot(&self, channel: &InputChannel) -> InputState {
        let index = channel.index;
        let send = |class| {
            self.send_controls(index, class)
                .ok()
                .and_then(|c| self.snapshot_pair(&c))
        };

        InputState {
            monitor_send: send(OutputClass::Speakers),
            headphones_send: send(OutputClass::Headphones),
            gain_db: resolver::gain_control(channel).ok().and_then(|(name, range)| {
                self.controls
                    .get(&name)?
                    .first_value()
                    .map(|raw| range.raw_to_db(raw))
            }),
            phantom: resolver::phantom_control(channel)
                .ok()
                .and_then(|name| self.controls.get(&name)?.switch_state()),
            pad: resolver::pad_control(channel)
                .ok()
                .and_then(|name| self.controls.get(&name)?.switch_state()),
            sensitivity: resolver::sensitivity_control(channel).ok().and_then(|name| {
                self.controls
                    .get(&name)?
                    .selected_item()?
                    .parse::<LineSensitivity>()
                    .ok()
            }),
        }
    }

    /// Fill the caches from a control snapshot.
    fn seed_from_controls(&mut self, controls: HashMap<String, ControlInfo>) {
        self.controls = controls;

        let inputs: HashMap<usize, InputState> = self
            .topology
            .inputs
            .iter()
            .map(|c| (c.index, self.state_from_snapshot(c)))
            .filter(|(_, state)| *state != InputState::default())
            .collect();

        let mut outputs = HashMap::new();
        let mut playback = HashMap::new();
        for output in &self.topology.outputs {
            if let Some(levels) = self.snapshot_pair(&output.control) {
                outputs.insert(output.class, levels);
            }
            let sends = resolver::resolve_playback_send(
                &self.topology.playback,
                output.class,
                &self.topology.outputs,
                self.compatibility_mode,
            );
            if let Some(levels) = sends.ok().and_then(|s| self.snapshot_pair(&s)) {
                playback.insert(output.class, levels);
            }
        }

        debug!(
            "Seeded {} inputs and {} outputs from {} controls",
            inputs.len(),
            outputs.len(),
            self.controls.len()
        );
        self.inputs = inputs;
        self.outputs = outputs;
        self.playback = playback;
    }

    // ==================== Cache mutators ====================

    fn input_state_mut(&mut self, index: usize) -> Result<&mut InputState, StoreError> {
        if self.topology.input(index).is_none() {
            return Err(StoreError::UnknownChannel(index));
        }
        Ok(self.inputs.entry(index).or_default())
    }

    fn validate_coupling(&self, index: usize, coupled: bool) -> Result<&InputChannel, StoreError> {
        let channel = self
            .topology
            .input(index)
            .ok_or(StoreError::UnknownChannel(index))?;
        if !channel.is_left() {
            warn!("Rejecting stereo coupling on odd channel {}", index);
            return Err(StoreError::OddChannelCoupling(index));
        }
        if coupled && self.topology.input(index + 1).is_none() {
            return Err(StoreError::NoStereoPartner(index));
        }
        Ok(channel)
    }

    /// Couple or decouple an even channel with its right neighbour.
    pub fn set_stereo_coupled(&mut self, index: usize, coupled: bool) -> Result<(), StoreError> {
        self.validate_coupling(index, coupled)?;
        if let Some(channel) = self.topology.input_mut(index) {
            channel.stereo_coupled = coupled;
        }
        Ok(())
    }

    pub fn rename_channel(&mut self, index: usize, name: &str) -> Result<(), StoreError> {
        let channel = self
            .topology
            .input_mut(index)
            .ok_or(StoreError::UnknownChannel(index))?;
        channel.display_name = name.to_string();
        Ok(())
    }

    pub fn set_channel_monitor_send(
        &mut self,
        index: usize,
        db: StereoPair<f64>,
    ) -> Result<(), StoreError> {
        self.input_state_mut(index)?.monitor_send = Some(db);
        Ok(())
    }

    pub fn set_channel_hp_send(
        &mut self,
        index: usize,
        db: StereoPair<f64>,
    ) -> Result<(), StoreError> {
        self.input_state_mut(index)?.headphones_send = Some(db);
        Ok(())
    }

    pub fn set_channel_gain(&mut self, index: usize, db: f64) -> Result<(), StoreError> {
        self.input_state_mut(index)?.gain_db = Some(db);
        Ok(())
    }

    pub fn set_main_volume(
        &mut self,
        class: OutputClass,
        db: StereoPair<f64>,
    ) -> Result<(), StoreError> {
        if self.topology.output(class).is_none() {
            return Err(ResolveError::OutputNotFound(class).into());
        }
        self.outputs.insert(class, db);
        Ok(())
    }

    pub fn set_playback_volume(
        &mut self,
        class: OutputClass,
        db: StereoPair<f64>,
    ) -> Result<(), StoreError> {
        if self.topology.output(class).is_none() && !self.compatibility_mode {
            return Err(ResolveError::OutputNotFound(class).into());
        }
        self.playback.insert(class, db);
        Ok(())
    }

    pub fn set_buffer_size(&mut self, frames: u32) {
        self.buffer_size = Some(frames);
    }

    fn apply_update(&mut self, update: CacheUpdate) -> Result<(), StoreError> {
        match update {
            CacheUpdate::MonitorSend { index, db } => self.set_channel_monitor_send(index, db),
            CacheUpdate::HeadphonesSend { index, db } => self.set_channel_hp_send(index, db),
            CacheUpdate::Gain { index, db } => self.set_channel_gain(index, db),
            CacheUpdate::Phantom { index, on } => {
                self.input_state_mut(index)?.phantom = Some(on);
                Ok(())
            }
            CacheUpdate::Pad { index, on } => {
                self.input_state_mut(index)?.pad = Some(on);
                Ok(())
            }
            CacheUpdate::Sensitivity { index, value } => {
                self.input_state_mut(index)?.sensitivity = Some(value);
                Ok(())
            }
            CacheUpdate::OutputLevel { class, db } => self.set_main_volume(class, db),
            CacheUpdate::PlaybackLevel { class, db } => self.set_playback_volume(class, db),
            CacheUpdate::DisplayName { index, name } => self.rename_channel(index, &name),
            CacheUpdate::StereoCoupled { index, coupled } => {
                self.set_stereo_coupled(index, coupled)
            }
            CacheUpdate::BufferSize(frames) => {
                self.set_buffer_size(frames);
                Ok(())
            }
        }
    }

    // ==================== Mutation pipeline ====================

    fn ensure_ready(&self) -> Result<(), StoreError> {
        match self.lifecycle {
            Lifecycle::Ready if self.active_profile.is_some() => Ok(()),
            Lifecycle::Ready | Lifecycle::Uninitialized => Err(StoreError::NotReady),
            other => Err(StoreError::Busy(other)),
        }
    }

    /// A channel that may be addressed directly (not a hidden right half).
    fn addressable(&self, index: usize) -> Result<&InputChannel, StoreError> {
        let channel = self
            .topology
            .input(index)
            .ok_or(StoreError::UnknownChannel(index))?;
        if is_hidden(&self.topology.inputs, channel) {
            return Err(StoreError::CoupledRightChannel(index));
        }
        Ok(channel)
    }

    /// The channel plus its right partner when coupled.
    fn targets(&self, index: usize) -> Result<Vec<&InputChannel>, StoreError> {
        let channel = self.addressable(index)?;
        let mut targets = vec![channel];
        if channel.stereo_coupled {
            if let Some(right) = self.right_channel_of(index) {
                targets.push(right);
            }
        }
        Ok(targets)
    }

    /// Send controls from an input to an output class.
    pub fn send_controls(
        &self,
        index: usize,
        class: OutputClass,
    ) -> Result<StereoPair<String>, StoreError> {
        let channel = self.addressable(index)?;
        let outputs = &self.topology.outputs;

        if channel.stereo_coupled {
            if let Some(right) = self.right_channel_of(index) {
                return Ok(resolver::resolve_stereo_send(
                    &channel.control_name,
                    &right.control_name,
                    class,
                    outputs,
                    self.compatibility_mode,
                )?);
            }
        }

        Ok(resolver::resolve_send(
            &channel.control_name,
            class,
            outputs,
            self.compatibility_mode,
        )?)
    }

    fn pending(&self, writes: Vec<DeviceWrite>, updates: Vec<CacheUpdate>) -> PendingMutation {
        PendingMutation {
            epoch: self.epoch,
            writes,
            updates,
        }
    }

    fn volume_writes(controls: StereoPair<String>, raw: i64) -> Vec<DeviceWrite> {
        vec![
            DeviceWrite::Volume {
                control: controls.left,
                raw,
            },
            DeviceWrite::Volume {
                control: controls.right,
                raw,
            },
        ]
    }

    /// Send level from an input to the speakers or headphones.
    pub fn prepare_send(
        &self,
        index: usize,
        class: OutputClass,
        db: f64,
    ) -> Result<PendingMutation, StoreError> {
        self.ensure_ready()?;
        let controls = self.send_controls(index, class)?;
        let raw = level::db_to_raw(db);
        let db = StereoPair::both(level::raw_to_db(raw));

        let update = match class {
            OutputClass::Speakers => CacheUpdate::MonitorSend { index, db },
            OutputClass::Headphones => CacheUpdate::HeadphonesSend { index, db },
        };
        Ok(self.pending(Self::volume_writes(controls, raw), vec![update]))
    }

    /// Input gain. Coupled pairs get the same gain on both members.
    pub fn prepare_gain(&self, index: usize, db: f64) -> Result<PendingMutation, StoreError> {
        self.ensure_ready()?;
        let mut writes = Vec::new();
        let mut updates = Vec::new();
        for channel in self.targets(index)? {
            let (control, range) = resolver::gain_control(channel)?;
            let raw = range.db_to_raw(db);
            writes.push(DeviceWrite::Gain { control, raw });
            updates.push(CacheUpdate::Gain {
                index: channel.index,
                db: range.raw_to_db(raw),
            });
        }
        Ok(self.pending(writes, updates))
    }

    pub fn prepare_phantom(&self, index: usize, on: bool) -> Result<PendingMutation, StoreError> {
        self.ensure_ready()?;
        let mut writes = Vec::new();
        let mut updates = Vec::new();
        for channel in self.targets(index)? {
            writes.push(DeviceWrite::Switch {
                control: resolver::phantom_control(channel)?,
                on,
            });
            updates.push(CacheUpdate::Phantom {
                index: channel.index,
                on,
            });
        }
        Ok(self.pending(writes, updates))
    }

    pub fn prepare_pad(&self, index: usize, on: bool) -> Result<PendingMutation, StoreError> {
        self.ensure_ready()?;
        let mut writes = Vec::new();
        let mut updates = Vec::new();
        for channel in self.targets(index)? {
            writes.push(DeviceWrite::Switch {
                control: resolver::pad_control(channel)?,
                on,
            });
            updates.push(CacheUpdate::Pad {
                index: channel.index,
                on,
            });
        }
        Ok(self.pending(writes, updates))
    }

    pub fn prepare_sensitivity(
        &self,
        index: usize,
        value: LineSensitivity,
    ) -> Result<PendingMutation, StoreError> {
        self.ensure_ready()?;
        let mut writes = Vec::new();
        let mut updates = Vec::new();
        for channel in self.targets(index)? {
            writes.push(DeviceWrite::Sensitivity {
                control: resolver::sensitivity_control(channel)?,
                value,
            });
            updates.push(CacheUpdate::Sensitivity {
                index: channel.index,
                value,
            });
        }
        Ok(self.pending(writes, updates))
    }

    /// Output level of the speakers or headphones.
    pub fn prepare_main_volume(
        &self,
        class: OutputClass,
        db: f64,
    ) -> Result<PendingMutation, StoreError> {
        self.ensure_ready()?;
        let controls = resolver::resolve_output_volume(class, &self.topology.outputs)?;
        let raw = level::db_to_raw(db);
        let update = CacheUpdate::OutputLevel {
            class,
            db: StereoPair::both(level::raw_to_db(raw)),
        };
        Ok(self.pending(Self::volume_writes(controls, raw), vec![update]))
    }

    /// Level of the host playback return into an output.
    pub fn prepare_playback_volume(
        &self,
        class: OutputClass,
        db: f64,
    ) -> Result<PendingMutation, StoreError> {
        self.ensure_ready()?;
        let controls = resolver::resolve_playback_send(
            &self.topology.playback,
            class,
            &self.topology.outputs,
            self.compatibility_mode,
        )?;
        let raw = level::db_to_raw(db);
        let update = CacheUpdate::PlaybackLevel {
            class,
            db: StereoPair::both(level::raw_to_db(raw)),
        };
        Ok(self.pending(Self::volume_writes(controls, raw), vec![update]))
    }

    /// Persist a new display name.
    pub fn prepare_rename(&self, index: usize, name: &str) -> Result<PendingMutation, StoreError> {
        self.ensure_ready()?;
        let channel = self
            .topology
            .input(index)
            .ok_or(StoreError::UnknownChannel(index))?;
        let write = DeviceWrite::ChannelConfig {
            control_name: channel.control_name.clone(),
            display_name: name.to_string(),
            stereo_coupled: channel.stereo_coupled,
        };
        let update = CacheUpdate::DisplayName {
            index,
            name: name.to_string(),
        };
        Ok(self.pending(vec![write], vec![update]))
    }

    /// Persist a coupling change. Validated before anything is sent.
    pub fn prepare_stereo_coupling(
        &self,
        index: usize,
        coupled: bool,
    ) -> Result<PendingMutation, StoreError> {
        self.ensure_ready()?;
        let channel = self.validate_coupling(index, coupled)?;
        let write = DeviceWrite::ChannelConfig {
            control_name: channel.control_name.clone(),
            display_name: channel.display_name.clone(),
            stereo_coupled: coupled,
        };
        let update = CacheUpdate::StereoCoupled { index, coupled };
        Ok(self.pending(vec![write], vec![update]))
    }

    pub fn prepare_buffer_size(&self, frames: u32) -> Result<PendingMutation, StoreError> {
        self.ensure_ready()?;
        validate_buffer_size(frames)?;
        Ok(self.pending(
            vec![DeviceWrite::BufferSize(frames)],
            vec![CacheUpdate::BufferSize(frames)],
        ))
    }

    /// Reads that refresh one visible input channel.
    ///
    /// A coupled channel also re-reads the preamp of its right partner.
    pub fn prepare_refresh(&self, index: usize) -> Result<RefreshPlan, StoreError> {
        self.ensure_ready()?;
        let preamps = self
            .targets(index)?
            .into_iter()
            .map(|channel| PreampReads {
                index: channel.index,
                gain: resolver::gain_control(channel).ok(),
                phantom: resolver::phantom_control(channel).ok(),
                pad: resolver::pad_control(channel).ok(),
                sensitivity: resolver::sensitivity_control(channel).ok(),
            })
            .collect();
        Ok(RefreshPlan {
            epoch: self.epoch,
            index,
            monitor: self.send_controls(index, OutputClass::Speakers).ok(),
            headphones: self.send_controls(index, OutputClass::Headphones).ok(),
            preamps,
        })
    }

    /// Apply a completed round-trip.
    ///
    /// Completions from an earlier epoch are dropped whatever their result.
    /// A failed call leaves the cache untouched and returns the error.
    pub fn commit(&mut self, completion: Completion) -> Result<CommitOutcome, GatewayError> {
        if completion.epoch != self.epoch {
            debug!(
                "Discarding stale response from epoch {} (current {})",
                completion.epoch, self.epoch
            );
            return Ok(CommitOutcome::DiscardedStale);
        }

        completion.result?;

        for update in completion.updates {
            if let Err(e) = self.apply_update(update) {
                warn!("Could not apply cache update: {}", e);
            }
        }
        Ok(CommitOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::{enum_control, switch_control, volume_control};
    use crate::topology::builtin;

    fn preferred() -> Vec<AudioProfile> {
        vec![
            AudioProfile::new("pro-audio", "Pro Audio"),
            AudioProfile::new("default", "Default"),
        ]
    }

    fn new_store() -> ChannelStore {
        let mut store = ChannelStore::new(preferred(), TopologyCatalog::builtin(), false);
        store.set_supported_profiles(vec!["pro-audio".to_string(), "default".to_string()]);
        store
    }

    fn acquisition(active: &str, controls: Vec<ControlInfo>, records: Vec<ChannelRecord>) -> Acquisition {
        Acquisition {
            supported: Some(vec!["pro-audio".to_string(), "default".to_string()]),
            active: Some(active.to_string()),
            controls: Some(controls.into_iter().map(|c| (c.name.clone(), c)).collect()),
            records: Some(records),
            error: None,
        }
    }

    fn ready_store() -> ChannelStore {
        let mut store = new_store();
        store.begin_initialize().unwrap();
        store.complete_acquisition(acquisition("pro-audio", vec![], vec![]));
        store
    }

    fn visible(store: &ChannelStore) -> Vec<usize> {
        store.visible_channels().map(|c| c.index).collect()
    }

    fn controls_of(pending: &PendingMutation) -> Vec<String> {
        pending
            .writes
            .iter()
            .map(|w| match w {
                DeviceWrite::Volume { control, .. }
                | DeviceWrite::Switch { control, .. }
                | DeviceWrite::Sensitivity { control, .. }
                | DeviceWrite::Gain { control, .. } => control.clone(),
                other => format!("{:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_stereo_coupling_even_only() {
        let mut store = ready_store();

        assert_eq!(
            store.set_stereo_coupled(1, true),
            Err(StoreError::OddChannelCoupling(1))
        );
        assert!(!store.input(1).unwrap().stereo_coupled);
        assert_eq!(visible(&store), vec![0, 1, 2, 3]);

        store.set_stereo_coupled(0, true).unwrap();
        assert!(store.input(0).unwrap().stereo_coupled);
        assert_eq!(
            store.set_stereo_coupled(7, true),
            Err(StoreError::UnknownChannel(7))
        );
    }

    #[test]
    fn test_visible_channels() {
        let mut store = ready_store();
        assert_eq!(visible(&store), vec![0, 1, 2, 3]);

        store.set_stereo_coupled(0, true).unwrap();
        assert_eq!(visible(&store), vec![0, 2, 3]);

        store.set_stereo_coupled(2, true).unwrap();
        assert_eq!(visible(&store), vec![0, 2]);

        // Restartable
        let channels = store.visible_channels();
        assert_eq!(channels.clone().count(), 2);
        assert_eq!(channels.map(|c| c.index).collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_right_channel_of() {
        let store = ready_store();
        assert_eq!(store.right_channel_of(0).unwrap().control_name, "Mic-AN2");
        assert_eq!(store.right_channel_of(2).unwrap().control_name, "Line-IN4");
        assert!(store.right_channel_of(1).is_none());
        assert!(store.right_channel_of(4).is_none());
    }

    #[test]
    fn test_set_active_profile_rejects_bogus() {
        let mut store = ready_store();
        let epoch = store.epoch();

        assert_eq!(
            store.set_active_profile("bogus-profile"),
            Err(StoreError::UnsupportedProfile("bogus-profile".to_string()))
        );
        assert_eq!(store.active_profile().unwrap().name, "pro-audio");
        assert_eq!(store.epoch(), epoch);
        assert_eq!(store.topology().inputs.len(), 4);
    }

    #[test]
    fn test_set_active_profile_requires_preferred() {
        let mut store = ready_store();
        store.set_supported_profiles(vec!["pro-audio".to_string(), "off".to_string()]);
        assert_eq!(
            store.set_active_profile("off"),
            Err(StoreError::UnknownProfile("off".to_string()))
        );
        assert_eq!(store.active_profile().unwrap().name, "pro-audio");
    }

    #[test]
    fn test_set_active_profile_swaps_topology() {
        let mut store = ready_store();
        store.set_channel_gain(0, 20.0).unwrap();
        let epoch = store.epoch();

        store.set_active_profile("default").unwrap();
        assert_eq!(store.active_profile().unwrap().display_name, "Default");
        assert_eq!(store.topology(), &builtin::default_stereo());
        assert!(store.input_state(0).is_none());
        assert!(store.epoch() > epoch);
    }

    #[test]
    fn test_available_profiles() {
        let mut store = new_store();
        store.set_supported_profiles(vec!["default".to_string(), "off".to_string()]);
        let names: Vec<_> = store.available_profiles().iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec!["default"]);
    }

    #[test]
    fn test_prepare_requires_ready() {
        let mut store = new_store();
        assert_eq!(
            store.prepare_send(0, OutputClass::Speakers, 0.0),
            Err(StoreError::NotReady)
        );

        store.begin_initialize().unwrap();
        assert_eq!(
            store.prepare_send(0, OutputClass::Speakers, 0.0),
            Err(StoreError::Busy(Lifecycle::Initializing))
        );
    }

    #[test]
    fn test_prepare_send_names() {
        let mut store = ready_store();

        let pending = store.prepare_send(0, OutputClass::Speakers, -6.0).unwrap();
        assert_eq!(controls_of(&pending), vec!["Mic-AN1-AN1", "Mic-AN1-AN2"]);
        assert_eq!(
            pending.writes[0],
            DeviceWrite::Volume {
                control: "Mic-AN1-AN1".to_string(),
                raw: 16423
            }
        );

        store.set_stereo_coupled(0, true).unwrap();
        let pending = store.prepare_send(0, OutputClass::Headphones, 0.0).unwrap();
        assert_eq!(controls_of(&pending), vec!["Mic-AN1-PH3", "Mic-AN2-PH4"]);

        // The hidden right half cannot be addressed
        assert_eq!(
            store.prepare_send(1, OutputClass::Speakers, 0.0),
            Err(StoreError::CoupledRightChannel(1))
        );
    }

    #[test]
    fn test_prepare_switches_by_class() {
        let mut store = ready_store();

        let pending = store.prepare_phantom(0, true).unwrap();
        assert_eq!(controls_of(&pending), vec!["Mic-AN1 48V"]);

        assert!(matches!(
            store.prepare_phantom(2, true),
            Err(StoreError::Resolve(ResolveError::UnsupportedControl { .. }))
        ));
        assert!(store.prepare_sensitivity(0, LineSensitivity::Plus4dBu).is_err());

        store.set_stereo_coupled(2, true).unwrap();
        let pending = store
            .prepare_sensitivity(2, LineSensitivity::Minus10dBV)
            .unwrap();
        assert_eq!(controls_of(&pending), vec!["Line-IN3 Sens.", "Line-IN4 Sens."]);

        let pending = store.prepare_gain(2, 6.2).unwrap();
        assert_eq!(
            pending.writes,
            vec![
                DeviceWrite::Gain {
                    control: "Line-IN3 Gain".to_string(),
                    raw: 12
                },
                DeviceWrite::Gain {
                    control: "Line-IN4 Gain".to_string(),
                    raw: 12
                },
            ]
        );
        assert_eq!(
            pending.updates[0],
            CacheUpdate::Gain { index: 2, db: 6.0 }
        );
    }

    #[test]
    fn test_commit_applies_and_discards_stale() {
        let mut store = ready_store();
        let pending = store.prepare_send(0, OutputClass::Speakers, -10.2).unwrap();

        let completion = Completion {
            epoch: pending.epoch,
            updates: pending.updates.clone(),
            result: Ok(()),
        };
        assert_eq!(store.commit(completion), Ok(CommitOutcome::Applied));
        assert_eq!(
            store.input_state(0).unwrap().monitor_send,
            Some(StereoPair::both(-10.0))
        );

        // A profile switch makes earlier requests stale
        let stale = store.prepare_send(0, OutputClass::Speakers, -20.0).unwrap();
        store.begin_profile_switch("default").unwrap();
        store.complete_acquisition(acquisition("pro-audio", vec![], vec![]));
        let completion = Completion {
            epoch: stale.epoch,
            updates: stale.updates,
            result: Ok(()),
        };
        assert_eq!(store.commit(completion), Ok(CommitOutcome::DiscardedStale));
        assert!(store.input_state(0).is_none());
    }

    #[test]
    fn test_commit_failure_keeps_cache() {
        let mut store = ready_store();
        store
            .set_channel_monitor_send(0, StereoPair::both(-3.0))
            .unwrap();
        let pending = store.prepare_send(0, OutputClass::Speakers, -20.0).unwrap();
        let completion = Completion {
            epoch: pending.epoch,
            updates: pending.updates,
            result: Err(GatewayError::Timeout("SetVolume".to_string())),
        };
        assert!(store.commit(completion).is_err());
        assert_eq!(
            store.input_state(0).unwrap().monitor_send,
            Some(StereoPair::both(-3.0))
        );
    }

    #[test]
    fn test_reloading_rejects_mutations() {
        let mut store = ready_store();
        store.begin_profile_switch("default").unwrap();
        assert_eq!(store.lifecycle(), Lifecycle::Reloading);
        assert_eq!(
            store.prepare_gain(0, 10.0),
            Err(StoreError::Busy(Lifecycle::Reloading))
        );
        assert_eq!(
            store.begin_profile_switch("pro-audio"),
            Err(StoreError::Busy(Lifecycle::Reloading))
        );

        store.abort_profile_switch(&"activation failed");
        assert_eq!(store.lifecycle(), Lifecycle::Ready);
        assert_eq!(store.active_profile().unwrap().name, "pro-audio");
        assert_eq!(store.topology().inputs.len(), 4);
        assert!(store.prepare_gain(0, 10.0).is_ok());
    }

    #[test]
    fn test_acquisition_seeds_cache() {
        let mut store = new_store();
        store.begin_initialize().unwrap();
        store.complete_acquisition(acquisition(
            "pro-audio",
            vec![
                volume_control("Mic-AN1-AN1", 32768),
                volume_control("Mic-AN1-AN2", 16423),
                volume_control("Main-Out AN1", 65535),
                volume_control("Main-Out AN2", 65535),
                volume_control("PCM-AN1-PH3", 0),
                volume_control("PCM-AN2-PH4", 0),
                switch_control("Mic-AN1 48V", true),
                switch_control("Mic-AN1 PAD", false),
                volume_control("Mic-AN1 Gain", 40),
                enum_control("Line-IN3 Sens.", &["-10dBV", "+4dBu"], "+4dBu"),
            ],
            vec![
                ChannelRecord::new("Line-IN3", "Keys", true),
                ChannelRecord::new("Mic-AN2", "Odd", true),
                ChannelRecord::new("Gone-IN9", "Missing", false),
            ],
        ));

        assert_eq!(store.lifecycle(), Lifecycle::Ready);
        let mic = store.input_state(0).unwrap();
        assert_eq!(mic.monitor_send, Some(StereoPair::new(0.0, -6.0)));
        assert_eq!(mic.headphones_send, None);
        assert_eq!(mic.phantom, Some(true));
        assert_eq!(mic.pad, Some(false));
        assert_eq!(mic.gain_db, Some(40.0));

        let line = store.input_state(2).unwrap();
        assert_eq!(line.sensitivity, Some(LineSensitivity::Plus4dBu));

        assert_eq!(
            store.output_level(OutputClass::Speakers),
            Some(StereoPair::both(6.0))
        );
        assert_eq!(
            store.playback_level(OutputClass::Headphones),
            Some(StereoPair::both(level::MIN_DB))
        );

        // Records: rename and couple, odd coupling ignored
        assert_eq!(store.input(2).unwrap().display_name, "Keys");
        assert!(store.input(2).unwrap().stereo_coupled);
        assert_eq!(store.input(1).unwrap().display_name, "Odd");
        assert!(!store.input(1).unwrap().stereo_coupled);
        assert_eq!(visible(&store), vec![0, 1, 2]);
    }

    #[test]
    fn test_partial_acquisition_keeps_topology() {
        let mut store = ready_store();
        store.begin_profile_switch("default").unwrap();
        store.complete_acquisition(Acquisition {
            supported: Some(vec!["pro-audio".to_string(), "default".to_string()]),
            active: None,
            controls: None,
            records: None,
            error: Some(GatewayError::Timeout("GetActiveProfile".to_string())),
        });
        assert_eq!(store.lifecycle(), Lifecycle::Ready);
        assert_eq!(store.active_profile().unwrap().name, "pro-audio");
        assert!(store.switch_target().is_none());
    }

    #[test]
    fn test_buffer_size_validation() {
        let store = ready_store();
        assert!(store.prepare_buffer_size(256).is_ok());
        assert_eq!(
            store.prepare_buffer_size(100),
            Err(StoreError::InvalidBufferSize(100))
        );
        assert_eq!(
            store.prepare_buffer_size(4096),
            Err(StoreError::InvalidBufferSize(4096))
        );
        assert_eq!(
            store.prepare_buffer_size(16),
            Err(StoreError::InvalidBufferSize(16))
        );
    }

    #[test]
    fn test_prepare_coupling_persists_display_name() {
        let mut store = ready_store();
        store.rename_channel(0, "Vocals").unwrap();
        let pending = store.prepare_stereo_coupling(0, true).unwrap();
        assert_eq!(
            pending.writes,
            vec![DeviceWrite::ChannelConfig {
                control_name: "Mic-AN1".to_string(),
                display_name: "Vocals".to_string(),
                stereo_coupled: true,
            }]
        );
        assert_eq!(
            store.prepare_stereo_coupling(3, true),
            Err(StoreError::OddChannelCoupling(3))
        );
    }

    #[test]
    fn test_override_cannot_couple_odd_channel() {
        let mut topology = builtin::pro_audio();
        topology.inputs[1].stereo_coupled = true;
        let parsed = SoundcardTopology::from_toml(&topology.to_toml().unwrap()).unwrap();

        let mut catalog = TopologyCatalog::builtin();
        catalog.insert("pro-audio", parsed);
        let mut store = ChannelStore::new(preferred(), catalog, false);
        store.begin_initialize().unwrap();
        store.complete_acquisition(acquisition("pro-audio", vec![], vec![]));

        assert!(store.topology().inputs.iter().all(|c| c.is_left() || !c.stereo_coupled));
        assert_eq!(visible(&store), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_compatibility_mode_sends() {
        let mut catalog = TopologyCatalog::builtin();
        let mut legacy = builtin::pro_audio();
        legacy.outputs.retain(|o| o.class == OutputClass::Headphones);
        catalog.insert("pro-audio", legacy);

        let mut store = ChannelStore::new(preferred(), catalog, true);
        store.begin_initialize().unwrap();
        store.complete_acquisition(acquisition("pro-audio", vec![], vec![]));

        let pending = store.prepare_send(0, OutputClass::Speakers, 0.0).unwrap();
        assert_eq!(controls_of(&pending), vec!["Mic-AN1-AN1", "Mic-AN1-AN2"]);
        assert!(store.prepare_main_volume(OutputClass::Speakers, 0.0).is_err());
    }
}
