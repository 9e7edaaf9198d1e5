// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! One-call mixer operations.
//!
//! [`Mixer`] owns a store, a gateway, and a profile manager, and runs each
//! operation as prepare, dispatch, commit. Callers that need to interleave
//! requests can drive [`ChannelStore`] and [`mutation`] directly instead.

use crate::error::MixerError;
use crate::gateway::CommandGateway;
use crate::mutation::{self, Completion, PendingMutation};
use crate::profile::ProfileManager;
use crate::state::ChannelStore;
use crate::topology::{AudioProfile, LineSensitivity, OutputClass};
use tracing::debug;

/// Mixer control surface over a gateway.
pub struct Mixer<G: CommandGateway> {
    store: ChannelStore,
    gateway: G,
    profiles: ProfileManager,
}

impl<G: CommandGateway> Mixer<G> {
    pub fn new(store: ChannelStore, gateway: G, profiles: ProfileManager) -> Self {
        Self {
            store,
            gateway,
            profiles,
        }
    }

    pub fn store(&self) -> &ChannelStore {
        &self.store
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    async fn run(&mut self, pending: PendingMutation) -> Result<(), MixerError> {
        let completion = mutation::dispatch(&self.gateway, pending).await;
        self.finish(completion)
    }

    fn finish(&mut self, completion: Completion) -> Result<(), MixerError> {
        let outcome = self.store.commit(completion)?;
        debug!("Commit: {:?}", outcome);
        Ok(())
    }

    /// Load profiles, topology, control values, and channel records.
    ///
    /// The buffer size is read afterwards; failing to read it is logged and
    /// does not fail initialization.
    pub async fn initialize(&mut self) -> Result<(), MixerError> {
        self.profiles
            .initialize(&mut self.store, &self.gateway)
            .await?;
        if let Err(e) = self.refresh_buffer_size().await {
            debug!("Buffer size unavailable: {}", e);
        }
        Ok(())
    }

    pub async fn switch_profile(&mut self, name: &str) -> Result<AudioProfile, MixerError> {
        self.profiles
            .switch_profile(&mut self.store, &self.gateway, name)
            .await
    }

    /// Send level from an input to the speakers.
    pub async fn set_monitor_send(&mut self, index: usize, db: f64) -> Result<(), MixerError> {
        let pending = self.store.prepare_send(index, OutputClass::Speakers, db)?;
        self.run(pending).await
    }

    /// Send level from an input to the headphones.
    pub async fn set_headphones_send(&mut self, index: usize, db: f64) -> Result<(), MixerError> {
        let pending = self
            .store
            .prepare_send(index, OutputClass::Headphones, db)?;
        self.run(pending).await
    }

    pub async fn set_input_gain(&mut self, index: usize, db: f64) -> Result<(), MixerError> {
        let pending = self.store.prepare_gain(index, db)?;
        self.run(pending).await
    }

    pub async fn set_phantom_power(&mut self, index: usize, on: bool) -> Result<(), MixerError> {
        let pending = self.store.prepare_phantom(index, on)?;
        self.run(pending).await
    }

    pub async fn set_pad(&mut self, index: usize, on: bool) -> Result<(), MixerError> {
        let pending = self.store.prepare_pad(index, on)?;
        self.run(pending).await
    }

    pub async fn set_line_sensitivity(
        &mut self,
        index: usize,
        value: LineSensitivity,
    ) -> Result<(), MixerError> {
        let pending = self.store.prepare_sensitivity(index, value)?;
        self.run(pending).await
    }

    /// Output level of the speakers or headphones.
    pub async fn set_main_volume(&mut self, class: OutputClass, db: f64) -> Result<(), MixerError> {
        let pending = self.store.prepare_main_volume(class, db)?;
        self.run(pending).await
    }

    /// Level of the host playback into an output.
    pub async fn set_playback_volume(
        &mut self,
        class: OutputClass,
        db: f64,
    ) -> Result<(), MixerError> {
        let pending = self.store.prepare_playback_volume(class, db)?;
        self.run(pending).await
    }

    /// Persist a display name, then update the cache.
    pub async fn rename_channel(&mut self, index: usize, name: &str) -> Result<(), MixerError> {
        let pending = self.store.prepare_rename(index, name)?;
        self.run(pending).await
    }

    /// Persist a coupling change, then update the cache.
    pub async fn set_stereo_coupled(
        &mut self,
        index: usize,
        coupled: bool,
    ) -> Result<(), MixerError> {
        let pending = self.store.prepare_stereo_coupling(index, coupled)?;
        self.run(pending).await
    }

    /// Re-read one input channel from the device.
    pub async fn refresh_input(&mut self, index: usize) -> Result<(), MixerError> {
        let plan = self.store.prepare_refresh(index)?;
        let completion = mutation::fetch(&self.gateway, plan).await;
        self.finish(completion)
    }

    pub async fn set_buffer_size(&mut self, frames: u32) -> Result<(), MixerError> {
        let pending = self.store.prepare_buffer_size(frames)?;
        self.run(pending).await
    }

    pub async fn refresh_buffer_size(&mut self) -> Result<u32, MixerError> {
        let epoch = self.store.epoch();
        let result = self.gateway.get_buffer_size().await;
        let frames = result.clone().unwrap_or_default();
        self.finish(Completion {
            epoch,
            updates: vec![mutation::CacheUpdate::BufferSize(frames)],
            result: result.map(|_| ()),
        })?;
        Ok(frames)
    }
}
