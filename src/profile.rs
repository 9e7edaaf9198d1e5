// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Profile initialization and switching.

use crate::error::MixerError;
use crate::gateway::CommandGateway;
use crate::state::ChannelStore;
use crate::topology::AudioProfile;
use rmemix_ipc::{ChannelRecord, ControlInfo, GatewayError};
use std::collections::HashMap;
use tracing::{debug, error, info};

/// Device state gathered for a (re)load, in acquisition order.
///
/// Acquisition stops at the first failing call, leaving later fields empty
/// and the failure in `error`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Acquisition {
    pub supported: Option<Vec<String>>,
    pub active: Option<String>,
    pub controls: Option<HashMap<String, ControlInfo>>,
    pub records: Option<Vec<ChannelRecord>>,
    pub error: Option<GatewayError>,
}

impl Acquisition {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Sequences initialization and profile switches against the gateway.
#[derive(Debug, Clone)]
pub struct ProfileManager {
    /// ALSA card whose controls are listed.
    card_name: String,
}

impl ProfileManager {
    pub fn new(card_name: impl Into<String>) -> Self {
        Self {
            card_name: card_name.into(),
        }
    }

    pub fn card_name(&self) -> &str {
        &self.card_name
    }

    async fn acquire_into<G: CommandGateway>(
        &self,
        gateway: &G,
        acquisition: &mut Acquisition,
    ) -> Result<(), GatewayError> {
        acquisition.supported = Some(gateway.list_profiles().await?);
        acquisition.active = Some(gateway.get_active_profile().await?);
        acquisition.controls = Some(gateway.list_controls(&self.card_name).await?);
        acquisition.records = Some(gateway.load_all_channel_configs().await?);
        Ok(())
    }

    /// Read profiles, control snapshot, and channel records.
    pub async fn acquire<G: CommandGateway>(&self, gateway: &G) -> Acquisition {
        let mut acquisition = Acquisition::default();
        if let Err(e) = self.acquire_into(gateway, &mut acquisition).await {
            acquisition.error = Some(e);
        }
        acquisition
    }

    /// Run the initial load: `Uninitialized → Initializing → Ready`.
    ///
    /// The store ends up `Ready` even when acquisition fails part-way; the
    /// failure is returned.
    pub async fn initialize<G: CommandGateway>(
        &self,
        store: &mut ChannelStore,
        gateway: &G,
    ) -> Result<(), MixerError> {
        store.begin_initialize()?;
        info!("Initializing mixer for card '{}'", self.card_name);

        let acquisition = self.acquire(gateway).await;
        let failure = acquisition.error.clone();
        store.complete_acquisition(acquisition);

        match failure {
            Some(e) => {
                error!("Initialization incomplete: {}", e);
                Err(e.into())
            }
            None => {
                info!(
                    "Mixer ready with profile '{}'",
                    store
                        .active_profile()
                        .map(|p| p.name.as_str())
                        .unwrap_or("<none>")
                );
                Ok(())
            }
        }
    }

    /// Switch the card to another profile and reload everything.
    ///
    /// A name that fails validation never reaches the device. A failed
    /// activation keeps the previous topology. A failure after activation
    /// leaves whatever was re-acquired in place and is returned.
    pub async fn switch_profile<G: CommandGateway>(
        &self,
        store: &mut ChannelStore,
        gateway: &G,
        name: &str,
    ) -> Result<AudioProfile, MixerError> {
        let target = store.begin_profile_switch(name)?;

        // The supported set may have changed since it was last read.
        match gateway.list_profiles().await {
            Ok(supported) => store.set_supported_profiles(supported),
            Err(e) => {
                store.abort_profile_switch(&e);
                return Err(e.into());
            }
        }
        if let Err(e) = store.validate_profile(&target.name) {
            store.abort_profile_switch(&e);
            return Err(e.into());
        }

        if let Err(e) = gateway.set_active_profile(&target.name).await {
            store.abort_profile_switch(&e);
            return Err(e.into());
        }
        debug!("Activated profile '{}', reloading state", target.name);

        let acquisition = self.acquire(gateway).await;
        let failure = acquisition.error.clone();
        store.complete_acquisition(acquisition);

        if let Some(e) = failure {
            error!("Reload after switching to '{}' incomplete: {}", target.name, e);
            return Err(e.into());
        }

        let active = store.active_profile().cloned().unwrap_or(target);
        info!("Switched to profile '{}'", active.name);
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::gateway::fake::{switch_control, volume_control, FakeGateway};
    use crate::state::{Lifecycle, StoreError};
    use crate::topology::TopologyCatalog;

    fn new_store() -> ChannelStore {
        ChannelStore::new(
            vec![
                AudioProfile::new("pro-audio", "Pro Audio"),
                AudioProfile::new("default", "Default"),
            ],
            TopologyCatalog::builtin(),
            false,
        )
    }

    fn fake() -> FakeGateway {
        let gateway = FakeGateway::new(&["pro-audio", "default"], "pro-audio");
        gateway.set_controls(
            "pro-audio",
            vec![
                volume_control("Mic-AN1-AN1", 32768),
                volume_control("Mic-AN1-AN2", 32768),
                switch_control("Mic-AN1 48V", true),
            ],
        );
        gateway
    }

    #[tokio::test]
    async fn test_initialize_end_to_end() {
        let gateway = fake();
        let manager = ProfileManager::new("Babyface Pro");
        let mut store = new_store();

        manager.initialize(&mut store, &gateway).await.unwrap();

        assert_eq!(store.lifecycle(), Lifecycle::Ready);
        assert_eq!(
            store.active_profile(),
            Some(&AudioProfile::new("pro-audio", "Pro Audio"))
        );
        let visible: Vec<_> = store.visible_channels().map(|c| c.index).collect();
        assert_eq!(visible, vec![0, 1, 2, 3]);
        assert_eq!(store.input_state(0).unwrap().phantom, Some(true));
        assert_eq!(
            gateway.calls(),
            vec![
                "list_profiles",
                "get_active_profile",
                "list_controls Babyface Pro",
                "load_all_channel_configs",
            ]
        );
    }

    #[tokio::test]
    async fn test_initialize_partial_failure() {
        let gateway = fake();
        gateway.fail("list_controls");
        let manager = ProfileManager::new("Babyface Pro");
        let mut store = new_store();

        let err = manager.initialize(&mut store, &gateway).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Boundary);

        // Profile was read before the failure and is visible
        assert_eq!(store.lifecycle(), Lifecycle::Ready);
        assert_eq!(store.active_profile().unwrap().name, "pro-audio");
        assert!(gateway.calls_to("load_all_channel_configs").is_empty());
    }

    #[tokio::test]
    async fn test_switch_rejects_bogus_without_device_call() {
        let gateway = fake();
        let manager = ProfileManager::new("Babyface Pro");
        let mut store = new_store();
        manager.initialize(&mut store, &gateway).await.unwrap();
        gateway.clear_calls();

        let err = manager
            .switch_profile(&mut store, &gateway, "bogus-profile")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MixerError::Store(StoreError::UnsupportedProfile("bogus-profile".to_string()))
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(gateway.calls().is_empty());
        assert_eq!(store.active_profile().unwrap().name, "pro-audio");
        assert_eq!(store.lifecycle(), Lifecycle::Ready);
    }

    #[tokio::test]
    async fn test_switch_profile() {
        let gateway = fake();
        let manager = ProfileManager::new("Babyface Pro");
        let mut store = new_store();
        manager.initialize(&mut store, &gateway).await.unwrap();
        let epoch = store.epoch();

        let active = manager
            .switch_profile(&mut store, &gateway, "default")
            .await
            .unwrap();
        assert_eq!(active, AudioProfile::new("default", "Default"));
        assert_eq!(gateway.active_profile(), "default");
        assert_eq!(store.topology().inputs.len(), 2);
        assert!(store.input_state(0).is_none());
        assert!(store.epoch() > epoch);
        assert_eq!(store.lifecycle(), Lifecycle::Ready);
    }

    #[tokio::test]
    async fn test_switch_activation_failure_keeps_topology() {
        let gateway = fake();
        let manager = ProfileManager::new("Babyface Pro");
        let mut store = new_store();
        manager.initialize(&mut store, &gateway).await.unwrap();
        gateway.fail("set_active_profile");

        let err = manager
            .switch_profile(&mut store, &gateway, "default")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.lifecycle(), Lifecycle::Ready);
        assert_eq!(store.active_profile().unwrap().name, "pro-audio");
        assert_eq!(store.topology().inputs.len(), 4);
    }

    #[tokio::test]
    async fn test_switch_revalidates_fresh_profile_list() {
        let gateway = fake();
        let manager = ProfileManager::new("Babyface Pro");
        let mut store = new_store();
        manager.initialize(&mut store, &gateway).await.unwrap();

        gateway.set_profiles(&["pro-audio"]);
        gateway.clear_calls();
        let err = manager
            .switch_profile(&mut store, &gateway, "default")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(gateway.calls(), vec!["list_profiles"]);
        assert_eq!(store.lifecycle(), Lifecycle::Ready);
    }

    #[tokio::test]
    async fn test_switch_reload_failure_is_surfaced() {
        let gateway = fake();
        let manager = ProfileManager::new("Babyface Pro");
        let mut store = new_store();
        manager.initialize(&mut store, &gateway).await.unwrap();
        gateway.fail("load_all_channel_configs");

        let err = manager
            .switch_profile(&mut store, &gateway, "default")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Boundary);

        // Activation happened; the partial reload is visible
        assert_eq!(store.lifecycle(), Lifecycle::Ready);
        assert_eq!(store.active_profile().unwrap().name, "default");
        assert_eq!(store.topology().inputs.len(), 2);
    }

    #[tokio::test]
    async fn test_acquire_stops_at_first_failure() {
        let gateway = fake();
        gateway.fail("get_active_profile");
        let acquisition = ProfileManager::new("Babyface Pro").acquire(&gateway).await;
        assert!(!acquisition.is_complete());
        assert!(acquisition.supported.is_some());
        assert!(acquisition.active.is_none());
        assert!(acquisition.controls.is_none());
        assert!(gateway.calls_to("list_controls").is_empty());
    }
}
