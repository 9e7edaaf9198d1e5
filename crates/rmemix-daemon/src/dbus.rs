// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! D-Bus interface implementation for the daemon.

use crate::service::{GatewayService, ServiceError};
use parking_lot::Mutex;
use rmemix_ipc::{ChannelRecord, ControlInfo, GatewayError};
use std::sync::Arc;
use tracing::debug;
use zbus::interface;

/// Input validation helpers for D-Bus method arguments.
mod validate {
    /// Validate a control or card name: non-empty, max 128 chars, no control characters.
    pub fn validate_name(kind: &str, name: &str) -> Result<(), zbus::fdo::Error> {
        if name.is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs(format!(
                "{} must not be empty",
                kind
            )));
        }
        if name.len() > 128 {
            return Err(zbus::fdo::Error::InvalidArgs(format!(
                "{} exceeds 128 character limit (got {})",
                kind,
                name.len()
            )));
        }
        if name.chars().any(|c| c.is_control()) {
            return Err(zbus::fdo::Error::InvalidArgs(format!(
                "{} must not contain control characters",
                kind
            )));
        }
        Ok(())
    }

    /// Validate a raw level: must be non-negative.
    pub fn validate_raw(raw: i64) -> Result<(), zbus::fdo::Error> {
        if raw < 0 {
            return Err(zbus::fdo::Error::InvalidArgs(format!(
                "Raw value must not be negative (got {})",
                raw
            )));
        }
        Ok(())
    }
}

fn to_fdo(e: ServiceError) -> zbus::fdo::Error {
    GatewayError::from(e).into()
}

/// The D-Bus interface implementation.
pub struct GatewayDbusService {
    service: Arc<Mutex<GatewayService>>,
}

impl GatewayDbusService {
    pub fn new(service: Arc<Mutex<GatewayService>>) -> Self {
        Self { service }
    }
}

#[interface(name = "org.rmemix.Gateway1")]
impl GatewayDbusService {
    // ==================== Controls ====================

    /// Every mixer control of an ALSA card.
    async fn list_controls(&self, card: &str) -> zbus::fdo::Result<Vec<ControlInfo>> {
        validate::validate_name("Card name", card)?;
        debug!("D-Bus: list_controls({})", card);
        self.service.lock().list_controls(card).map_err(to_fdo)
    }

    async fn get_volume(&self, control: &str) -> zbus::fdo::Result<i64> {
        validate::validate_name("Control name", control)?;
        self.service.lock().get_volume(control).map_err(to_fdo)
    }

    async fn set_volume(&self, control: &str, raw: i64) -> zbus::fdo::Result<()> {
        validate::validate_name("Control name", control)?;
        validate::validate_raw(raw)?;
        debug!("D-Bus: set_volume({}, {})", control, raw);
        self.service.lock().set_volume(control, raw).map_err(to_fdo)
    }

    async fn get_switch_state(&self, control: &str) -> zbus::fdo::Result<bool> {
        validate::validate_name("Control name", control)?;
        self.service.lock().get_switch_state(control).map_err(to_fdo)
    }

    async fn set_switch_state(&self, control: &str, on: bool) -> zbus::fdo::Result<()> {
        validate::validate_name("Control name", control)?;
        debug!("D-Bus: set_switch_state({}, {})", control, on);
        self.service
            .lock()
            .set_switch_state(control, on)
            .map_err(to_fdo)
    }

    async fn get_line_sensitivity(&self, control: &str) -> zbus::fdo::Result<String> {
        validate::validate_name("Control name", control)?;
        self.service
            .lock()
            .get_line_sensitivity(control)
            .map_err(to_fdo)
    }

    async fn set_line_sensitivity(&self, control: &str, value: &str) -> zbus::fdo::Result<()> {
        validate::validate_name("Control name", control)?;
        validate::validate_name("Sensitivity", value)?;
        debug!("D-Bus: set_line_sensitivity({}, {})", control, value);
        self.service
            .lock()
            .set_line_sensitivity(control, value)
            .map_err(to_fdo)
    }

    async fn get_input_gain(&self, control: &str) -> zbus::fdo::Result<i64> {
        validate::validate_name("Control name", control)?;
        self.service.lock().get_input_gain(control).map_err(to_fdo)
    }

    async fn set_input_gain(&self, control: &str, raw: i64) -> zbus::fdo::Result<()> {
        validate::validate_name("Control name", control)?;
        validate::validate_raw(raw)?;
        debug!("D-Bus: set_input_gain({}, {})", control, raw);
        self.service
            .lock()
            .set_input_gain(control, raw)
            .map_err(to_fdo)
    }

    // ==================== Profiles ====================

    async fn list_profiles(&self) -> zbus::fdo::Result<Vec<String>> {
        self.service.lock().list_profiles().map_err(to_fdo)
    }

    async fn get_active_profile(&self) -> zbus::fdo::Result<String> {
        self.service.lock().get_active_profile().map_err(to_fdo)
    }

    async fn set_active_profile(&self, name: &str) -> zbus::fdo::Result<()> {
        validate::validate_name("Profile name", name)?;
        debug!("D-Bus: set_active_profile({})", name);
        self.service.lock().set_active_profile(name).map_err(to_fdo)
    }

    // ==================== Channel Records ====================

    async fn persist_channel_config(
        &self,
        control_name: &str,
        display_name: &str,
        stereo_coupled: bool,
    ) -> zbus::fdo::Result<()> {
        validate::validate_name("Control name", control_name)?;
        validate::validate_name("Display name", display_name)?;
        debug!(
            "D-Bus: persist_channel_config({}, {}, {})",
            control_name, display_name, stereo_coupled
        );
        self.service
            .lock()
            .persist_channel_config(ChannelRecord::new(
                control_name,
                display_name,
                stereo_coupled,
            ))
            .map_err(to_fdo)
    }

    async fn load_all_channel_configs(&self) -> zbus::fdo::Result<Vec<ChannelRecord>> {
        Ok(self.service.lock().load_all_channel_configs())
    }

    // ==================== Buffer Size ====================

    async fn get_buffer_size(&self) -> zbus::fdo::Result<u32> {
        self.service.lock().get_buffer_size().map_err(to_fdo)
    }

    async fn set_buffer_size(&self, frames: u32) -> zbus::fdo::Result<()> {
        debug!("D-Bus: set_buffer_size({})", frames);
        self.service.lock().set_buffer_size(frames).map_err(to_fdo)
    }
}

#[cfg(test)]
mod tests {
    use super::validate::*;
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Control name", "Mic-AN1 48V").is_ok());
        assert!(validate_name("Control name", "").is_err());
        assert!(validate_name("Control name", "bad\nname").is_err());
        assert!(validate_name("Control name", &"x".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_raw() {
        assert!(validate_raw(0).is_ok());
        assert!(validate_raw(65535).is_ok());
        assert!(matches!(
            validate_raw(-1),
            Err(zbus::fdo::Error::InvalidArgs(_))
        ));
    }

    #[test]
    fn test_service_errors_map_to_fdo() {
        let err = to_fdo(ServiceError::InvalidArgument("frames".to_string()));
        assert!(matches!(err, zbus::fdo::Error::InvalidArgs(_)));

        let err = to_fdo(ServiceError::Tool(crate::audio::ToolError::NotFound(
            "card".to_string(),
        )));
        assert!(matches!(err, zbus::fdo::Error::Failed(_)));
    }
}
