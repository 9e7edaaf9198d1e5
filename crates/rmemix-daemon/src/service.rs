// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Core daemon service: card lookup, control access, and record storage.

use crate::audio::amixer::{self, Amixer};
use crate::audio::{pactl, quantum, SystemTools, ToolError, ToolRunner};
use crate::config::{ChannelRecords, ConfigManager, DaemonConfig};
use rmemix_ipc::{ChannelRecord, ControlInfo, GatewayError};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Smallest buffer size accepted.
pub const MIN_BUFFER_SIZE: u32 = 32;
/// Largest buffer size accepted.
pub const MAX_BUFFER_SIZE: u32 = 2048;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<ServiceError> for GatewayError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Tool(ToolError::NotFound(what)) => GatewayError::NotFound(what),
            ServiceError::Tool(e) => GatewayError::ToolFailed(e.to_string()),
            ServiceError::Config(e) => GatewayError::MethodCallFailed(e.to_string()),
            ServiceError::InvalidArgument(msg) => GatewayError::InvalidArgument(msg),
        }
    }
}

/// Executes gateway requests against the driver tools.
pub struct GatewayService<R: ToolRunner = SystemTools> {
    tools: R,
    config: DaemonConfig,
    config_manager: ConfigManager,
    records: ChannelRecords,
    /// ALSA card index per card name.
    card_indices: HashMap<String, u32>,
    /// PipeWire card id of the configured card.
    pw_card_id: Option<String>,
}

impl<R: ToolRunner> GatewayService<R> {
    pub fn new(tools: R, config: DaemonConfig, config_manager: ConfigManager) -> Self {
        let records = match config_manager.load_channel_records() {
            Ok(records) => records,
            Err(e) => {
                warn!("Ignoring unreadable channel records: {}", e);
                ChannelRecords::default()
            }
        };
        info!(
            "Gateway for ALSA card '{}' / PipeWire card '{}' ({} channel records)",
            config.alsa_name,
            config.pipewire_name,
            records.channels.len()
        );

        Self {
            tools,
            config,
            config_manager,
            records,
            card_indices: HashMap::new(),
            pw_card_id: None,
        }
    }

    // ==================== Card Lookup ====================

    fn amixer_for(&mut self, card_name: &str) -> Result<Amixer, ServiceError> {
        if let Some(&index) = self.card_indices.get(card_name) {
            return Ok(Amixer::new(index));
        }
        let index = amixer::find_card_index(&self.tools, card_name)?;
        self.card_indices.insert(card_name.to_string(), index);
        Ok(Amixer::new(index))
    }

    /// Run an amixer operation, dropping the cached index if it fails.
    fn with_amixer<T>(
        &mut self,
        card_name: &str,
        op: impl FnOnce(&Amixer, &R) -> Result<T, ToolError>,
    ) -> Result<T, ServiceError> {
        let amixer = self.amixer_for(card_name)?;
        op(&amixer, &self.tools).map_err(|e| {
            if matches!(e, ToolError::Failed { .. } | ToolError::Spawn { .. }) {
                debug!("Forgetting card index for '{}'", card_name);
                self.card_indices.remove(card_name);
            }
            ServiceError::Tool(e)
        })
    }

    fn with_default_amixer<T>(
        &mut self,
        op: impl FnOnce(&Amixer, &R) -> Result<T, ToolError>,
    ) -> Result<T, ServiceError> {
        let card = self.config.alsa_name.clone();
        self.with_amixer(&card, op)
    }

    fn card_id(&mut self) -> Result<String, ServiceError> {
        if let Some(id) = &self.pw_card_id {
            return Ok(id.clone());
        }
        let id = pactl::find_card_id(&self.tools, &self.config.pipewire_name)?;
        self.pw_card_id = Some(id.clone());
        Ok(id)
    }

    fn with_card_id<T>(
        &mut self,
        op: impl FnOnce(&str, &R) -> Result<T, ToolError>,
    ) -> Result<T, ServiceError> {
        let id = self.card_id()?;
        op(&id, &self.tools).map_err(|e| {
            self.pw_card_id = None;
            ServiceError::Tool(e)
        })
    }

    // ==================== Controls ====================

    pub fn list_controls(&mut self, card_name: &str) -> Result<Vec<ControlInfo>, ServiceError> {
        let controls = self.with_amixer(card_name, |a, t| a.list_controls(t))?;
        debug!("Card '{}' has {} controls", card_name, controls.len());
        Ok(controls)
    }

    pub fn get_volume(&mut self, control: &str) -> Result<i64, ServiceError> {
        self.with_default_amixer(|a, t| a.get_value(t, control))
    }

    pub fn set_volume(&mut self, control: &str, raw: i64) -> Result<(), ServiceError> {
        debug!("set_volume {} = {}", control, raw);
        self.with_default_amixer(|a, t| a.set_value(t, control, raw))
    }

    pub fn get_switch_state(&mut self, control: &str) -> Result<bool, ServiceError> {
        self.with_default_amixer(|a, t| a.get_switch(t, control))
    }

    pub fn set_switch_state(&mut self, control: &str, on: bool) -> Result<(), ServiceError> {
        debug!("set_switch_state {} = {}", control, on);
        self.with_default_amixer(|a, t| a.set_switch(t, control, on))
    }

    pub fn get_line_sensitivity(&mut self, control: &str) -> Result<String, ServiceError> {
        self.with_default_amixer(|a, t| a.get_item(t, control))
    }

    pub fn set_line_sensitivity(&mut self, control: &str, value: &str) -> Result<(), ServiceError> {
        debug!("set_line_sensitivity {} = {}", control, value);
        self.with_default_amixer(|a, t| a.set_item(t, control, value))
    }

    pub fn get_input_gain(&mut self, control: &str) -> Result<i64, ServiceError> {
        self.with_default_amixer(|a, t| a.get_value(t, control))
    }

    pub fn set_input_gain(&mut self, control: &str, raw: i64) -> Result<(), ServiceError> {
        debug!("set_input_gain {} = {}", control, raw);
        self.with_default_amixer(|a, t| a.set_value(t, control, raw))
    }

    // ==================== Profiles ====================

    pub fn list_profiles(&mut self) -> Result<Vec<String>, ServiceError> {
        self.with_card_id(|id, t| pactl::list_profiles(t, id))
    }

    pub fn get_active_profile(&mut self) -> Result<String, ServiceError> {
        self.with_card_id(|id, t| pactl::active_profile(t, id))
    }

    pub fn set_active_profile(&mut self, name: &str) -> Result<(), ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::InvalidArgument(
                "Profile name must not be empty".to_string(),
            ));
        }
        self.with_card_id(|id, t| pactl::set_profile(t, id, name))?;
        // Controls may be renumbered after a profile change.
        self.card_indices.clear();
        Ok(())
    }

    // ==================== Buffer Size ====================

    pub fn get_buffer_size(&mut self) -> Result<u32, ServiceError> {
        Ok(quantum::get_quantum(&self.tools)?)
    }

    pub fn set_buffer_size(&mut self, frames: u32) -> Result<(), ServiceError> {
        if !frames.is_power_of_two() || !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&frames) {
            return Err(ServiceError::InvalidArgument(format!(
                "Buffer size must be a power of two between {} and {} (got {})",
                MIN_BUFFER_SIZE, MAX_BUFFER_SIZE, frames
            )));
        }
        Ok(quantum::set_quantum(&self.tools, frames)?)
    }

    // ==================== Channel Records ====================

    pub fn persist_channel_config(&mut self, record: ChannelRecord) -> Result<(), ServiceError> {
        let mut records = self.records.clone();
        records.upsert(record);
        self.config_manager.save_channel_records(&records)?;
        self.records = records;
        Ok(())
    }

    pub fn load_all_channel_configs(&self) -> Vec<ChannelRecord> {
        self.records.channels.clone()
    }
}
