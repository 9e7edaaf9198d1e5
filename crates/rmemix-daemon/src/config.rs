// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Configuration management for the daemon.

use rmemix_ipc::ChannelRecord;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("No config directory found")]
    NoConfigDir,
}

/// Which card the daemon drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// ALSA card name as listed by `aplay -l`.
    pub alsa_name: String,
    /// Substring of the PipeWire card name in `pactl list cards short`.
    pub pipewire_name: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            alsa_name: "Babyface Pro".to_string(),
            pipewire_name: "RME_Babyface_Pro".to_string(),
        }
    }
}

impl DaemonConfig {
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Persisted per-channel display preferences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecords {
    #[serde(default)]
    pub channels: Vec<ChannelRecord>,
}

impl ChannelRecords {
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Insert or replace the record for its control name.
    pub fn upsert(&mut self, record: ChannelRecord) {
        match self
            .channels
            .iter_mut()
            .find(|r| r.control_name == record.control_name)
        {
            Some(existing) => *existing = record,
            None => self.channels.push(record),
        }
    }
}

/// Configuration manager handles loading and saving config files.
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager.
    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = directories::ProjectDirs::from("", "", "rmemix")
            .map(|d| d.config_dir().to_path_buf())
            .ok_or(ConfigError::NoConfigDir)?;
        Self::with_dir(&config_dir)
    }

    pub fn with_dir(dir: &Path) -> Result<Self, ConfigError> {
        fs::create_dir_all(dir)?;
        debug!("Config directory: {:?}", dir);
        Ok(Self {
            config_dir: dir.to_path_buf(),
        })
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.config_dir.join(name)
    }

    pub fn load_daemon_config(&self) -> Result<DaemonConfig, ConfigError> {
        let path = self.config_path("daemon.toml");
        if !path.exists() {
            debug!("No daemon config found, using defaults");
            return Ok(DaemonConfig::default());
        }

        let content = fs::read_to_string(&path)?;
        let config = DaemonConfig::from_toml(&content)?;
        info!("Loaded daemon config from {:?}", path);
        Ok(config)
    }

    pub fn load_channel_records(&self) -> Result<ChannelRecords, ConfigError> {
        let path = self.config_path("channels.toml");
        if !path.exists() {
            return Ok(ChannelRecords::default());
        }

        let content = fs::read_to_string(&path)?;
        Ok(ChannelRecords::from_toml(&content)?)
    }

    pub fn save_channel_records(&self, records: &ChannelRecords) -> Result<(), ConfigError> {
        let path = self.config_path("channels.toml");
        let content = records.to_toml()?;
        fs::write(&path, content)?;
        debug!("Saved {} channel records to {:?}", records.channels.len(), path);
        Ok(())
    }
}
