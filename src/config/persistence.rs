// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Configuration persistence (save/load).

use crate::config::AppConfig;
use crate::topology::{SoundcardTopology, TopologyCatalog};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to determine config directory")]
    NoConfigDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Manages configuration file persistence.
pub struct ConfigManager {
    config_dir: PathBuf,
    topologies_dir: PathBuf,
}

impl ConfigManager {
    /// Create a config manager for the user's config directory.
    pub fn new() -> Result<Self, ConfigError> {
        let project_dirs = ProjectDirs::from("", "", "rmemix").ok_or(ConfigError::NoConfigDir)?;
        Self::with_dir(project_dirs.config_dir())
    }

    /// Create a config manager rooted at `dir`, creating it if needed.
    pub fn with_dir(dir: &Path) -> Result<Self, ConfigError> {
        let config_dir = dir.to_path_buf();
        let topologies_dir = config_dir.join("topologies");
        fs::create_dir_all(&config_dir)?;

        Ok(Self {
            config_dir,
            topologies_dir,
        })
    }

    /// Get the path to the main config file.
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Directory holding `<profile>.toml` topology overrides.
    pub fn topologies_dir(&self) -> &Path {
        &self.topologies_dir
    }

    /// Load the application config.
    pub fn load_config(&self) -> Result<AppConfig, ConfigError> {
        let path = self.config_path();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            Ok(AppConfig::from_toml(&content)?)
        } else {
            debug!("No config at {:?}, using defaults", path);
            Ok(AppConfig::default())
        }
    }

    /// Save the application config.
    pub fn save_config(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let content = config.to_toml()?;
        fs::write(self.config_path(), content)?;
        Ok(())
    }

    /// Built-in topologies plus any user overrides.
    pub fn load_catalog(&self) -> TopologyCatalog {
        let mut catalog = TopologyCatalog::builtin();
        let loaded = catalog.load_overrides(&self.topologies_dir);
        if loaded > 0 {
            debug!("Loaded {} topology override(s)", loaded);
        }
        catalog
    }

    /// Write a topology override for a profile.
    pub fn save_topology(
        &self,
        profile: &str,
        topology: &SoundcardTopology,
    ) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.topologies_dir)?;
        let content = topology.to_toml()?;
        fs::write(self.topologies_dir.join(format!("{}.toml", profile)), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::builtin;

    #[test]
    fn test_missing_config_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();
        assert_eq!(manager.load_config().unwrap(), AppConfig::default());
    }

    #[test]
    fn test_save_and_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(&dir.path().join("rmemix")).unwrap();

        let mut config = AppConfig::default();
        config.card.alsa_name = "Fireface UCX".to_string();
        config.mixer.compatibility_mode = true;
        manager.save_config(&config).unwrap();

        assert_eq!(manager.load_config().unwrap(), config);
    }

    #[test]
    fn test_invalid_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();
        fs::write(manager.config_path(), "[mixer]\nfader_exponent = \"steep\"").unwrap();
        assert!(matches!(
            manager.load_config(),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn test_topology_override() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();
        assert!(!manager.load_catalog().contains("custom"));

        manager
            .save_topology("custom", &builtin::default_stereo())
            .unwrap();
        let catalog = manager.load_catalog();
        assert!(catalog.contains("custom"));
        assert!(catalog.contains("pro-audio"));
    }
}
