// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Application configuration (card, profiles, mixer behavior).

use crate::gateway::dbus::DEFAULT_TIMEOUT;
use crate::level::DEFAULT_CURVE_EXPONENT;
use crate::topology::{builtin, AudioProfile};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which card to control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardConfig {
    /// ALSA card name as listed by `aplay -l`.
    pub alsa_name: String,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            alsa_name: "Babyface Pro".to_string(),
        }
    }
}

/// Mixer behavior settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    /// Use the fixed AN1/AN2 speaker routes.
    pub compatibility_mode: bool,
    /// Exponent of the fader curve.
    pub fader_exponent: f64,
    /// Per-request gateway timeout.
    pub request_timeout_ms: u64,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            compatibility_mode: false,
            fader_exponent: DEFAULT_CURVE_EXPONENT,
            request_timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl MixerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

fn default_profiles() -> Vec<AudioProfile> {
    builtin::default_profiles()
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub card: CardConfig,
    #[serde(default)]
    pub mixer: MixerSettings,
    /// Curated profile list, in display order.
    #[serde(default = "default_profiles")]
    pub profiles: Vec<AudioProfile>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            card: CardConfig::default(),
            mixer: MixerSettings::default(),
            profiles: default_profiles(),
        }
    }
}

impl AppConfig {
    /// Load config from TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
