// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Configuration management for RmeMix.

pub mod app_config;
pub mod persistence;

pub use app_config::{AppConfig, CardConfig, MixerSettings};
pub use persistence::{ConfigError, ConfigManager};
