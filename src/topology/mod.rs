// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Soundcard topology descriptors.
//!
//! A topology is the control surface a profile exposes. Topologies are
//! looked up by profile name in a [`TopologyCatalog`]; profiles without an
//! entry fall back to the catalog's default.

pub mod builtin;
pub mod types;

pub use types::*;

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Maps profile names to topologies.
#[derive(Debug, Clone)]
pub struct TopologyCatalog {
    entries: HashMap<String, SoundcardTopology>,
    fallback: SoundcardTopology,
}

impl Default for TopologyCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TopologyCatalog {
    /// Create a catalog with only a fallback topology.
    pub fn new(mut fallback: SoundcardTopology) -> Self {
        fallback.clear_invalid_coupling();
        Self {
            entries: HashMap::new(),
            fallback,
        }
    }

    /// The built-in Babyface Pro catalog.
    pub fn builtin() -> Self {
        let mut catalog = Self::new(builtin::default_stereo());
        catalog.insert(builtin::PRO_AUDIO_PROFILE, builtin::pro_audio());
        catalog
    }

    /// Register or replace the topology for a profile.
    ///
    /// Coupling on channels that cannot lead a pair is cleared.
    pub fn insert(&mut self, profile: impl Into<String>, mut topology: SoundcardTopology) {
        topology.clear_invalid_coupling();
        self.entries.insert(profile.into(), topology);
    }

    /// Whether a profile has its own entry.
    pub fn contains(&self, profile: &str) -> bool {
        self.entries.contains_key(profile)
    }

    /// Topology used for profiles without an entry.
    pub fn fallback(&self) -> &SoundcardTopology {
        &self.fallback
    }

    /// Topology for a profile, or the fallback.
    pub fn get(&self, profile: &str) -> &SoundcardTopology {
        self.entries.get(profile).unwrap_or(&self.fallback)
    }

    /// Load `<profile>.toml` overrides from a directory.
    ///
    /// Unreadable or invalid files are skipped with a warning. Returns the
    /// number of topologies loaded.
    pub fn load_overrides(&mut self, dir: &Path) -> usize {
        let Ok(entries) = fs::read_dir(dir) else {
            debug!("No topology overrides at {:?}", dir);
            return 0;
        };

        let mut loaded = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let Some(profile) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| SoundcardTopology::from_toml(&s).map_err(|e| e.to_string()))
                .and_then(|t| t.validate().map(|_| t).map_err(|e| e.to_string()));

            match parsed {
                Ok(topology) => {
                    debug!("Loaded topology for profile '{}' from {:?}", profile, path);
                    self.insert(profile.to_string(), topology);
                    loaded += 1;
                }
                Err(e) => warn!("Ignoring topology {:?}: {}", path, e),
            }
        }
        loaded
    }
}
