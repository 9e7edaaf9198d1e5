// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! RmeMix - Hardware mixer control for RME Babyface Pro style interfaces.
//!
//! The crate models the card's channels, turns dB levels into ALSA mixer
//! values, and sends them through a [`gateway::CommandGateway`]. The
//! `rmemix-daemon` binary is the gateway that talks to the driver tools.

pub mod config;
pub mod error;
pub mod gateway;
pub mod level;
pub mod mixer;
pub mod mutation;
pub mod profile;
pub mod resolver;
pub mod state;
pub mod topology;

pub use error::{ErrorKind, MixerError};
pub use mixer::Mixer;
pub use state::ChannelStore;
