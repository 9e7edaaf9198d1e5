// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Soundcard topology type definitions for channels, outputs, and profiles.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// A value with a left and a right side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StereoPair<T> {
    pub left: T,
    pub right: T,
}

impl<T> StereoPair<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> StereoPair<U> {
        StereoPair {
            left: f(self.left),
            right: f(self.right),
        }
    }

}

impl<T: Clone> StereoPair<T> {
    /// Same value on both sides.
    pub fn both(value: T) -> Self {
        Self {
            left: value.clone(),
            right: value,
        }
    }
}

/// A hardware driver profile the card can run in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioProfile {
    /// Stable profile name as known to PipeWire (e.g. "pro-audio").
    pub name: String,
    /// Human-readable label.
    pub display_name: String,
}

impl AudioProfile {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
        }
    }
}

/// Destination class of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputClass {
    Speakers,
    Headphones,
}

impl OutputClass {
    /// Get all variants.
    pub fn all() -> &'static [OutputClass] {
        &[OutputClass::Speakers, OutputClass::Headphones]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputClass::Speakers => "speakers",
            OutputClass::Headphones => "headphones",
        }
    }
}

impl fmt::Display for OutputClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "speakers" | "monitor" | "monitors" | "main" => Ok(OutputClass::Speakers),
            "headphones" | "phones" | "hp" => Ok(OutputClass::Headphones),
            other => Err(format!("unknown output class: {}", other)),
        }
    }
}

/// Line input reference level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineSensitivity {
    /// Professional level, "+4dBu".
    Plus4dBu,
    /// Consumer level, "-10dBV".
    Minus10dBV,
}

impl LineSensitivity {
    /// The enumerated item string the driver uses.
    pub fn as_control_value(&self) -> &'static str {
        match self {
            LineSensitivity::Plus4dBu => "+4dBu",
            LineSensitivity::Minus10dBV => "-10dBV",
        }
    }
}

impl fmt::Display for LineSensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_control_value())
    }
}

impl FromStr for LineSensitivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_matches('\'');
        match trimmed.to_ascii_lowercase().as_str() {
            "+4dbu" | "4dbu" | "high" => Ok(LineSensitivity::Plus4dBu),
            "-10dbv" | "10dbv" | "low" => Ok(LineSensitivity::Minus10dBV),
            _ => Err(format!("unknown line sensitivity: {}", trimmed)),
        }
    }
}

/// Range of an input gain control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainRange {
    /// Lowest raw step.
    pub min: i64,
    /// Highest raw step.
    pub max: i64,
    /// Decibels per raw step.
    pub db_per_step: f64,
}

impl GainRange {
    pub fn new(min: i64, max: i64, db_per_step: f64) -> Self {
        Self {
            min,
            max,
            db_per_step,
        }
    }

    /// Convert a raw gain step to decibels (saturating).
    pub fn raw_to_db(&self, raw: i64) -> f64 {
        raw.clamp(self.min, self.max) as f64 * self.db_per_step
    }

    /// Convert decibels to the nearest raw gain step (saturating).
    pub fn db_to_raw(&self, db: f64) -> i64 {
        if !db.is_finite() || self.db_per_step <= 0.0 {
            return self.min;
        }
        ((db / self.db_per_step).round() as i64).clamp(self.min, self.max)
    }
}

/// A named input gain control and its range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainControl {
    /// Switch name appended to the channel's base control name.
    pub name: String,
    pub range: GainRange,
}

/// Controls available on a microphone input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicControls {
    /// 48V phantom power switch name.
    pub phantom: String,
    /// Attenuation pad switch name, if the preamp has one.
    #[serde(default)]
    pub pad: Option<String>,
    pub gain: GainControl,
}

/// Controls available on a line input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineControls {
    /// Reference level selector name.
    pub sensitivity: String,
    pub gain: GainControl,
}

/// Input channel class. Each class carries only the controls it supports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "lowercase")]
pub enum ChannelClass {
    Mic(MicControls),
    Line(LineControls),
    Generic,
}

impl ChannelClass {
    pub fn label(&self) -> &'static str {
        match self {
            ChannelClass::Mic(_) => "mic",
            ChannelClass::Line(_) => "line",
            ChannelClass::Generic => "generic",
        }
    }

    pub fn gain(&self) -> Option<&GainControl> {
        match self {
            ChannelClass::Mic(mic) => Some(&mic.gain),
            ChannelClass::Line(line) => Some(&line.gain),
            ChannelClass::Generic => None,
        }
    }

    pub fn phantom(&self) -> Option<&str> {
        match self {
            ChannelClass::Mic(mic) => Some(&mic.phantom),
            _ => None,
        }
    }

    pub fn pad(&self) -> Option<&str> {
        match self {
            ChannelClass::Mic(mic) => mic.pad.as_deref(),
            _ => None,
        }
    }

    pub fn sensitivity(&self) -> Option<&str> {
        match self {
            ChannelClass::Line(line) => Some(&line.sensitivity),
            _ => None,
        }
    }
}

/// One physical input channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputChannel {
    /// Position in the physical channel order.
    pub index: usize,
    pub display_name: String,
    /// Base ALSA control name (e.g. "Mic-AN1").
    pub control_name: String,
    /// PipeWire port carrying this channel.
    #[serde(default)]
    pub port_name: String,
    #[serde(flatten)]
    pub class: ChannelClass,
    /// Whether this channel and its right neighbour form one stereo channel.
    #[serde(default)]
    pub stereo_coupled: bool,
}

impl InputChannel {
    pub fn new(
        index: usize,
        display_name: impl Into<String>,
        control_name: impl Into<String>,
        class: ChannelClass,
    ) -> Self {
        Self {
            index,
            display_name: display_name.into(),
            control_name: control_name.into(),
            port_name: String::new(),
            class,
            stereo_coupled: false,
        }
    }

    pub fn with_port(mut self, port_name: impl Into<String>) -> Self {
        self.port_name = port_name.into();
        self
    }

    /// Left member of a potential stereo pair.
    pub fn is_left(&self) -> bool {
        self.index % 2 == 0
    }
}

/// One physical output (speaker pair, headphone pair).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputChannel {
    pub display_name: String,
    /// Output volume controls.
    pub control: StereoPair<String>,
    /// Route names appended to input names for per-input sends.
    pub route: StereoPair<String>,
    pub class: OutputClass,
}

impl OutputChannel {
    pub fn new(
        display_name: impl Into<String>,
        control: StereoPair<String>,
        route: StereoPair<String>,
        class: OutputClass,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            control,
            route,
            class,
        }
    }
}

/// The stereo playback stream from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackReturn {
    pub display_name: String,
    pub control: StereoPair<String>,
}

/// A topology that cannot describe a real card.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("input index {0} appears more than once")]
    DuplicateIndex(usize),
    #[error("input control '{0}' appears more than once")]
    DuplicateControl(String),
}

/// Complete control surface of one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundcardTopology {
    #[serde(default)]
    pub inputs: Vec<InputChannel>,
    #[serde(default)]
    pub outputs: Vec<OutputChannel>,
    pub playback: PlaybackReturn,
}

impl SoundcardTopology {
    /// Load a topology from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn input(&self, index: usize) -> Option<&InputChannel> {
        self.inputs.iter().find(|c| c.index == index)
    }

    pub fn input_mut(&mut self, index: usize) -> Option<&mut InputChannel> {
        self.inputs.iter_mut().find(|c| c.index == index)
    }

    pub fn input_by_control(&self, control_name: &str) -> Option<&InputChannel> {
        self.inputs.iter().find(|c| c.control_name == control_name)
    }

    pub fn output(&self, class: OutputClass) -> Option<&OutputChannel> {
        self.outputs.iter().find(|o| o.class == class)
    }

    /// Reject inputs that share an index or a control name.
    pub fn validate(&self) -> Result<(), TopologyError> {
        let mut indices = HashSet::new();
        let mut controls = HashSet::new();
        for channel in &self.inputs {
            if !indices.insert(channel.index) {
                return Err(TopologyError::DuplicateIndex(channel.index));
            }
            if !controls.insert(channel.control_name.as_str()) {
                return Err(TopologyError::DuplicateControl(channel.control_name.clone()));
            }
        }
        Ok(())
    }

    /// Clear stereo coupling on channels that cannot lead a pair.
    ///
    /// Only an even-indexed channel with a right neighbour may be coupled.
    /// Returns the number of channels changed.
    pub fn clear_invalid_coupling(&mut self) -> usize {
        let indices: HashSet<usize> = self.inputs.iter().map(|c| c.index).collect();
        let mut cleared = 0;
        for channel in self.inputs.iter_mut().filter(|c| c.stereo_coupled) {
            if !channel.is_left() || !indices.contains(&(channel.index + 1)) {
                warn!(
                    "Ignoring stereo coupling for '{}': channel {} cannot lead a pair",
                    channel.control_name, channel.index
                );
                channel.stereo_coupled = false;
                cleared += 1;
            }
        }
        cleared
    }
}
