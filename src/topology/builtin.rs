// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Built-in topologies for the Babyface Pro.

use super::types::*;

/// Profile name of the multi-channel pro-audio mode.
pub const PRO_AUDIO_PROFILE: &str = "pro-audio";
/// Profile name of the plain analog stereo mode.
pub const ANALOG_STEREO_PROFILE: &str = "output:analog-stereo+input:analog-stereo";

/// Phantom power switch suffix.
pub const PHANTOM_SWITCH: &str = "48V";
/// Mic pad switch suffix.
pub const PAD_SWITCH: &str = "PAD";
/// Line sensitivity selector suffix.
pub const SENSITIVITY_SWITCH: &str = "Sens.";
/// Input gain control suffix.
pub const GAIN_CONTROL: &str = "Gain";

/// Mic preamp gain: 0..65 dB in 1 dB steps.
pub const MIC_GAIN_RANGE: GainRange = GainRange {
    min: 0,
    max: 65,
    db_per_step: 1.0,
};

/// Line input gain: 0..12 dB in 0.5 dB steps.
pub const LINE_GAIN_RANGE: GainRange = GainRange {
    min: 0,
    max: 24,
    db_per_step: 0.5,
};

fn mic(index: usize, display_name: &str, control_name: &str, port: &str) -> InputChannel {
    InputChannel::new(
        index,
        display_name,
        control_name,
        ChannelClass::Mic(MicControls {
            phantom: PHANTOM_SWITCH.to_string(),
            pad: Some(PAD_SWITCH.to_string()),
            gain: GainControl {
                name: GAIN_CONTROL.to_string(),
                range: MIC_GAIN_RANGE,
            },
        }),
    )
    .with_port(port)
}

fn line(index: usize, display_name: &str, control_name: &str, port: &str) -> InputChannel {
    InputChannel::new(
        index,
        display_name,
        control_name,
        ChannelClass::Line(LineControls {
            sensitivity: SENSITIVITY_SWITCH.to_string(),
            gain: GainControl {
                name: GAIN_CONTROL.to_string(),
                range: LINE_GAIN_RANGE,
            },
        }),
    )
    .with_port(port)
}

fn pair(left: &str, right: &str) -> StereoPair<String> {
    StereoPair::new(left.to_string(), right.to_string())
}

fn babyface_outputs() -> Vec<OutputChannel> {
    vec![
        OutputChannel::new(
            "Main Output",
            pair("Main-Out AN1", "Main-Out AN2"),
            pair("AN1", "AN2"),
            OutputClass::Speakers,
        ),
        OutputChannel::new(
            "Headphones",
            pair("Main-Out PH3", "Main-Out PH4"),
            pair("PH3", "PH4"),
            OutputClass::Headphones,
        ),
    ]
}

fn babyface_playback() -> PlaybackReturn {
    PlaybackReturn {
        display_name: "Playback".to_string(),
        control: pair("PCM-AN1", "PCM-AN2"),
    }
}

/// Four discrete inputs: two mic preamps and two line inputs.
pub fn pro_audio() -> SoundcardTopology {
    SoundcardTopology {
        inputs: vec![
            mic(0, "Mic 1", "Mic-AN1", "capture_AUX0"),
            mic(1, "Mic 2", "Mic-AN2", "capture_AUX1"),
            line(2, "Line 3", "Line-IN3", "capture_AUX2"),
            line(3, "Line 4", "Line-IN4", "capture_AUX3"),
        ],
        outputs: babyface_outputs(),
        playback: babyface_playback(),
    }
}

/// Two generic inputs without preamp controls.
pub fn default_stereo() -> SoundcardTopology {
    SoundcardTopology {
        inputs: vec![
            InputChannel::new(0, "Input L", "AN1", ChannelClass::Generic).with_port("capture_FL"),
            InputChannel::new(1, "Input R", "AN2", ChannelClass::Generic).with_port("capture_FR"),
        ],
        outputs: babyface_outputs(),
        playback: babyface_playback(),
    }
}

/// The curated profile list shipped by default.
pub fn default_profiles() -> Vec<AudioProfile> {
    vec![
        AudioProfile::new(PRO_AUDIO_PROFILE, "Pro Audio"),
        AudioProfile::new(ANALOG_STEREO_PROFILE, "Analog Stereo"),
    ]
}
