// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Control name derivation.
//!
//! Routing sends are named `"{input}-{route}"`, one per output side. Switch
//! and gain controls are named `"{base} {switch}"`. The daemon addresses
//! controls by these exact strings.

use crate::topology::{
    GainRange, InputChannel, OutputChannel, OutputClass, PlaybackReturn, StereoPair,
};
use thiserror::Error;

/// Route pair used for speakers in compatibility mode.
pub const COMPAT_SPEAKER_ROUTE: (&str, &str) = ("AN1", "AN2");

/// Errors from control name resolution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("No output of class '{0}' in the active topology")]
    OutputNotFound(OutputClass),
    #[error("Channel '{channel}' has no {control} control")]
    UnsupportedControl {
        channel: String,
        control: &'static str,
    },
}

/// Format one routing send name.
pub fn routing_name(input: &str, route: &str) -> String {
    format!("{}-{}", input, route)
}

/// Format a switch or gain control name.
pub fn switch_name(base: &str, switch: &str) -> String {
    format!("{} {}", base, switch)
}

/// Route names for an output class.
fn route_for(
    class: OutputClass,
    outputs: &[OutputChannel],
    compatibility_mode: bool,
) -> Result<StereoPair<String>, ResolveError> {
    if compatibility_mode && class == OutputClass::Speakers {
        return Ok(StereoPair::new(
            COMPAT_SPEAKER_ROUTE.0.to_string(),
            COMPAT_SPEAKER_ROUTE.1.to_string(),
        ));
    }

    outputs
        .iter()
        .find(|o| o.class == class)
        .map(|o| o.route.clone())
        .ok_or(ResolveError::OutputNotFound(class))
}

/// Resolve the left/right send controls from one input to an output.
pub fn resolve_send(
    input: &str,
    class: OutputClass,
    outputs: &[OutputChannel],
    compatibility_mode: bool,
) -> Result<StereoPair<String>, ResolveError> {
    let route = route_for(class, outputs, compatibility_mode)?;
    Ok(route.map(|r| routing_name(input, &r)))
}

/// Resolve sends for a coupled stereo pair.
///
/// The left member feeds the left route and the right member the right
/// route.
pub fn resolve_stereo_send(
    left_input: &str,
    right_input: &str,
    class: OutputClass,
    outputs: &[OutputChannel],
    compatibility_mode: bool,
) -> Result<StereoPair<String>, ResolveError> {
    let route = route_for(class, outputs, compatibility_mode)?;
    Ok(StereoPair::new(
        routing_name(left_input, &route.left),
        routing_name(right_input, &route.right),
    ))
}

/// Resolve the playback return sends into an output.
pub fn resolve_playback_send(
    playback: &PlaybackReturn,
    class: OutputClass,
    outputs: &[OutputChannel],
    compatibility_mode: bool,
) -> Result<StereoPair<String>, ResolveError> {
    let route = route_for(class, outputs, compatibility_mode)?;
    Ok(StereoPair::new(
        routing_name(&playback.control.left, &route.left),
        routing_name(&playback.control.right, &route.right),
    ))
}

/// Output volume controls for a class.
pub fn resolve_output_volume(
    class: OutputClass,
    outputs: &[OutputChannel],
) -> Result<StereoPair<String>, ResolveError> {
    outputs
        .iter()
        .find(|o| o.class == class)
        .map(|o| o.control.clone())
        .ok_or(ResolveError::OutputNotFound(class))
}

fn unsupported(channel: &InputChannel, control: &'static str) -> ResolveError {
    ResolveError::UnsupportedControl {
        channel: channel.control_name.clone(),
        control,
    }
}

/// Phantom power switch of a mic input.
pub fn phantom_control(channel: &InputChannel) -> Result<String, ResolveError> {
    channel
        .class
        .phantom()
        .map(|s| switch_name(&channel.control_name, s))
        .ok_or_else(|| unsupported(channel, "phantom power"))
}

/// Pad switch of a mic input.
pub fn pad_control(channel: &InputChannel) -> Result<String, ResolveError> {
    channel
        .class
        .pad()
        .map(|s| switch_name(&channel.control_name, s))
        .ok_or_else(|| unsupported(channel, "pad"))
}

/// Sensitivity selector of a line input.
pub fn sensitivity_control(channel: &InputChannel) -> Result<String, ResolveError> {
    channel
        .class
        .sensitivity()
        .map(|s| switch_name(&channel.control_name, s))
        .ok_or_else(|| unsupported(channel, "line sensitivity"))
}

/// Gain control of a mic or line input, with its range.
pub fn gain_control(channel: &InputChannel) -> Result<(String, GainRange), ResolveError> {
    channel
        .class
        .gain()
        .map(|g| (switch_name(&channel.control_name, &g.name), g.range))
        .ok_or_else(|| unsupported(channel, "gain"))
}
