// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Card profiles through `pactl` (PipeWire's PulseAudio compatibility layer).

use super::{ToolError, ToolRunner};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info};

fn profile_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s+(.+?):\s.+\s\(sinks:.+sources:.+\spriority:.+\savailable: (yes|no)\)")
            .unwrap()
    })
}

/// Find a card's id in `pactl list cards short` output.
pub fn parse_card_id(short_listing: &str, card_name: &str) -> Option<String> {
    short_listing
        .lines()
        .filter(|line| line.contains(card_name))
        .find_map(|line| line.split_whitespace().next().map(str::to_string))
}

/// Lines of one `Card #<id>` section of `pactl list cards`.
fn card_section<'a>(listing: &'a str, card_id: &str) -> impl Iterator<Item = &'a str> {
    let header = format!("Card #{}", card_id);
    listing
        .lines()
        .skip_while(move |line| line.trim() != header)
        .skip(1)
        .take_while(|line| !line.starts_with("Card #"))
}

/// Profile names offered for a card, in listing order.
pub fn parse_profiles(listing: &str, card_id: &str) -> Vec<String> {
    card_section(listing, card_id)
        .filter_map(|line| profile_re().captures(line).map(|c| c[1].to_string()))
        .collect()
}

/// The card's active profile.
pub fn parse_active_profile(listing: &str, card_id: &str) -> Option<String> {
    card_section(listing, card_id).find_map(|line| {
        line.trim()
            .strip_prefix("Active Profile:")
            .map(|name| name.trim().to_string())
    })
}

pub fn find_card_id(tools: &impl ToolRunner, card_name: &str) -> Result<String, ToolError> {
    let output = tools.run("pactl", &["list", "cards", "short"])?;
    let id = parse_card_id(&output, card_name)
        .ok_or_else(|| ToolError::NotFound(format!("PipeWire card '{}'", card_name)))?;
    debug!("Card '{}' is PipeWire card #{}", card_name, id);
    Ok(id)
}

pub fn list_profiles(tools: &impl ToolRunner, card_id: &str) -> Result<Vec<String>, ToolError> {
    let output = tools.run("pactl", &["list", "cards"])?;
    let profiles = parse_profiles(&output, card_id);
    if profiles.is_empty() {
        return Err(ToolError::NotFound(format!("profiles for card #{}", card_id)));
    }
    Ok(profiles)
}

pub fn active_profile(tools: &impl ToolRunner, card_id: &str) -> Result<String, ToolError> {
    let output = tools.run("pactl", &["list", "cards"])?;
    parse_active_profile(&output, card_id)
        .ok_or_else(|| ToolError::NotFound(format!("active profile for card #{}", card_id)))
}

pub fn set_profile(tools: &impl ToolRunner, card_id: &str, profile: &str) -> Result<(), ToolError> {
    tools.run("pactl", &["set-card-profile", card_id, profile])?;
    info!("Card #{} profile set to '{}'", card_id, profile);
    Ok(())
}
