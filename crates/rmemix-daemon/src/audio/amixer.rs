// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! ALSA card lookup (`aplay -l`) and mixer control access (`amixer`).

use super::controls::parse_controls;
use super::{ToolError, ToolRunner};
use rmemix_ipc::ControlInfo;
use tracing::debug;

/// Find a card's index in `aplay -l` output.
///
/// Lines look like `card 1: Pro70785713 [Babyface Pro (70785713)], device 0: ...`.
pub fn parse_card_index(aplay_output: &str, card_name: &str) -> Option<u32> {
    aplay_output
        .lines()
        .filter(|line| line.starts_with("card ") && line.contains(card_name))
        .find_map(|line| {
            line.split_whitespace()
                .nth(1)
                .and_then(|index| index.trim_end_matches(':').parse().ok())
        })
}

/// Look up the ALSA card index for a card name.
pub fn find_card_index(tools: &impl ToolRunner, card_name: &str) -> Result<u32, ToolError> {
    let output = tools.run("aplay", &["-l"])?;
    let index = parse_card_index(&output, card_name)
        .ok_or_else(|| ToolError::NotFound(format!("sound card '{}'", card_name)))?;
    debug!("Card '{}' is ALSA card {}", card_name, index);
    Ok(index)
}

/// `amixer` bound to one card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amixer {
    card: u32,
}

impl Amixer {
    pub fn new(card: u32) -> Self {
        Self { card }
    }

    pub fn card(&self) -> u32 {
        self.card
    }

    fn run(&self, tools: &impl ToolRunner, args: &[&str]) -> Result<String, ToolError> {
        let card = self.card.to_string();
        let mut full = vec!["-c", card.as_str()];
        full.extend_from_slice(args);
        tools.run("amixer", &full)
    }

    /// Every simple control on the card.
    pub fn list_controls(&self, tools: &impl ToolRunner) -> Result<Vec<ControlInfo>, ToolError> {
        let output = self.run(tools, &[])?;
        Ok(parse_controls(&output))
    }

    /// One control's current state.
    pub fn get(&self, tools: &impl ToolRunner, control: &str) -> Result<ControlInfo, ToolError> {
        let output = self.run(tools, &["get", control])?;
        parse_controls(&output)
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::NotFound(format!("control '{}'", control)))
    }

    /// First raw value of a volume or gain control.
    pub fn get_value(&self, tools: &impl ToolRunner, control: &str) -> Result<i64, ToolError> {
        self.get(tools, control)?
            .first_value()
            .ok_or_else(|| ToolError::parse("amixer", format!("no value for '{}'", control)))
    }

    pub fn get_switch(&self, tools: &impl ToolRunner, control: &str) -> Result<bool, ToolError> {
        self.get(tools, control)?
            .switch_state()
            .ok_or_else(|| ToolError::parse("amixer", format!("no switch state for '{}'", control)))
    }

    pub fn get_item(&self, tools: &impl ToolRunner, control: &str) -> Result<String, ToolError> {
        self.get(tools, control)?
            .selected_item()
            .map(str::to_string)
            .ok_or_else(|| ToolError::parse("amixer", format!("no item for '{}'", control)))
    }

    /// Write a raw value verbatim; the driver saturates to its limits.
    pub fn set_value(
        &self,
        tools: &impl ToolRunner,
        control: &str,
        raw: i64,
    ) -> Result<(), ToolError> {
        self.run(tools, &["set", control, "--", &raw.to_string()])?;
        Ok(())
    }

    pub fn set_switch(
        &self,
        tools: &impl ToolRunner,
        control: &str,
        on: bool,
    ) -> Result<(), ToolError> {
        self.run(tools, &["set", control, if on { "on" } else { "off" }])?;
        Ok(())
    }

    /// Select an enumerated item. `--` keeps "-10dBV" from reading as an option.
    pub fn set_item(
        &self,
        tools: &impl ToolRunner,
        control: &str,
        item: &str,
    ) -> Result<(), ToolError> {
        self.run(tools, &["sset", control, "--", item])?;
        Ok(())
    }
}
