// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! PipeWire clock quantum (buffer size) through `pw-metadata`.

use super::{ToolError, ToolRunner};
use tracing::info;

/// Value of `key` in `pw-metadata` output.
///
/// Lines look like `update: id:0 key:'clock.quantum' value:'1024' type:''`.
fn metadata_value(output: &str, key: &str) -> Option<u32> {
    let needle = format!("key:'{}'", key);
    output
        .lines()
        .filter(|line| line.contains(&needle))
        .find_map(|line| {
            line.split("value:'")
                .nth(1)
                .and_then(|rest| rest.split('\'').next())
                .and_then(|value| value.parse().ok())
        })
}

/// The effective quantum: a non-zero forced quantum, else the default one.
pub fn parse_quantum(output: &str) -> Option<u32> {
    metadata_value(output, "clock.force-quantum")
        .filter(|&forced| forced > 0)
        .or_else(|| metadata_value(output, "clock.quantum"))
}

pub fn get_quantum(tools: &impl ToolRunner) -> Result<u32, ToolError> {
    let output = tools.run("pw-metadata", &["-n", "settings"])?;
    parse_quantum(&output)
        .ok_or_else(|| ToolError::parse("pw-metadata", "no clock quantum in settings"))
}

/// Force the quantum. Range checks happen in the caller.
pub fn set_quantum(tools: &impl ToolRunner, frames: u32) -> Result<(), ToolError> {
    tools.run(
        "pw-metadata",
        &["-n", "settings", "0", "clock.force-quantum", &frames.to_string()],
    )?;
    info!("Clock quantum forced to {}", frames);
    Ok(())
}
