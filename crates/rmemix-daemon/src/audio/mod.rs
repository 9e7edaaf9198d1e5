// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Driver tool access for the daemon (ALSA and PipeWire command-line tools).

pub mod amixer;
pub mod controls;
pub mod pactl;
pub mod quantum;

use std::process::Command;
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to execute {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with an error: {stderr}")]
    Failed { tool: String, stderr: String },
    #[error("Could not parse {tool} output: {detail}")]
    Parse { tool: String, detail: String },
    #[error("{0} not found")]
    NotFound(String),
}

impl ToolError {
    pub fn parse(tool: &str, detail: impl Into<String>) -> Self {
        ToolError::Parse {
            tool: tool.to_string(),
            detail: detail.into(),
        }
    }
}

/// Runs an external tool and returns its standard output.
pub trait ToolRunner: Send {
    fn run(&self, tool: &str, args: &[&str]) -> Result<String, ToolError>;
}

/// Runs tools from `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTools;

impl ToolRunner for SystemTools {
    fn run(&self, tool: &str, args: &[&str]) -> Result<String, ToolError> {
        trace!("exec: {} {:?}", tool, args);
        let output = Command::new(tool)
            .args(args)
            .output()
            .map_err(|source| ToolError::Spawn {
                tool: tool.to_string(),
                source,
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(ToolError::Failed {
                tool: tool.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Warn about missing tools at startup.
pub fn check_tools() {
    let tools = [
        ("aplay", "ALSA card lookup"),
        ("amixer", "hardware mixer controls"),
        ("pactl", "card profiles"),
        ("pw-metadata", "buffer size"),
    ];

    for (tool, purpose) in &tools {
        match Command::new("which").arg(tool).output() {
            Ok(output) if output.status.success() => {
                debug!("{} found", tool);
            }
            _ => {
                warn!("'{}' not found in PATH; needed for {}", tool, purpose);
            }
        }
    }
}
