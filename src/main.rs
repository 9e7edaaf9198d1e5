// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! RmeMix CLI - drive the hardware mixer through the running daemon.

use clap::{Parser, Subcommand, ValueEnum};
use rmemix::config::{AppConfig, ConfigManager};
use rmemix::gateway::DbusGateway;
use rmemix::level::{apply_curve, percentage_to_db};
use rmemix::mixer::Mixer;
use rmemix::profile::ProfileManager;
use rmemix::state::ChannelStore;
use rmemix::topology::{LineSensitivity, OutputClass, StereoPair};
use rmemix::{ErrorKind, MixerError};
use serde_json::json;
use std::process::ExitCode;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rmemix")]
#[command(about = "Control an RME Babyface Pro hardware mixer", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show profiles, channels, and cached levels
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Switch the card profile
    Profile { name: String },
    /// Set an input's send level to an output
    Send {
        /// Input number (1-based) or name
        input: String,
        destination: OutputClass,
        /// Level in dB, or fader position as a percentage ("75%")
        #[arg(allow_hyphen_values = true, value_parser = parse_level)]
        level: Level,
    },
    /// Set an input's preamp gain in dB
    Gain {
        input: String,
        #[arg(allow_hyphen_values = true)]
        db: f64,
    },
    /// Toggle 48V phantom power
    Phantom { input: String, state: Toggle },
    /// Toggle the input pad
    Pad { input: String, state: Toggle },
    /// Set line input sensitivity (+4dBu or -10dBV)
    Sens {
        input: String,
        #[arg(allow_hyphen_values = true)]
        value: LineSensitivity,
    },
    /// Set an output level
    Volume {
        output: OutputClass,
        #[arg(allow_hyphen_values = true, value_parser = parse_level)]
        level: Level,
        /// Set the host playback level into the output instead
        #[arg(long)]
        playback: bool,
    },
    /// Couple an input with its right neighbour
    Couple { input: String, state: Toggle },
    /// Rename an input
    Rename { input: String, name: String },
    /// Set the PipeWire buffer size in frames
    Buffer { frames: u32 },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn is_on(self) -> bool {
        matches!(self, Toggle::On)
    }
}

/// A level typed by the user.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Level {
    Db(f64),
    /// Fader position in percent, before the curve is applied.
    Fader(f64),
}

impl Level {
    fn to_db(self, exponent: f64) -> f64 {
        match self {
            Level::Db(db) => db,
            Level::Fader(pct) => percentage_to_db(apply_curve(pct / 100.0, exponent) * 100.0),
        }
    }
}

fn parse_level(s: &str) -> Result<Level, String> {
    let s = s.trim();
    if let Some(pct) = s.strip_suffix('%') {
        let pct: f64 = pct
            .trim()
            .parse()
            .map_err(|_| format!("invalid fader position: {}", s))?;
        return Ok(Level::Fader(pct));
    }
    let number = s
        .strip_suffix("dB")
        .or_else(|| s.strip_suffix("db"))
        .unwrap_or(s);
    number
        .trim()
        .parse()
        .map(Level::Db)
        .map_err(|_| format!("invalid level: {}", s))
}

/// Find an input by 1-based number, display name, or control name.
fn find_input(store: &ChannelStore, query: &str) -> Result<usize, String> {
    let inputs = &store.topology().inputs;
    if let Ok(number) = query.parse::<usize>() {
        return inputs
            .iter()
            .find(|c| c.index + 1 == number)
            .map(|c| c.index)
            .ok_or_else(|| format!("no input number {}", number));
    }
    inputs
        .iter()
        .find(|c| {
            c.display_name.eq_ignore_ascii_case(query) || c.control_name.eq_ignore_ascii_case(query)
        })
        .map(|c| c.index)
        .ok_or_else(|| format!("no input named '{}'", query))
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "rmemix=debug,zbus=warn"
    } else {
        "rmemix=info,zbus=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Configuration => 3,
        ErrorKind::Validation => 2,
        ErrorKind::Busy => 4,
        ErrorKind::Boundary => 5,
    }
}

fn format_pair(pair: Option<StereoPair<f64>>) -> String {
    match pair {
        Some(p) if p.left == p.right => format!("{:+.1} dB", p.left),
        Some(p) => format!("{:+.1}/{:+.1} dB", p.left, p.right),
        None => "-".to_string(),
    }
}

fn print_status(store: &ChannelStore) {
    let active = store.active_profile().map(|p| p.display_name.as_str());
    println!("Profile: {}", active.unwrap_or("<unknown>"));
    for profile in store.available_profiles() {
        let marker = if store.active_profile().map(|p| &p.name) == Some(&profile.name) {
            '*'
        } else {
            ' '
        };
        println!("  {} {} ({})", marker, profile.display_name, profile.name);
    }
    if let Some(frames) = store.buffer_size() {
        println!("Buffer: {} frames", frames);
    }

    println!("Inputs:");
    for channel in store.visible_channels() {
        let state = store.input_state(channel.index);
        let mut line = format!(
            "  {:>2} {:<12} {:<8}",
            channel.index + 1,
            channel.display_name,
            channel.class.label()
        );
        if channel.stereo_coupled {
            line.push_str(" stereo");
        }
        line.push_str(&format!(
            " mon {} hp {}",
            format_pair(state.and_then(|s| s.monitor_send)),
            format_pair(state.and_then(|s| s.headphones_send)),
        ));
        if let Some(gain) = state.and_then(|s| s.gain_db) {
            line.push_str(&format!(" gain {:.1} dB", gain));
        }
        if state.and_then(|s| s.phantom) == Some(true) {
            line.push_str(" 48V");
        }
        if state.and_then(|s| s.pad) == Some(true) {
            line.push_str(" PAD");
        }
        if let Some(sens) = state.and_then(|s| s.sensitivity) {
            line.push_str(&format!(" {}", sens));
        }
        println!("{}", line);
    }

    println!("Outputs:");
    for class in OutputClass::all() {
        if let Some(output) = store.topology().output(*class) {
            println!(
                "  {:<15} {} (playback {})",
                output.display_name,
                format_pair(store.output_level(*class)),
                format_pair(store.playback_level(*class))
            );
        }
    }
}

fn status_json(store: &ChannelStore) -> serde_json::Value {
    let inputs: Vec<_> = store
        .visible_channels()
        .map(|c| {
            json!({
                "channel": c,
                "state": store.input_state(c.index),
            })
        })
        .collect();
    let outputs: Vec<_> = OutputClass::all()
        .iter()
        .map(|class| {
            json!({
                "class": class,
                "level": store.output_level(*class),
                "playback": store.playback_level(*class),
            })
        })
        .collect();

    json!({
        "active_profile": store.active_profile(),
        "available_profiles": store.available_profiles(),
        "buffer_size": store.buffer_size(),
        "inputs": inputs,
        "outputs": outputs,
    })
}

fn input_index(mixer: &Mixer<DbusGateway>, query: &str) -> Result<usize, CliError> {
    find_input(mixer.store(), query).map_err(CliError::Usage)
}

async fn run(command: Command, config: AppConfig, manager: &ConfigManager) -> Result<(), CliError> {
    let gateway = DbusGateway::connect(config.mixer.request_timeout()).await?;
    let store = ChannelStore::new(
        config.profiles.clone(),
        manager.load_catalog(),
        config.mixer.compatibility_mode,
    );
    let mut mixer = Mixer::new(
        store,
        gateway,
        ProfileManager::new(config.card.alsa_name.clone()),
    );
    let exponent = config.mixer.fader_exponent;

    if let Err(e) = mixer.initialize().await {
        // A partial load is still worth showing.
        if !matches!(command, Command::Status { .. }) {
            return Err(e.into());
        }
        warn!("Status may be incomplete: {}", e);
    }

    match command {
        Command::Status { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&status_json(mixer.store()))?);
            } else {
                print_status(mixer.store());
            }
        }
        Command::Profile { name } => {
            let profile = mixer.switch_profile(&name).await?;
            info!("Active profile: {}", profile.display_name);
        }
        Command::Send {
            input: query,
            destination,
            level,
        } => {
            let index = input_index(&mixer, &query)?;
            let db = level.to_db(exponent);
            debug!("Send {} -> {} at {} dB", query, destination, db);
            match destination {
                OutputClass::Speakers => mixer.set_monitor_send(index, db).await?,
                OutputClass::Headphones => mixer.set_headphones_send(index, db).await?,
            }
        }
        Command::Gain { input: query, db } => {
            let index = input_index(&mixer, &query)?;
            mixer.set_input_gain(index, db).await?;
        }
        Command::Phantom { input: query, state } => {
            let index = input_index(&mixer, &query)?;
            mixer.set_phantom_power(index, state.is_on()).await?;
        }
        Command::Pad { input: query, state } => {
            let index = input_index(&mixer, &query)?;
            mixer.set_pad(index, state.is_on()).await?;
        }
        Command::Sens { input: query, value } => {
            let index = input_index(&mixer, &query)?;
            mixer.set_line_sensitivity(index, value).await?;
        }
        Command::Volume {
            output,
            level,
            playback,
        } => {
            let db = level.to_db(exponent);
            if playback {
                mixer.set_playback_volume(output, db).await?;
            } else {
                mixer.set_main_volume(output, db).await?;
            }
        }
        Command::Couple { input: query, state } => {
            let index = input_index(&mixer, &query)?;
            mixer.set_stereo_coupled(index, state.is_on()).await?;
        }
        Command::Rename { input: query, name } => {
            let index = input_index(&mixer, &query)?;
            mixer.rename_channel(index, &name).await?;
        }
        Command::Buffer { frames } => {
            mixer.set_buffer_size(frames).await?;
        }
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Mixer(#[from] MixerError),
    #[error(transparent)]
    Gateway(#[from] rmemix_ipc::GatewayError),
    #[error(transparent)]
    Config(#[from] rmemix::config::ConfigError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

async fn load_and_run(command: Command) -> Result<(), CliError> {
    let manager = ConfigManager::new()?;
    let config = manager.load_config()?;
    run(command, config, &manager).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match load_and_run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Mixer(e)) => {
            eprintln!("rmemix: {} error: {}", e.kind(), e);
            ExitCode::from(exit_code(e.kind()))
        }
        Err(CliError::Gateway(e)) => {
            eprintln!("rmemix: {}", e);
            ExitCode::from(exit_code(ErrorKind::Boundary))
        }
        Err(e) => {
            eprintln!("rmemix: {}", e);
            ExitCode::FAILURE
        }
    }
}
