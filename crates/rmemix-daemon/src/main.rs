// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! RmeMix Daemon - Command gateway for the hardware mixer.
//!
//! This daemon runs the ALSA and PipeWire command-line tools on behalf of
//! RmeMix clients. It exposes a D-Bus interface that the client connects to.

mod audio;
mod config;
mod dbus;
mod service;

use audio::SystemTools;
use dbus::GatewayDbusService;
use parking_lot::Mutex;
use rmemix_ipc::{DBUS_NAME, DBUS_PATH};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zbus::connection::Builder;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rmemix_daemon=debug,zbus=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("RmeMix Daemon starting...");
    audio::check_tools();

    // Load configuration
    let config_manager = config::ConfigManager::new()?;
    let daemon_config = config_manager.load_daemon_config().unwrap_or_else(|e| {
        warn!("Using default daemon config: {}", e);
        config::DaemonConfig::default()
    });

    let service = Arc::new(Mutex::new(service::GatewayService::new(
        SystemTools,
        daemon_config,
        config_manager,
    )));

    // Build D-Bus connection; it stays registered while held.
    let _connection = Builder::session()?
        .name(DBUS_NAME)?
        .serve_at(DBUS_PATH, GatewayDbusService::new(service))?
        .build()
        .await?;

    info!("D-Bus service registered at {}", DBUS_NAME);
    info!("RmeMix Daemon ready");

    // Handle shutdown signals
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down...");
        }
    }

    info!("RmeMix Daemon stopped");
    Ok(())
}
