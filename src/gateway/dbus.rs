// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! D-Bus client for the RmeMix gateway daemon.

use super::{CommandGateway, GatewayResult};
use rmemix_ipc::{ChannelRecord, ControlInfo, GatewayError};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, trace};
use zbus::{proxy, Connection, Result as ZbusResult};

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// D-Bus proxy for the gateway interface.
#[proxy(
    interface = "org.rmemix.Gateway1",
    default_service = "org.rmemix.Gateway",
    default_path = "/org/rmemix/Gateway"
)]
trait Gateway {
    fn list_controls(&self, card: &str) -> ZbusResult<Vec<ControlInfo>>;
    fn list_profiles(&self) -> ZbusResult<Vec<String>>;
    fn get_active_profile(&self) -> ZbusResult<String>;
    fn set_active_profile(&self, name: &str) -> ZbusResult<()>;
    fn get_volume(&self, control: &str) -> ZbusResult<i64>;
    fn set_volume(&self, control: &str, raw: i64) -> ZbusResult<()>;
    fn get_switch_state(&self, control: &str) -> ZbusResult<bool>;
    fn set_switch_state(&self, control: &str, on: bool) -> ZbusResult<()>;
    fn get_line_sensitivity(&self, control: &str) -> ZbusResult<String>;
    fn set_line_sensitivity(&self, control: &str, value: &str) -> ZbusResult<()>;
    fn get_input_gain(&self, control: &str) -> ZbusResult<i64>;
    fn set_input_gain(&self, control: &str, raw: i64) -> ZbusResult<()>;
    fn persist_channel_config(
        &self,
        control_name: &str,
        display_name: &str,
        stereo_coupled: bool,
    ) -> ZbusResult<()>;
    fn load_all_channel_configs(&self) -> ZbusResult<Vec<ChannelRecord>>;
    fn get_buffer_size(&self) -> ZbusResult<u32>;
    fn set_buffer_size(&self, frames: u32) -> ZbusResult<()>;
}

/// Client for the gateway daemon.
#[derive(Clone)]
pub struct DbusGateway {
    proxy: GatewayProxy<'static>,
    timeout: Duration,
}

impl DbusGateway {
    /// Connect to the gateway daemon on the session bus.
    pub async fn connect(timeout: Duration) -> Result<Self, GatewayError> {
        info!("Connecting to RmeMix gateway...");

        let connection = Connection::session()
            .await
            .map_err(|e| GatewayError::ConnectionFailed(e.to_string()))?;

        let proxy = GatewayProxy::new(&connection)
            .await
            .map_err(|e| GatewayError::ConnectionFailed(e.to_string()))?;

        info!("Connected to RmeMix gateway");
        Ok(Self { proxy, timeout })
    }

    /// Run one proxy call under the request timeout.
    async fn call<T>(
        &self,
        method: &str,
        fut: impl Future<Output = ZbusResult<T>>,
    ) -> GatewayResult<T> {
        trace!("gateway call: {}", method);
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| map_call_error(method, e)),
            Err(_) => Err(GatewayError::Timeout(format!(
                "{} after {}ms",
                method,
                self.timeout.as_millis()
            ))),
        }
    }
}

fn map_call_error(method: &str, e: zbus::Error) -> GatewayError {
    match e {
        zbus::Error::FDO(fdo) => match *fdo {
            zbus::fdo::Error::ServiceUnknown(msg) | zbus::fdo::Error::NameHasNoOwner(msg) => {
                GatewayError::DaemonNotRunning(msg)
            }
            zbus::fdo::Error::InvalidArgs(msg) => GatewayError::InvalidArgument(msg),
            other => GatewayError::MethodCallFailed(format!("{}: {}", method, other)),
        },
        other => GatewayError::MethodCallFailed(format!("{}: {}", method, other)),
    }
}

impl CommandGateway for DbusGateway {
    async fn list_controls(&self, card: &str) -> GatewayResult<HashMap<String, ControlInfo>> {
        let controls = self
            .call("ListControls", self.proxy.list_controls(card))
            .await?;
        debug!("Received {} controls for card '{}'", controls.len(), card);
        Ok(controls.into_iter().map(|c| (c.name.clone(), c)).collect())
    }

    async fn list_profiles(&self) -> GatewayResult<Vec<String>> {
        self.call("ListProfiles", self.proxy.list_profiles()).await
    }

    async fn get_active_profile(&self) -> GatewayResult<String> {
        self.call("GetActiveProfile", self.proxy.get_active_profile())
            .await
    }

    async fn set_active_profile(&self, name: &str) -> GatewayResult<()> {
        self.call("SetActiveProfile", self.proxy.set_active_profile(name))
            .await
    }

    async fn get_volume(&self, control: &str) -> GatewayResult<i64> {
        self.call("GetVolume", self.proxy.get_volume(control)).await
    }

    async fn set_volume(&self, control: &str, raw: i64) -> GatewayResult<()> {
        self.call("SetVolume", self.proxy.set_volume(control, raw))
            .await
    }

    async fn get_switch_state(&self, control: &str) -> GatewayResult<bool> {
        self.call("GetSwitchState", self.proxy.get_switch_state(control))
            .await
    }

    async fn set_switch_state(&self, control: &str, on: bool) -> GatewayResult<()> {
        self.call("SetSwitchState", self.proxy.set_switch_state(control, on))
            .await
    }

    async fn get_line_sensitivity(&self, control: &str) -> GatewayResult<String> {
        self.call(
            "GetLineSensitivity",
            self.proxy.get_line_sensitivity(control),
        )
        .await
    }

    async fn set_line_sensitivity(&self, control: &str, value: &str) -> GatewayResult<()> {
        self.call(
            "SetLineSensitivity",
            self.proxy.set_line_sensitivity(control, value),
        )
        .await
    }

    async fn get_input_gain(&self, control: &str) -> GatewayResult<i64> {
        self.call("GetInputGain", self.proxy.get_input_gain(control))
            .await
    }

    async fn set_input_gain(&self, control: &str, raw: i64) -> GatewayResult<()> {
        self.call("SetInputGain", self.proxy.set_input_gain(control, raw))
            .await
    }

    async fn persist_channel_config(
        &self,
        control_name: &str,
        display_name: &str,
        stereo_coupled: bool,
    ) -> GatewayResult<()> {
        self.call(
            "PersistChannelConfig",
            self.proxy
                .persist_channel_config(control_name, display_name, stereo_coupled),
        )
        .await
    }

    async fn load_all_channel_configs(&self) -> GatewayResult<Vec<ChannelRecord>> {
        self.call(
            "LoadAllChannelConfigs",
            self.proxy.load_all_channel_configs(),
        )
        .await
    }

    async fn get_buffer_size(&self) -> GatewayResult<u32> {
        self.call("GetBufferSize", self.proxy.get_buffer_size()).await
    }

    async fn set_buffer_size(&self, frames: u32) -> GatewayResult<()> {
        self.call("SetBufferSize", self.proxy.set_buffer_size(frames))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_call_error() {
        let err = map_call_error(
            "GetVolume",
            zbus::Error::FDO(Box::new(zbus::fdo::Error::ServiceUnknown(
                "org.rmemix.Gateway".to_string(),
            ))),
        );
        assert!(matches!(err, GatewayError::DaemonNotRunning(_)));

        let err = map_call_error(
            "SetVolume",
            zbus::Error::FDO(Box::new(zbus::fdo::Error::InvalidArgs("raw".to_string()))),
        );
        assert_eq!(err, GatewayError::InvalidArgument("raw".to_string()));

        let err = map_call_error("SetVolume", zbus::Error::InvalidReply);
        assert!(matches!(err, GatewayError::MethodCallFailed(msg) if msg.starts_with("SetVolume")));
    }
}
