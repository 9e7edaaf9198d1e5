// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Device mutation pipeline.
//!
//! A mutation is prepared synchronously by the [`ChannelStore`], executed
//! against the gateway by [`dispatch`] without touching the store, and
//! committed back. Every request carries the profile [`Epoch`] it was issued
//! under so responses that arrive after a profile switch are dropped.
//!
//! [`ChannelStore`]: crate::state::ChannelStore

use crate::gateway::CommandGateway;
use crate::topology::{GainRange, LineSensitivity, OutputClass, StereoPair};
use crate::level;
use rmemix_ipc::GatewayError;
use std::fmt;
use tracing::debug;

/// Profile generation counter. Bumped on every topology change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(pub u64);

impl Epoch {
    pub fn next(self) -> Self {
        Epoch(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One device-facing write.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceWrite {
    Volume { control: String, raw: i64 },
    Switch { control: String, on: bool },
    Sensitivity {
        control: String,
        value: LineSensitivity,
    },
    Gain { control: String, raw: i64 },
    ChannelConfig {
        control_name: String,
        display_name: String,
        stereo_coupled: bool,
    },
    BufferSize(u32),
}

/// A cache change applied once the device confirms a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheUpdate {
    MonitorSend { index: usize, db: StereoPair<f64> },
    HeadphonesSend { index: usize, db: StereoPair<f64> },
    Gain { index: usize, db: f64 },
    Phantom { index: usize, on: bool },
    Pad { index: usize, on: bool },
    Sensitivity {
        index: usize,
        value: LineSensitivity,
    },
    OutputLevel {
        class: OutputClass,
        db: StereoPair<f64>,
    },
    PlaybackLevel {
        class: OutputClass,
        db: StereoPair<f64>,
    },
    DisplayName { index: usize, name: String },
    StereoCoupled { index: usize, coupled: bool },
    BufferSize(u32),
}

/// A validated mutation ready to be sent to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub epoch: Epoch,
    /// Writes in issue order.
    pub writes: Vec<DeviceWrite>,
    pub updates: Vec<CacheUpdate>,
}

/// Outcome of a gateway round-trip, waiting to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub epoch: Epoch,
    pub updates: Vec<CacheUpdate>,
    pub result: Result<(), GatewayError>,
}

/// What [`commit`](crate::state::ChannelStore::commit) did with a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    DiscardedStale,
}

/// Preamp controls of one physical input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreampReads {
    pub index: usize,
    pub gain: Option<(String, GainRange)>,
    pub phantom: Option<String>,
    pub pad: Option<String>,
    pub sensitivity: Option<String>,
}

/// Reads needed to refresh one visible input channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshPlan {
    pub epoch: Epoch,
    pub index: usize,
    pub monitor: Option<StereoPair<String>>,
    pub headphones: Option<StereoPair<String>>,
    /// The channel, then its right partner when coupled.
    pub preamps: Vec<PreampReads>,
}

async fn execute<G: CommandGateway>(gateway: &G, write: &DeviceWrite) -> Result<(), GatewayError> {
    match write {
        DeviceWrite::Volume { control, raw } => gateway.set_volume(control, *raw).await,
        DeviceWrite::Switch { control, on } => gateway.set_switch_state(control, *on).await,
        DeviceWrite::Sensitivity { control, value } => {
            gateway
                .set_line_sensitivity(control, value.as_control_value())
                .await
        }
        DeviceWrite::Gain { control, raw } => gateway.set_input_gain(control, *raw).await,
        DeviceWrite::ChannelConfig {
            control_name,
            display_name,
            stereo_coupled,
        } => {
            gateway
                .persist_channel_config(control_name, display_name, *stereo_coupled)
                .await
        }
        DeviceWrite::BufferSize(frames) => gateway.set_buffer_size(*frames).await,
    }
}

/// Execute a prepared mutation.
///
/// Writes run sequentially in issue order and stop at the first failure.
pub async fn dispatch<G: CommandGateway>(gateway: &G, pending: PendingMutation) -> Completion {
    let PendingMutation {
        epoch,
        writes,
        updates,
    } = pending;

    for write in &writes {
        debug!("Epoch {}: {:?}", epoch, write);
        if let Err(e) = execute(gateway, write).await {
            return Completion {
                epoch,
                updates,
                result: Err(e),
            };
        }
    }

    Completion {
        epoch,
        updates,
        result: Ok(()),
    }
}

async fn read_send<G: CommandGateway>(
    gateway: &G,
    controls: &StereoPair<String>,
) -> Result<StereoPair<f64>, GatewayError> {
    let left = gateway.get_volume(&controls.left).await?;
    let right = gateway.get_volume(&controls.right).await?;
    Ok(StereoPair::new(level::raw_to_db(left), level::raw_to_db(right)))
}

async fn read_preamp<G: CommandGateway>(
    gateway: &G,
    reads: &PreampReads,
    updates: &mut Vec<CacheUpdate>,
) -> Result<(), GatewayError> {
    let index = reads.index;
    if let Some((control, range)) = &reads.gain {
        let raw = gateway.get_input_gain(control).await?;
        updates.push(CacheUpdate::Gain {
            index,
            db: range.raw_to_db(raw),
        });
    }
    if let Some(control) = &reads.phantom {
        let on = gateway.get_switch_state(control).await?;
        updates.push(CacheUpdate::Phantom { index, on });
    }
    if let Some(control) = &reads.pad {
        let on = gateway.get_switch_state(control).await?;
        updates.push(CacheUpdate::Pad { index, on });
    }
    if let Some(control) = &reads.sensitivity {
        let item = gateway.get_line_sensitivity(control).await?;
        let value = item
            .parse::<LineSensitivity>()
            .map_err(GatewayError::InvalidArgument)?;
        updates.push(CacheUpdate::Sensitivity { index, value });
    }
    Ok(())
}

async fn read_input<G: CommandGateway>(
    gateway: &G,
    plan: &RefreshPlan,
    updates: &mut Vec<CacheUpdate>,
) -> Result<(), GatewayError> {
    let index = plan.index;
    if let Some(controls) = &plan.monitor {
        let db = read_send(gateway, controls).await?;
        updates.push(CacheUpdate::MonitorSend { index, db });
    }
    if let Some(controls) = &plan.headphones {
        let db = read_send(gateway, controls).await?;
        updates.push(CacheUpdate::HeadphonesSend { index, db });
    }
    for reads in &plan.preamps {
        read_preamp(gateway, reads, updates).await?;
    }
    Ok(())
}

/// Re-query one input channel.
///
/// On failure nothing read so far is applied.
pub async fn fetch<G: CommandGateway>(gateway: &G, plan: RefreshPlan) -> Completion {
    let mut updates = Vec::new();
    let result = read_input(gateway, &plan, &mut updates).await;
    if result.is_err() {
        updates.clear();
    }
    Completion {
        epoch: plan.epoch,
        updates,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::FakeGateway;

    fn volume(control: &str, raw: i64) -> DeviceWrite {
        DeviceWrite::Volume {
            control: control.to_string(),
            raw,
        }
    }

    #[tokio::test]
    async fn test_dispatch_in_order() {
        let gateway = FakeGateway::new(&["pro-audio"], "pro-audio");
        let pending = PendingMutation {
            epoch: Epoch(3),
            writes: vec![volume("Mic-AN1-AN1", 100), volume("Mic-AN1-AN1", 200)],
            updates: vec![CacheUpdate::BufferSize(64)],
        };

        let completion = dispatch(&gateway, pending).await;
        assert_eq!(completion.epoch, Epoch(3));
        assert_eq!(completion.result, Ok(()));
        assert_eq!(completion.updates, vec![CacheUpdate::BufferSize(64)]);
        assert_eq!(
            gateway.calls(),
            vec!["set_volume Mic-AN1-AN1 100", "set_volume Mic-AN1-AN1 200"]
        );
        assert_eq!(gateway.volume("Mic-AN1-AN1"), Some(200));
    }

    #[tokio::test]
    async fn test_dispatch_stops_at_failure() {
        let gateway = FakeGateway::new(&["pro-audio"], "pro-audio");
        gateway.fail("set_switch_state");
        let pending = PendingMutation {
            epoch: Epoch(1),
            writes: vec![
                DeviceWrite::Switch {
                    control: "Mic-AN1 48V".to_string(),
                    on: true,
                },
                volume("Mic-AN1-AN1", 1),
            ],
            updates: vec![],
        };

        let completion = dispatch(&gateway, pending).await;
        assert!(matches!(completion.result, Err(GatewayError::ToolFailed(_))));
        assert!(gateway.calls_to("set_volume").is_empty());
    }

    #[tokio::test]
    async fn test_fetch_discards_partial_reads() {
        let gateway = FakeGateway::new(&["pro-audio"], "pro-audio");
        gateway.put_volume("Mic-AN1-AN1", 32768);
        gateway.put_volume("Mic-AN1-AN2", 32768);

        let plan = RefreshPlan {
            epoch: Epoch(2),
            index: 0,
            monitor: Some(StereoPair::new(
                "Mic-AN1-AN1".to_string(),
                "Mic-AN1-AN2".to_string(),
            )),
            headphones: None,
            preamps: vec![PreampReads {
                index: 0,
                phantom: Some("Mic-AN1 48V".to_string()),
                ..Default::default()
            }],
        };

        // The phantom switch is unknown to the fake
        let completion = fetch(&gateway, plan.clone()).await;
        assert!(completion.result.is_err());
        assert!(completion.updates.is_empty());

        gateway.put_switch("Mic-AN1 48V", true);
        let completion = fetch(&gateway, plan).await;
        assert_eq!(completion.result, Ok(()));
        assert_eq!(
            completion.updates,
            vec![
                CacheUpdate::MonitorSend {
                    index: 0,
                    db: StereoPair::both(0.0)
                },
                CacheUpdate::Phantom { index: 0, on: true },
            ]
        );
    }

    #[test]
    fn test_epoch_next() {
        assert_eq!(Epoch(1).next(), Epoch(2));
        assert_eq!(Epoch(u64::MAX).next(), Epoch(0));
        assert!(Epoch(1) < Epoch(2));
    }
}
