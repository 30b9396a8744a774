//! In-memory gateway for tests and for running without a real interlock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use super::{channels, ChannelValue, GatewayError, GatewayResult, TelescopeGateway};
use crate::models::Coordinates;

#[derive(Debug, Default)]
struct SimState {
    address: Option<String>,
    channels: HashMap<String, ChannelValue>,
    laser_open: bool,
    loops_open: bool,
    heartbeats: u64,
    shutter_commands: u64,
    forced_shutters: u64,
    last_update: Option<DateTime<Utc>>,
    /// Refresh `last_update` on every read, like a tracking telescope.
    live_telescope: bool,
    /// Every call fails while set.
    failure: Option<String>,
    latency: Duration,
    /// Extra time each heartbeat update takes.
    heartbeat_latency: Duration,
    heartbeats_in_flight: u32,
    max_heartbeats_in_flight: u32,
}

/// Gateway backed by a channel map.
///
/// Pointing and shutter state are set directly by the test or operator;
/// commands update the same state the reads observe.
#[derive(Debug, Clone, Default)]
pub struct SimulatedGateway {
    state: Arc<RwLock<SimState>>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway that is already connected and has just heard from the telescope.
    pub fn connected() -> Self {
        let gateway = Self::new();
        {
            let mut state = gateway.state.write();
            state.address = Some("simulated".to_string());
            state.last_update = Some(Utc::now());
        }
        gateway
    }

    /// Move the simulated telescope. Counts as an update from the telescope.
    pub fn set_pointing(&self, coordinates: Coordinates) {
        let mut state = self.state.write();
        let (first, second) = coordinates.axes();
        let (a, b) = match coordinates {
            Coordinates::RaDec { .. } => (channels::TELESCOPE_RA, channels::TELESCOPE_DEC),
            Coordinates::AzEl { .. } => (channels::TELESCOPE_AZ, channels::TELESCOPE_EL),
        };
        state.channels.insert(a.to_string(), ChannelValue::Double(first));
        state.channels.insert(b.to_string(), ChannelValue::Double(second));
        state.last_update = Some(Utc::now());
    }

    pub fn set_laser_open(&self, open: bool) {
        self.state.write().laser_open = open;
    }

    pub fn set_last_update(&self, at: Option<DateTime<Utc>>) {
        self.state.write().last_update = at;
    }

    /// When enabled, every channel read counts as an update from the telescope.
    pub fn set_live_telescope(&self, live: bool) {
        self.state.write().live_telescope = live;
    }

    /// Make every subsequent call fail with `reason`, or succeed again with `None`.
    pub fn set_failure(&self, reason: Option<&str>) {
        self.state.write().failure = reason.map(str::to_string);
    }

    /// Delay every async call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.write().latency = latency;
    }

    /// Hold every heartbeat update open for `latency` after it starts.
    pub fn set_heartbeat_latency(&self, latency: Duration) {
        self.state.write().heartbeat_latency = latency;
    }

    /// Most heartbeat updates ever in progress at the same time.
    pub fn max_heartbeats_in_flight(&self) -> u32 {
        self.state.read().max_heartbeats_in_flight
    }

    pub fn is_laser_open(&self) -> bool {
        self.state.read().laser_open
    }

    pub fn loops_open(&self) -> bool {
        self.state.read().loops_open
    }

    pub fn heartbeat_count(&self) -> u64 {
        self.state.read().heartbeats
    }

    pub fn shutter_count(&self) -> u64 {
        self.state.read().shutter_commands
    }

    pub fn forced_shutter_count(&self) -> u64 {
        self.state.read().forced_shutters
    }

    /// Apply latency, then check the injected failure and the connection.
    async fn enter(&self, operation: &'static str) -> GatewayResult<()> {
        let latency = self.state.read().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let state = self.state.read();
        if let Some(reason) = &state.failure {
            return Err(GatewayError::Command {
                command: operation,
                reason: reason.clone(),
            });
        }
        if state.address.is_none() {
            return Err(GatewayError::NotConnected);
        }
        Ok(())
    }
}

/// Ends one in-progress heartbeat, also when the update is dropped mid-way.
struct HeartbeatInFlight<'a>(&'a RwLock<SimState>);

impl Drop for HeartbeatInFlight<'_> {
    fn drop(&mut self) {
        self.0.write().heartbeats_in_flight -= 1;
    }
}

#[async_trait]
impl TelescopeGateway for SimulatedGateway {
    async fn connect(&self, address: &str) -> GatewayResult<()> {
        let failure = self.state.read().failure.clone();
        if let Some(reason) = failure {
            return Err(GatewayError::Connect {
                address: address.to_string(),
                reason,
            });
        }
        let mut state = self.state.write();
        state.address = Some(address.to_string());
        state.last_update = Some(Utc::now());
        debug!(address, "Simulated gateway connected");
        Ok(())
    }

    async fn disconnect(&self) -> GatewayResult<()> {
        self.state.write().address = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.read().address.is_some()
    }

    fn uses_simulated_telescope(&self) -> bool {
        true
    }

    fn last_update(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_update
    }

    async fn read_channel(&self, name: &str) -> GatewayResult<ChannelValue> {
        self.enter("read_channel").await?;
        let mut state = self.state.write();
        if state.live_telescope {
            state.last_update = Some(Utc::now());
        }
        match name {
            channels::LASER_SHUTTER_OPEN => Ok(ChannelValue::Bool(state.laser_open)),
            channels::LOOPS_OPEN => Ok(ChannelValue::Bool(state.loops_open)),
            channels::HEARTBEAT => Ok(ChannelValue::Int(state.heartbeats as i64)),
            _ => state
                .channels
                .get(name)
                .cloned()
                .ok_or_else(|| GatewayError::Channel {
                    channel: name.to_string(),
                    reason: "no such channel".to_string(),
                }),
        }
    }

    async fn write_channel(&self, name: &str, value: ChannelValue) -> GatewayResult<()> {
        self.enter("write_channel").await?;
        self.state.write().channels.insert(name.to_string(), value);
        Ok(())
    }

    async fn open_loops(&self) -> GatewayResult<()> {
        self.enter("open_loops").await?;
        self.state.write().loops_open = true;
        Ok(())
    }

    async fn shutter_laser(&self) -> GatewayResult<()> {
        self.enter("shutter_laser").await?;
        let mut state = self.state.write();
        state.laser_open = false;
        state.shutter_commands += 1;
        Ok(())
    }

    async fn force_shutter(&self) -> GatewayResult<()> {
        self.enter("force_shutter").await?;
        let mut state = self.state.write();
        state.laser_open = false;
        state.forced_shutters += 1;
        Ok(())
    }

    async fn update_heartbeat(&self) -> GatewayResult<()> {
        self.enter("update_heartbeat").await?;
        let latency = {
            let mut state = self.state.write();
            state.heartbeats_in_flight += 1;
            state.max_heartbeats_in_flight =
                state.max_heartbeats_in_flight.max(state.heartbeats_in_flight);
            state.heartbeat_latency
        };
        let _in_flight = HeartbeatInFlight(&self.state);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.state.write().heartbeats += 1;
        Ok(())
    }
}
