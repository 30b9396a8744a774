//! Telescope-control gateway.
//!
//! The gateway is the only path to the telescope control system and to the
//! laser interlock. Readings come back as typed channel values; commands are
//! idempotent, so the decision loop may repeat them every cycle.

pub mod simulated;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use simulated::SimulatedGateway;

/// Well-known channel names.
pub mod channels {
    /// Current telescope right ascension, degrees.
    pub const TELESCOPE_RA: &str = "tcs:currentRa";
    /// Current telescope declination, degrees.
    pub const TELESCOPE_DEC: &str = "tcs:currentDec";
    /// Current telescope azimuth, degrees.
    pub const TELESCOPE_AZ: &str = "tcs:currentAz";
    /// Current telescope elevation, degrees.
    pub const TELESCOPE_EL: &str = "tcs:currentEl";
    /// True while the laser shutter is open.
    pub const LASER_SHUTTER_OPEN: &str = "lis:shutterOpen";
    /// Heartbeat counter watched by the interlock.
    pub const HEARTBEAT: &str = "lis:heartbeat";
    /// True while the adaptive-optics loops are open.
    pub const LOOPS_OPEN: &str = "ao:loopsOpen";
}

/// Value carried by one gateway channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ChannelValue {
    Double(f64),
    Int(i64),
    Text(String),
    Bool(bool),
}

impl ChannelValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ChannelValue::Double(v) => Some(*v),
            ChannelValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ChannelValue::Bool(v) => Some(*v),
            ChannelValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }
}

/// Gateway failures. All of them are transport-class: the caller marks its
/// reading stale and retries on the next cycle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway is not connected")]
    NotConnected,

    #[error("Gateway {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Channel '{channel}': {reason}")]
    Channel { channel: String, reason: String },

    #[error("Command {command} failed: {reason}")]
    Command {
        command: &'static str,
        reason: String,
    },

    #[error("Cannot connect to {address}: {reason}")]
    Connect { address: String, reason: String },
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Abstract telescope-control gateway.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; the heartbeat, poll and decision
/// tasks share one instance.
#[async_trait]
pub trait TelescopeGateway: Send + Sync {
    async fn connect(&self, address: &str) -> GatewayResult<()>;

    async fn disconnect(&self) -> GatewayResult<()>;

    fn is_connected(&self) -> bool;

    fn uses_simulated_telescope(&self) -> bool;

    /// Last time the gateway heard from the telescope control system.
    fn last_update(&self) -> Option<DateTime<Utc>>;

    async fn read_channel(&self, name: &str) -> GatewayResult<ChannelValue>;

    async fn write_channel(&self, name: &str, value: ChannelValue) -> GatewayResult<()>;

    async fn open_loops(&self) -> GatewayResult<()>;

    async fn shutter_laser(&self) -> GatewayResult<()>;

    /// Shutter regardless of interlock overrides.
    async fn force_shutter(&self) -> GatewayResult<()>;

    async fn update_heartbeat(&self) -> GatewayResult<()>;
}

/// Run one gateway call under a deadline.
pub async fn with_timeout<T, F>(operation: &'static str, after: Duration, call: F) -> GatewayResult<T>
where
    F: Future<Output = GatewayResult<T>>,
{
    tokio::time::timeout(after, call)
        .await
        .map_err(|_| GatewayError::Timeout { operation, after })?
}

/// Read a numeric channel.
pub async fn read_f64(gateway: &dyn TelescopeGateway, name: &str) -> GatewayResult<f64> {
    let value = gateway.read_channel(name).await?;
    value.as_f64().ok_or_else(|| GatewayError::Channel {
        channel: name.to_string(),
        reason: format!("expected a number, got {:?}", value),
    })
}

/// Read a boolean channel.
pub async fn read_bool(gateway: &dyn TelescopeGateway, name: &str) -> GatewayResult<bool> {
    let value = gateway.read_channel(name).await?;
    value.as_bool().ok_or_else(|| GatewayError::Channel {
        channel: name.to_string(),
        reason: format!("expected a boolean, got {:?}", value),
    })
}
