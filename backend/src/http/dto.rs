//! Data Transfer Objects for the HTTP API.
//!
//! Domain types that already derive Serialize/Deserialize (verdicts, alerts,
//! windows, collisions) are embedded directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    ClearanceWindow, Collision, LaserTarget, LaserTargetId, Night, NightId, PropagationWindow,
    ShutteringWindow,
};
use crate::services::{Alert, SafetySnapshot, Verdict};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the service
    pub status: String,
    /// Version of the API
    pub version: String,
    /// Entity store status
    pub repository: String,
    /// Telescope gateway status as last polled
    pub gateway: String,
}

/// Age of each decision input at the last evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputAges {
    pub target_ms: Option<i64>,
    pub gateway_ms: Option<i64>,
    pub collisions_ms: Option<i64>,
    pub heartbeat_ms: Option<i64>,
}

impl InputAges {
    pub fn from_snapshot(snapshot: &SafetySnapshot) -> Self {
        let now = snapshot.taken_at;
        Self {
            target_ms: snapshot.target.as_ref().map(|s| s.age(now).num_milliseconds()),
            gateway_ms: snapshot.gateway.as_ref().map(|s| s.age(now).num_milliseconds()),
            collisions_ms: snapshot
                .collisions
                .as_ref()
                .map(|s| s.age(now).num_milliseconds()),
            heartbeat_ms: snapshot
                .heartbeat
                .as_ref()
                .map(|s| s.age(now).num_milliseconds()),
        }
    }
}

/// GET /v1/status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub night: Option<Night>,
    pub selected_target: Option<LaserTargetId>,
    pub auto_shutter: bool,
    /// Missing until the first decision cycle has run.
    pub verdict: Option<Verdict>,
    pub evaluated_at: Option<DateTime<Utc>>,
    pub input_ages: InputAges,
    pub laser_open: Option<bool>,
}

/// GET /v1/collisions response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollisionsResponse {
    pub active: Vec<Collision>,
    pub preview: Vec<Collision>,
    /// When the table was fetched. Missing if no poll succeeded yet.
    pub fetched_at: Option<DateTime<Utc>>,
    pub stale: bool,
}

/// Query parameters for the alerts endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsResponse {
    pub alerts: Vec<Alert>,
    pub total: usize,
}

/// Query parameters for the event stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsQuery {
    /// Replay logged events newer than this sequence number first
    #[serde(default)]
    pub since: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AutoShutterRequest {
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AutoShutterResponse {
    pub enabled: bool,
}

/// PUT /v1/selection body.
///
/// A night other than the monitored one restarts the monitor on that night.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionRequest {
    #[serde(default)]
    pub night_id: Option<NightId>,
    #[serde(default)]
    pub target_id: Option<LaserTargetId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResponse {
    pub night_id: NightId,
    pub target: Option<LaserTarget>,
}

/// Windows of one laser target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowsResponse {
    pub night_id: NightId,
    pub target_id: LaserTargetId,
    pub propagation: Vec<PropagationWindow>,
    pub shuttering: Vec<ShutteringWindow>,
    /// Propagation time left after blanket closures.
    pub clearance: Vec<ClearanceWindow>,
}
