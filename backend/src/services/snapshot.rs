//! Point-in-time view of every input to the safety decision.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::live::{GatewayReading, LiveBoard, Stamped, TargetData};
use crate::config::LgsConfig;
use crate::models::{LaserTargetId, Night, NightId};
use crate::parsing::CollisionFeed;

/// Configured bounds the verdict is computed against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    pub error_cone_arcsec: f64,
    pub pre_margin_secs: i64,
    pub post_margin_secs: i64,
    /// Oldest acceptable gateway reading, telescope update or heartbeat.
    pub max_gateway_age_ms: i64,
    /// Oldest acceptable collision table.
    pub max_feed_age_secs: i64,
    /// Stored propagation data older than this is treated as missing.
    pub max_target_age_secs: i64,
}

impl SafetyLimits {
    pub fn from_config(config: &LgsConfig) -> Self {
        Self {
            error_cone_arcsec: config.safety.error_cone_arcsec,
            pre_margin_secs: config.safety.pre_margin_secs,
            post_margin_secs: config.safety.post_margin_secs,
            max_gateway_age_ms: config.gateway.max_update_age_ms as i64,
            max_feed_age_secs: config.collision_feed.max_age_secs as i64,
            // Reloaded every decision cycle; allow a handful of missed reloads.
            max_target_age_secs: (config.safety.decision_period_ms as i64 * 10 / 1000).max(10),
        }
    }

    pub fn pre_margin(&self) -> Duration {
        Duration::seconds(self.pre_margin_secs)
    }

    pub fn post_margin(&self) -> Duration {
        Duration::seconds(self.post_margin_secs)
    }

    pub fn max_gateway_age(&self) -> Duration {
        Duration::milliseconds(self.max_gateway_age_ms)
    }

    pub fn max_feed_age(&self) -> Duration {
        Duration::seconds(self.max_feed_age_secs)
    }

    pub fn max_target_age(&self) -> Duration {
        Duration::seconds(self.max_target_age_secs)
    }
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self::from_config(&LgsConfig::default())
    }
}

/// Every input to one verdict, captured in a single read of the live board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetySnapshot {
    pub taken_at: DateTime<Utc>,
    pub night: Option<Night>,
    pub target: Option<Stamped<TargetData>>,
    pub gateway: Option<Stamped<GatewayReading>>,
    pub collisions: Option<Stamped<CollisionFeed>>,
    pub heartbeat: Option<Stamped<u64>>,
    pub limits: SafetyLimits,
    pub auto_shutter: bool,
}

impl SafetySnapshot {
    pub fn night_id(&self) -> Option<NightId> {
        self.night.as_ref().map(|n| n.id)
    }

    pub fn target_id(&self) -> Option<LaserTargetId> {
        self.target.as_ref().map(|t| t.value.target.id)
    }
}

/// Capture the board as it is now.
pub fn capture_snapshot(
    board: &LiveBoard,
    taken_at: DateTime<Utc>,
    limits: SafetyLimits,
    auto_shutter: bool,
) -> SafetySnapshot {
    let values = board.read();
    SafetySnapshot {
        taken_at,
        night: values.night,
        target: values.target,
        gateway: values.gateway,
        collisions: values.collisions,
        heartbeat: values.heartbeat,
        limits,
        auto_shutter,
    }
}

/// Whether the monitored night or laser target differs from the previous
/// snapshot. Routine refreshes of the same pair are not a change.
pub fn target_changed(previous: Option<&SafetySnapshot>, current: &SafetySnapshot) -> bool {
    match previous {
        None => true,
        Some(previous) => {
            previous.night_id() != current.night_id() || previous.target_id() != current.target_id()
        }
    }
}
