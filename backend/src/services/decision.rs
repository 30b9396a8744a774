//! Propagate/shutter verdict for one snapshot.
//!
//! Propagation is allowed only when every condition holds:
//!
//! 1. now is inside a propagation window of the selected target
//! 2. now is outside every shuttering window (gap or blanket closure)
//! 3. the telescope points within the error cone of the target
//! 4. no collision from a fresh feed covers now
//! 5. the gateway is connected, its readings are fresh and the heartbeat is alive
//!
//! Missing or stale inputs fail their condition. The verdict lists every
//! failing condition, in the order above.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::live::TargetData;
use super::snapshot::{SafetyLimits, SafetySnapshot};
use crate::algorithms::geometry::angular_separation_deg;
use crate::algorithms::{shuttering_windows, subtract_closures};
use crate::models::{
    BlanketClosure, Collision, Interval, LaserTargetId, NightId, ShutteringKind, TimeWindow,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictState {
    Propagate,
    Shutter,
}

/// One failing condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ShutterReason {
    NoNight,
    NoTargetSelected,
    PropagationDataStale,
    NoPropagationWindows,
    OutsidePropagationWindow,
    InShutteringWindow {
        kind: ShutteringKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    PointingUnknown,
    OutsideErrorCone {
        separation_arcsec: f64,
    },
    CollisionFeedMissing,
    CollisionFeedStale,
    CollisionActive {
        observatory: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    GatewayDisconnected,
    GatewayReadingStale,
    TelescopeUpdateStale,
    HeartbeatStale,
}

impl ShutterReason {
    /// Stable identifier, independent of the payload.
    pub fn code(&self) -> &'static str {
        match self {
            ShutterReason::NoNight => "no_night",
            ShutterReason::NoTargetSelected => "no_target_selected",
            ShutterReason::PropagationDataStale => "propagation_data_stale",
            ShutterReason::NoPropagationWindows => "no_propagation_windows",
            ShutterReason::OutsidePropagationWindow => "outside_propagation_window",
            ShutterReason::InShutteringWindow { .. } => "in_shuttering_window",
            ShutterReason::PointingUnknown => "pointing_unknown",
            ShutterReason::OutsideErrorCone { .. } => "outside_error_cone",
            ShutterReason::CollisionFeedMissing => "collision_feed_missing",
            ShutterReason::CollisionFeedStale => "collision_feed_stale",
            ShutterReason::CollisionActive { .. } => "collision_active",
            ShutterReason::GatewayDisconnected => "gateway_disconnected",
            ShutterReason::GatewayReadingStale => "gateway_reading_stale",
            ShutterReason::TelescopeUpdateStale => "telescope_update_stale",
            ShutterReason::HeartbeatStale => "heartbeat_stale",
        }
    }

    /// A producer stopped delivering fresh data.
    pub fn is_stale_producer(&self) -> bool {
        matches!(
            self,
            ShutterReason::PropagationDataStale
                | ShutterReason::CollisionFeedMissing
                | ShutterReason::CollisionFeedStale
                | ShutterReason::GatewayDisconnected
                | ShutterReason::GatewayReadingStale
                | ShutterReason::TelescopeUpdateStale
                | ShutterReason::HeartbeatStale
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub state: VerdictState,
    pub reasons: Vec<ShutterReason>,
    pub evaluated_at: DateTime<Utc>,
    pub night: Option<NightId>,
    pub target: Option<LaserTargetId>,
    /// Next scheduled change: end of the current clearance while
    /// propagating, start of the next clearance while shuttered.
    pub next_transition: Option<DateTime<Utc>>,
}

impl Verdict {
    pub fn is_propagate(&self) -> bool {
        self.state == VerdictState::Propagate
    }

    /// Same state and same failing conditions, ignoring payload values.
    pub fn same_outcome(&self, other: &Verdict) -> bool {
        self.state == other.state
            && self.reasons.len() == other.reasons.len()
            && self
                .reasons
                .iter()
                .zip(&other.reasons)
                .all(|(a, b)| a.code() == b.code())
    }
}

/// Windows of the selected target with margins applied.
struct Timeline {
    propagation: Vec<Interval>,
    shuttering: Vec<(ShutteringKind, Interval)>,
    collisions: Vec<(String, Interval)>,
}

impl Timeline {
    fn build(data: &TargetData, collisions: &[Collision], limits: &SafetyLimits) -> Self {
        let (pre, post) = (limits.pre_margin(), limits.post_margin());
        let propagation = data
            .target
            .propagation_windows
            .iter()
            .filter_map(|w| w.interval().shrink(post, pre))
            .collect();
        let shuttering = shuttering_windows(&data.target.propagation_windows, &data.closures)
            .iter()
            .map(|w| (w.kind, w.interval().widen(pre, post)))
            .collect();
        let collisions = collisions
            .iter()
            .map(|c| (c.observatory.clone(), c.interval().widen(pre, post)))
            .collect();
        Self {
            propagation,
            shuttering,
            collisions,
        }
    }

    /// Propagation time left after removing shuttering windows and collisions.
    fn clearances(&self) -> Vec<Interval> {
        let blocked: Vec<BlanketClosure> = self
            .shuttering
            .iter()
            .map(|(_, i)| *i)
            .chain(self.collisions.iter().map(|(_, i)| *i))
            .map(BlanketClosure::from)
            .collect();
        subtract_closures(&self.propagation, &blocked)
    }
}

/// Compute the verdict for `now` from one snapshot.
pub fn evaluate(snapshot: &SafetySnapshot, now: DateTime<Utc>) -> Verdict {
    let limits = &snapshot.limits;
    let mut reasons = Vec::new();

    let feed = snapshot.collisions.as_ref();
    let known_collisions: &[Collision] = feed
        .map(|f| f.value.active.as_slice())
        .unwrap_or_default();

    // Conditions 1 and 2: time windows.
    let target = match (&snapshot.night, &snapshot.target) {
        (None, _) => {
            reasons.push(ShutterReason::NoNight);
            None
        }
        (Some(_), None) => {
            reasons.push(ShutterReason::NoTargetSelected);
            None
        }
        (Some(_), Some(data)) if !data.is_usable(now, limits.max_target_age()) => {
            reasons.push(ShutterReason::PropagationDataStale);
            None
        }
        (Some(_), Some(data)) => Some(&data.value),
    };
    let timeline = target.map(|data| Timeline::build(data, known_collisions, limits));

    if let (Some(data), Some(timeline)) = (target, &timeline) {
        if data.target.propagation_windows.is_empty() {
            reasons.push(ShutterReason::NoPropagationWindows);
        } else if !timeline.propagation.iter().any(|w| w.contains(now)) {
            reasons.push(ShutterReason::OutsidePropagationWindow);
        }
        if let Some((kind, window)) = timeline.shuttering.iter().find(|(_, w)| w.contains(now)) {
            reasons.push(ShutterReason::InShutteringWindow {
                kind: *kind,
                start: window.start,
                end: window.end,
            });
        }
    }

    // Condition 3: pointing.
    if let Some(data) = target {
        let frame = data.target.coordinates.frame();
        let pointing = snapshot
            .gateway
            .as_ref()
            .filter(|g| g.is_usable(now, limits.max_gateway_age()))
            .and_then(|g| g.value.pointing_in(frame));
        match pointing {
            None => reasons.push(ShutterReason::PointingUnknown),
            Some(actual) => {
                let separation_arcsec =
                    angular_separation_deg(actual.axes(), data.target.coordinates.axes()) * 3600.0;
                // Written so that NaN fails.
                if !(separation_arcsec <= limits.error_cone_arcsec) {
                    reasons.push(ShutterReason::OutsideErrorCone { separation_arcsec });
                }
            }
        }
    }

    // Condition 4: collisions.
    match feed {
        None => reasons.push(ShutterReason::CollisionFeedMissing),
        Some(f) if !f.is_usable(now, limits.max_feed_age()) => {
            reasons.push(ShutterReason::CollisionFeedStale)
        }
        Some(_) => {}
    }
    let (pre, post) = (limits.pre_margin(), limits.post_margin());
    for collision in known_collisions {
        if collision.interval().widen(pre, post).contains(now) {
            reasons.push(ShutterReason::CollisionActive {
                observatory: collision.observatory.clone(),
                start: collision.start,
                end: collision.end,
            });
        }
    }

    // Condition 5: gateway health.
    let max_gateway_age = limits.max_gateway_age();
    match &snapshot.gateway {
        Some(reading) if reading.value.connected => {
            if !reading.is_usable(now, max_gateway_age) {
                reasons.push(ShutterReason::GatewayReadingStale);
            }
            let telescope_fresh = reading
                .value
                .last_update
                .is_some_and(|at| now - at <= max_gateway_age);
            if !telescope_fresh {
                reasons.push(ShutterReason::TelescopeUpdateStale);
            }
        }
        _ => reasons.push(ShutterReason::GatewayDisconnected),
    }
    let heartbeat_alive = snapshot
        .heartbeat
        .as_ref()
        .is_some_and(|h| h.is_usable(now, max_gateway_age));
    if !heartbeat_alive {
        reasons.push(ShutterReason::HeartbeatStale);
    }

    let state = if reasons.is_empty() {
        VerdictState::Propagate
    } else {
        VerdictState::Shutter
    };

    let next_transition = timeline.and_then(|timeline| {
        let clearances = timeline.clearances();
        match state {
            VerdictState::Propagate => clearances.iter().find(|c| c.contains(now)).map(|c| c.end),
            VerdictState::Shutter => clearances.iter().find(|c| c.start > now).map(|c| c.start),
        }
    });

    Verdict {
        state,
        reasons,
        evaluated_at: now,
        night: snapshot.night_id(),
        target: snapshot.target_id(),
        next_transition,
    }
}

#[cfg(test)]
#[path = "decision_tests.rs"]
mod tests;
