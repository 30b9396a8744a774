//! Latest-value board shared by the periodic producers and the decision loop.
//!
//! Each producer (heartbeat, gateway poll, collision feed poll, target
//! loader) publishes its most recent value here. The decision loop reads all
//! of them under one lock, so it never sees a partially updated set.
//!
//! Published values are stamped. A value with an older stamp than the one on
//! the board is ignored, so stamps seen by readers never go backwards. A
//! failed poll leaves the previous value in place and flags it stale.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::models::{BlanketClosure, Coordinates, Frame, LaserTarget, Night};
use crate::parsing::CollisionFeed;

/// A value tagged with the instant it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamped<T> {
    pub value: T,
    pub stamp: DateTime<Utc>,
    /// Set when the latest refresh attempt failed.
    pub stale: bool,
}

impl<T> Stamped<T> {
    pub fn fresh(value: T, stamp: DateTime<Utc>) -> Self {
        Self {
            value,
            stamp,
            stale: false,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.stamp
    }

    /// Not flagged stale and no older than `max_age`.
    pub fn is_usable(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        !self.stale && self.age(now) <= max_age
    }
}

/// One poll of the telescope-control gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayReading {
    pub connected: bool,
    pub simulated: bool,
    /// Last time the gateway heard from the telescope control system.
    pub last_update: Option<DateTime<Utc>>,
    pub pointing_ra_dec: Option<Coordinates>,
    pub pointing_az_el: Option<Coordinates>,
    pub laser_open: Option<bool>,
}

impl GatewayReading {
    pub fn pointing_in(&self, frame: Frame) -> Option<Coordinates> {
        match frame {
            Frame::RaDec => self.pointing_ra_dec,
            Frame::AzEl => self.pointing_az_el,
        }
    }
}

/// Propagation data of the laser target under monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetData {
    pub target: LaserTarget,
    /// Blanket closures overlapping the night.
    pub closures: Vec<BlanketClosure>,
}

/// Everything on the board at one instant.
#[derive(Debug, Clone, Default)]
pub struct LiveValues {
    pub night: Option<Night>,
    pub target: Option<Stamped<TargetData>>,
    pub gateway: Option<Stamped<GatewayReading>>,
    pub collisions: Option<Stamped<CollisionFeed>>,
    /// Count of successful heartbeats, stamped with the latest one.
    pub heartbeat: Option<Stamped<u64>>,
}

/// Replace `slot` unless it already holds a newer value.
fn publish<T>(slot: &mut Option<Stamped<T>>, value: T, stamp: DateTime<Utc>) -> bool {
    if slot.as_ref().is_some_and(|current| current.stamp > stamp) {
        return false;
    }
    *slot = Some(Stamped::fresh(value, stamp));
    true
}

fn mark_stale<T>(slot: &mut Option<Stamped<T>>) {
    if let Some(current) = slot.as_mut() {
        current.stale = true;
    }
}

/// Shared handle to the live values. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct LiveBoard {
    values: Arc<RwLock<LiveValues>>,
}

impl LiveBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent copy of every value.
    pub fn read(&self) -> LiveValues {
        self.values.read().clone()
    }

    /// Switch to a new night. Target data from the previous night is dropped.
    pub fn set_night(&self, night: Option<Night>) {
        let mut values = self.values.write();
        values.night = night;
        values.target = None;
    }

    pub fn night(&self) -> Option<Night> {
        self.values.read().night.clone()
    }

    pub fn publish_target(&self, data: TargetData, stamp: DateTime<Utc>) -> bool {
        publish(&mut self.values.write().target, data, stamp)
    }

    pub fn clear_target(&self) {
        self.values.write().target = None;
    }

    pub fn mark_target_stale(&self) {
        mark_stale(&mut self.values.write().target);
    }

    pub fn publish_gateway(&self, reading: GatewayReading, stamp: DateTime<Utc>) -> bool {
        publish(&mut self.values.write().gateway, reading, stamp)
    }

    pub fn mark_gateway_stale(&self) {
        mark_stale(&mut self.values.write().gateway);
    }

    pub fn publish_collisions(&self, feed: CollisionFeed, stamp: DateTime<Utc>) -> bool {
        publish(&mut self.values.write().collisions, feed, stamp)
    }

    pub fn mark_collisions_stale(&self) {
        mark_stale(&mut self.values.write().collisions);
    }

    pub fn collisions(&self) -> Option<Stamped<CollisionFeed>> {
        self.values.read().collisions.clone()
    }

    /// Count one more successful heartbeat.
    pub fn record_heartbeat(&self, stamp: DateTime<Utc>) -> bool {
        let mut values = self.values.write();
        let count = values.heartbeat.as_ref().map_or(0, |h| h.value) + 1;
        publish(&mut values.heartbeat, count, stamp)
    }

    pub fn mark_heartbeat_stale(&self) {
        mark_stale(&mut self.values.write().heartbeat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 2, minute, 0).unwrap()
    }

    #[test]
    fn test_older_stamp_is_ignored() {
        let board = LiveBoard::new();
        assert!(board.publish_collisions(CollisionFeed::default(), t(5)));
        assert!(!board.publish_collisions(CollisionFeed::default(), t(4)));
        assert_eq!(board.collisions().unwrap().stamp, t(5));
    }

    #[test]
    fn test_stale_flag_cleared_by_next_publish() {
        let board = LiveBoard::new();
        board.publish_collisions(CollisionFeed::default(), t(1));
        board.mark_collisions_stale();
        let stale = board.collisions().unwrap();
        assert!(stale.stale);
        assert_eq!(stale.stamp, t(1));

        board.publish_collisions(CollisionFeed::default(), t(2));
        assert!(!board.collisions().unwrap().stale);
    }

    #[test]
    fn test_mark_stale_on_empty_slot_is_noop() {
        let board = LiveBoard::new();
        board.mark_gateway_stale();
        assert!(board.read().gateway.is_none());
    }

    #[test]
    fn test_heartbeat_counts_up() {
        let board = LiveBoard::new();
        board.record_heartbeat(t(1));
        board.record_heartbeat(t(2));
        let heartbeat = board.read().heartbeat.unwrap();
        assert_eq!(heartbeat.value, 2);
        assert_eq!(heartbeat.stamp, t(2));
    }

    #[test]
    fn test_usable_respects_age_and_flag() {
        let mut value = Stamped::fresh((), t(0));
        assert!(value.is_usable(t(2), Duration::minutes(2)));
        assert!(!value.is_usable(t(3), Duration::minutes(2)));
        value.stale = true;
        assert!(!value.is_usable(t(0), Duration::minutes(2)));
    }
}
