//! Laser-traffic collisions reported by the peer-coordination service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::interval::{Interval, TimeWindow};

/// One reported beam collision with another observatory.
///
/// Collisions are transient: the whole table is replaced on every feed poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collision {
    /// Site tag of the record, as sent by the feed.
    #[serde(default)]
    pub site: String,
    pub observatory: String,
    pub priority: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Collision {
    pub fn is_active_at(&self, t: DateTime<Utc>) -> bool {
        self.interval().contains(t)
    }
}

impl TimeWindow for Collision {
    fn interval(&self) -> Interval {
        Interval::new_unchecked(self.start, self.end)
    }

    fn with_interval(&self, interval: Interval) -> Self {
        Self {
            start: interval.start,
            end: interval.end,
            ..self.clone()
        }
    }
}
