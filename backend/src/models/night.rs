//! Observing nights.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::interval::Interval;

crate::define_id_type!(i64, NightId);

/// One observing night at one site.
///
/// Everything created for the night (laser targets, observations) belongs to
/// it. Only the two message timestamps change after the night is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Night {
    pub id: NightId,
    pub site: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub latest_prediction_sent: Option<DateTime<Utc>>,
    #[serde(default)]
    pub latest_acknowledgement_received: Option<DateTime<Utc>>,
}

impl Night {
    pub fn new(id: NightId, site: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id,
            site: site.into(),
            start,
            end,
            latest_prediction_sent: None,
            latest_acknowledgement_received: None,
        }
    }

    pub fn interval(&self) -> Interval {
        Interval::new_unchecked(self.start, self.end)
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.interval().contains(t)
    }

    /// Record that a prediction request went out, keeping the latest instant.
    pub fn record_prediction_sent(&mut self, at: DateTime<Utc>) {
        self.latest_prediction_sent = Some(self.latest_prediction_sent.map_or(at, |t| t.max(at)));
    }

    /// Record that an acknowledgement came back, keeping the latest instant.
    pub fn record_acknowledgement(&mut self, at: DateTime<Utc>) {
        self.latest_acknowledgement_received =
            Some(self.latest_acknowledgement_received.map_or(at, |t| t.max(at)));
    }
}
