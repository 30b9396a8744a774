//! Monitor notifications and the bounded log kept for polling clients.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::decision::{ShutterReason, Verdict};
use crate::models::{LaserTargetId, NightId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// A producer stopped delivering fresh data.
    StaleProducer { reason: ShutterReason },
    /// The laser will have to stop within the warning horizon.
    UpcomingShutter { at: DateTime<Utc> },
}

/// Something the decision loop wants people to notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub at: DateTime<Utc>,
    pub level: AlertLevel,
    pub kind: AlertKind,
    pub message: String,
}

/// Everything the decision loop reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    NightChanged {
        at: DateTime<Utc>,
        night: Option<NightId>,
    },
    TargetChanged {
        at: DateTime<Utc>,
        night: Option<NightId>,
        target: Option<LaserTargetId>,
    },
    VerdictChanged {
        verdict: Verdict,
    },
    ShutterCommanded {
        at: DateTime<Utc>,
        reasons: Vec<ShutterReason>,
    },
    ShutterFailed {
        at: DateTime<Utc>,
        error: String,
    },
    Alert {
        alert: Alert,
    },
}

impl MonitorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MonitorEvent::NightChanged { .. } => "night_changed",
            MonitorEvent::TargetChanged { .. } => "target_changed",
            MonitorEvent::VerdictChanged { .. } => "verdict_changed",
            MonitorEvent::ShutterCommanded { .. } => "shutter_commanded",
            MonitorEvent::ShutterFailed { .. } => "shutter_failed",
            MonitorEvent::Alert { .. } => "alert",
        }
    }
}

/// A logged event with its position in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub sequence: u64,
    pub event: MonitorEvent,
}

#[derive(Debug, Default)]
struct LogState {
    entries: VecDeque<LoggedEvent>,
    next_sequence: u64,
}

/// Most recent monitor events, oldest dropped first.
#[derive(Debug, Clone)]
pub struct AlertLog {
    capacity: usize,
    state: Arc<RwLock<LogState>>,
}

impl AlertLog {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Arc::new(RwLock::new(LogState::default())),
        }
    }

    /// Append an event and return its sequence number.
    pub fn push(&self, event: MonitorEvent) -> u64 {
        let mut state = self.state.write();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        if state.entries.len() == self.capacity {
            state.entries.pop_front();
        }
        state.entries.push_back(LoggedEvent { sequence, event });
        sequence
    }

    /// Up to `limit` newest entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<LoggedEvent> {
        let state = self.state.read();
        let skip = state.entries.len().saturating_sub(limit);
        state.entries.iter().skip(skip).cloned().collect()
    }

    /// Entries logged after `sequence`.
    pub fn since(&self, sequence: u64) -> Vec<LoggedEvent> {
        self.state
            .read()
            .entries
            .iter()
            .filter(|e| e.sequence > sequence)
            .cloned()
            .collect()
    }

    /// Alerts only, newest last.
    pub fn alerts(&self) -> Vec<Alert> {
        self.state
            .read()
            .entries
            .iter()
            .filter_map(|e| match &e.event {
                MonitorEvent::Alert { alert } => Some(alert.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
