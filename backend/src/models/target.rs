//! Laser targets, observation targets and their visibility.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::interval::{Interval, PropagationWindow, ShutteringWindow, TimeWindow};
use super::timing::TimingWindow;

crate::define_id_type!(i64, LaserTargetId);
crate::define_id_type!(i64, ObservationTargetId);

/// Observation identifier as issued by the program database (e.g. `GS-2024A-Q-12-3`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationId(pub String);

impl ObservationId {
    pub fn new(value: impl Into<String>) -> Self {
        ObservationId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw two-axis position. Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum Coordinates {
    RaDec { ra: f64, dec: f64 },
    AzEl { az: f64, el: f64 },
}

/// Which coordinate frame a position is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frame {
    RaDec,
    AzEl,
}

impl Coordinates {
    pub fn frame(&self) -> Frame {
        match self {
            Coordinates::RaDec { .. } => Frame::RaDec,
            Coordinates::AzEl { .. } => Frame::AzEl,
        }
    }

    /// The two axes as `(longitude-like, latitude-like)`.
    pub fn axes(&self) -> (f64, f64) {
        match *self {
            Coordinates::RaDec { ra, dec } => (ra, dec),
            Coordinates::AzEl { az, el } => (az, el),
        }
    }

    pub fn from_axes(frame: Frame, first: f64, second: f64) -> Self {
        match frame {
            Frame::RaDec => Coordinates::RaDec {
                ra: first,
                dec: second,
            },
            Frame::AzEl => Coordinates::AzEl {
                az: first,
                el: second,
            },
        }
    }
}

/// Rise/set information for one position over one night.
///
/// Produced by an external visibility calculator and treated as immutable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Visibility {
    /// Intervals with the target above the horizon.
    pub above_horizon: Vec<Interval>,
    /// Intervals with the target above the laser-safe altitude limit.
    pub above_limit: Vec<Interval>,
}

impl Visibility {
    pub fn new(above_horizon: Vec<Interval>, above_limit: Vec<Interval>) -> Self {
        Self {
            above_horizon,
            above_limit,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.above_horizon.iter().any(|i| !i.is_empty())
    }

    pub fn rise(&self) -> Option<DateTime<Utc>> {
        self.above_horizon.iter().map(|i| i.start).min()
    }

    pub fn set(&self) -> Option<DateTime<Utc>> {
        self.above_horizon.iter().map(|i| i.end).max()
    }

    /// Longest continuous stretch above the altitude limit.
    pub fn max_duration_above_limit(&self) -> Duration {
        self.above_limit
            .iter()
            .map(Interval::duration)
            .max()
            .unwrap_or_else(Duration::zero)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaserTargetKind {
    RaDec,
    AzEl,
    Engineering,
}

/// Position the laser is actually pointed at, shared by one or more observation targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaserTarget {
    pub id: LaserTargetId,
    pub kind: LaserTargetKind,
    pub coordinates: Coordinates,
    pub visibility: Visibility,
    /// Sorted ascending by start.
    #[serde(default)]
    pub propagation_windows: Vec<PropagationWindow>,
    #[serde(default)]
    pub shuttering_windows: Vec<ShutteringWindow>,
}

impl LaserTarget {
    pub fn new(
        id: LaserTargetId,
        kind: LaserTargetKind,
        coordinates: Coordinates,
        visibility: Visibility,
    ) -> Self {
        Self {
            id,
            kind,
            coordinates,
            visibility,
            propagation_windows: Vec::new(),
            shuttering_windows: Vec::new(),
        }
    }

    pub fn earliest_propagation(&self) -> Option<DateTime<Utc>> {
        self.propagation_windows.iter().map(TimeWindow::start).min()
    }

    pub fn latest_propagation(&self) -> Option<DateTime<Utc>> {
        self.propagation_windows.iter().map(TimeWindow::end).max()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationTargetKind {
    Sidereal,
    NonSidereal,
    Engineering,
}

/// Role of a target within its observation. `Science` is the distinguished one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetRole {
    Science,
    Guide,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationTarget {
    pub id: ObservationTargetId,
    pub name: String,
    pub kind: ObservationTargetKind,
    pub role: TargetRole,
    pub coordinates: Coordinates,
    /// Laser target currently representing this target, if it has been grouped.
    #[serde(default)]
    pub laser_target: Option<LaserTargetId>,
}

impl ObservationTarget {
    pub fn is_science(&self) -> bool {
        self.role == TargetRole::Science
    }

    /// Kind of laser target this observation target maps to.
    pub fn laser_target_kind(&self) -> LaserTargetKind {
        match (self.kind, self.coordinates.frame()) {
            (ObservationTargetKind::Engineering, _) => LaserTargetKind::Engineering,
            (_, Frame::RaDec) => LaserTargetKind::RaDec,
            (_, Frame::AzEl) => LaserTargetKind::AzEl,
        }
    }
}

/// The observation violates the exactly-one-science-target rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("observation {observation} has {science_targets} science targets, expected exactly one")]
pub struct ScienceTargetViolation {
    pub observation: ObservationId,
    pub science_targets: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: ObservationId,
    pub targets: Vec<ObservationTarget>,
    #[serde(default)]
    pub timing_windows: Vec<TimingWindow>,
}

impl Observation {
    /// The single science target, or the invariant violation.
    pub fn science_target(&self) -> Result<&ObservationTarget, ScienceTargetViolation> {
        let mut science = self.targets.iter().filter(|t| t.is_science());
        match (science.next(), science.next()) {
            (Some(target), None) => Ok(target),
            _ => Err(ScienceTargetViolation {
                observation: self.id.clone(),
                science_targets: self.targets.iter().filter(|t| t.is_science()).count(),
            }),
        }
    }

    pub fn auxiliary_targets(&self) -> impl Iterator<Item = &ObservationTarget> {
        self.targets.iter().filter(|t| !t.is_science())
    }

    /// Distinct laser targets referenced by the members, in member order.
    pub fn laser_targets(&self) -> Vec<LaserTargetId> {
        let mut ids: Vec<LaserTargetId> = Vec::new();
        for id in self.targets.iter().filter_map(|t| t.laser_target) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}
