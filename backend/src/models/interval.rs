//! Time intervals and the window kinds built on them.
//!
//! All windows share the `[start, end]` shape. Containment tests treat the
//! start as inclusive and the end as exclusive; overlap tests are strict, so
//! two windows that merely touch do not overlap.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A UTC time range with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    /// Create an interval, returning `None` when `end` precedes `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        if start <= end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Create an interval without checking the bounds.
    pub(crate) fn new_unchecked(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// True when the interval has no positive extent.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Inclusive start, exclusive end.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// Strict overlap: boundary-touching intervals do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Extend the interval by `before` at the start and `after` at the end.
    pub fn widen(&self, before: Duration, after: Duration) -> Interval {
        Interval {
            start: self.start - before,
            end: self.end + after,
        }
    }

    /// Shrink the interval by `head` at the start and `tail` at the end.
    ///
    /// Returns `None` when nothing of positive length remains.
    pub fn shrink(&self, head: Duration, tail: Duration) -> Option<Interval> {
        let shrunk = Interval {
            start: self.start + head,
            end: self.end - tail,
        };
        (!shrunk.is_empty()).then_some(shrunk)
    }
}

/// Common view over every window kind so the algebra can stay generic.
pub trait TimeWindow {
    fn interval(&self) -> Interval;

    /// Copy of this window re-bounded to `interval`, keeping any payload.
    fn with_interval(&self, interval: Interval) -> Self;

    fn start(&self) -> DateTime<Utc> {
        self.interval().start
    }

    fn end(&self) -> DateTime<Utc> {
        self.interval().end
    }
}

impl TimeWindow for Interval {
    fn interval(&self) -> Interval {
        *self
    }

    fn with_interval(&self, interval: Interval) -> Self {
        interval
    }
}

crate::define_window_type!(
    PropagationWindow,
    "Time range in which firing at one laser target is pre-cleared by the space-traffic authority."
);

crate::define_window_type!(
    BlanketClosure,
    "Operator-mandated no-fire range, independent of any laser target."
);

crate::define_window_type!(
    ClearanceWindow,
    "Permitted-fire range shown to operators: propagation windows minus blanket closures."
);

/// Why a shuttering window exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutteringKind {
    /// Gap between two consecutive propagation windows.
    Gap,
    /// Explicit blanket closure.
    Blanket,
}

/// Derived range during which firing must stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShutteringWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub kind: ShutteringKind,
}

impl ShutteringWindow {
    pub fn gap(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            kind: ShutteringKind::Gap,
        }
    }

    pub fn blanket(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            kind: ShutteringKind::Blanket,
        }
    }

    pub fn is_blanket_closure(&self) -> bool {
        self.kind == ShutteringKind::Blanket
    }
}

impl TimeWindow for ShutteringWindow {
    fn interval(&self) -> Interval {
        Interval::new_unchecked(self.start, self.end)
    }

    fn with_interval(&self, interval: Interval) -> Self {
        Self {
            start: interval.start,
            end: interval.end,
            kind: self.kind,
        }
    }
}
