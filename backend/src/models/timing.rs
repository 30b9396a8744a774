//! Timing-window definitions attached to observations.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

/// Calendar-aware span (years, months, days, hours, minutes, seconds).
///
/// Years and months are applied first with month-end clamping, then the
/// fixed-length components. Components are non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalendarSpan {
    #[serde(default)]
    pub years: u32,
    #[serde(default)]
    pub months: u32,
    #[serde(default)]
    pub days: u32,
    #[serde(default)]
    pub hours: u32,
    #[serde(default)]
    pub minutes: u32,
    #[serde(default)]
    pub seconds: u32,
}

impl CalendarSpan {
    pub fn days(days: u32) -> Self {
        Self {
            days,
            ..Default::default()
        }
    }

    pub fn hours(hours: u32) -> Self {
        Self {
            hours,
            ..Default::default()
        }
    }

    pub fn minutes(minutes: u32) -> Self {
        Self {
            minutes,
            ..Default::default()
        }
    }

    pub fn months(months: u32) -> Self {
        Self {
            months,
            ..Default::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == CalendarSpan::default()
    }

    /// The span repeated `k` times, component-wise. `None` on overflow.
    pub fn times(&self, k: u32) -> Option<CalendarSpan> {
        Some(CalendarSpan {
            years: self.years.checked_mul(k)?,
            months: self.months.checked_mul(k)?,
            days: self.days.checked_mul(k)?,
            hours: self.hours.checked_mul(k)?,
            minutes: self.minutes.checked_mul(k)?,
            seconds: self.seconds.checked_mul(k)?,
        })
    }

    /// Exact length when the span has no year or month part.
    pub fn fixed_length(&self) -> Option<Duration> {
        if self.years != 0 || self.months != 0 {
            return None;
        }
        Some(
            Duration::try_days(i64::from(self.days))?
                + Duration::try_hours(i64::from(self.hours))?
                + Duration::try_minutes(i64::from(self.minutes))?
                + Duration::try_seconds(i64::from(self.seconds))?,
        )
    }

    /// `instant + self`, or `None` when the result is out of range.
    pub fn add_to(&self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let total_months = self.years.checked_mul(12)?.checked_add(self.months)?;
        let shifted = instant.checked_add_months(Months::new(total_months))?;
        let fixed = Duration::try_days(i64::from(self.days))?
            + Duration::try_hours(i64::from(self.hours))?
            + Duration::try_minutes(i64::from(self.minutes))?
            + Duration::try_seconds(i64::from(self.seconds))?;
        shifted.checked_add_signed(fixed)
    }
}

/// How many instances of a repeating window exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatCount {
    Times(u32),
    Forever,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repeat {
    pub count: RepeatCount,
    pub period: CalendarSpan,
}

/// A (possibly repeating) window in which an observation may be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimingWindow {
    pub start: DateTime<Utc>,
    /// `None` means the window never closes.
    #[serde(default)]
    pub duration: Option<CalendarSpan>,
    #[serde(default)]
    pub repeat: Option<Repeat>,
}

impl TimingWindow {
    pub fn forever(start: DateTime<Utc>) -> Self {
        Self {
            start,
            duration: None,
            repeat: None,
        }
    }

    pub fn once(start: DateTime<Utc>, duration: CalendarSpan) -> Self {
        Self {
            start,
            duration: Some(duration),
            repeat: None,
        }
    }

    pub fn repeating(
        start: DateTime<Utc>,
        duration: CalendarSpan,
        count: RepeatCount,
        period: CalendarSpan,
    ) -> Self {
        Self {
            start,
            duration: Some(duration),
            repeat: Some(Repeat { count, period }),
        }
    }
}
