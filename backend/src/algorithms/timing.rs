//! Timing-constraint evaluation for observations against a night.

use chrono::{DateTime, Utc};

use crate::models::{CalendarSpan, Observation, RepeatCount, TimingWindow};

/// Whether an observation may be scheduled in `[night_start, night_end)`.
///
/// Observations without timing windows always pass. Otherwise at least one
/// window must overlap the night.
pub fn passes_time_constraints(
    observation: &Observation,
    night_start: DateTime<Utc>,
    night_end: DateTime<Utc>,
) -> bool {
    observation.timing_windows.is_empty()
        || observation
            .timing_windows
            .iter()
            .any(|w| window_overlaps_night(w, night_start, night_end))
}

/// Overlap test for one timing-window definition, across all its repeats.
pub fn window_overlaps_night(
    window: &TimingWindow,
    night_start: DateTime<Utc>,
    night_end: DateTime<Utc>,
) -> bool {
    let Some(duration) = window.duration else {
        return window.start < night_end;
    };
    let Some(end) = duration.add_to(window.start) else {
        return false;
    };

    let Some(repeat) = window.repeat else {
        return overlaps(window.start, end, night_start, night_end);
    };

    // A zero period would repeat the same instance forever.
    let limit = match (repeat.count, repeat.period.is_zero()) {
        (_, true) => Some(1),
        (RepeatCount::Times(n), false) => Some(n),
        (RepeatCount::Forever, false) => None,
    };

    let Some(mut k) = first_candidate(end, night_start, &repeat.period) else {
        return false;
    };
    loop {
        if limit.is_some_and(|n| k >= n) {
            return false;
        }
        let Some((start_k, end_k)) = instance(window.start, end, &repeat.period, k) else {
            return false;
        };
        if overlaps(start_k, end_k, night_start, night_end) {
            return true;
        }
        // Later instances only move forward in time.
        if start_k >= night_end {
            return false;
        }
        k = match k.checked_add(1) {
            Some(next) => next,
            None => return false,
        };
    }
}

/// Index of the first instance that can still end after `night_start`.
///
/// Calendar periods vary in length and are walked from the first instance.
/// `None` when that index is past the representable range.
fn first_candidate(
    first_end: DateTime<Utc>,
    night_start: DateTime<Utc>,
    period: &CalendarSpan,
) -> Option<u32> {
    let Some(step) = period.fixed_length().map(|p| p.num_seconds()) else {
        return Some(0);
    };
    let behind = (night_start - first_end).num_seconds();
    if step <= 0 || behind <= 0 {
        return Some(0);
    }
    // Instance k ends at first_end + k * step; earlier ones end too soon.
    u32::try_from(behind / step).ok()
}

fn instance(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    period: &CalendarSpan,
    k: u32,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let offset = period.times(k)?;
    Some((offset.add_to(start)?, offset.add_to(end)?))
}

/// Strict open-interval overlap: touching does not count.
fn overlaps(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    night_start: DateTime<Utc>,
    night_end: DateTime<Utc>,
) -> bool {
    start < night_end && end > night_start
}

#[cfg(test)]
#[path = "timing_tests.rs"]
mod tests;
