use super::*;
use crate::models::{ObservationId, Repeat, TimingWindow};
use chrono::{Duration, TimeZone};

fn night() -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.with_ymd_and_hms(2024, 3, 10, 23, 0, 0).unwrap();
    (start, start + Duration::hours(10))
}

fn observation(windows: Vec<TimingWindow>) -> Observation {
    Observation {
        id: ObservationId::new("GS-2024A-Q-1-1"),
        targets: vec![],
        timing_windows: windows,
    }
}

#[test]
fn test_no_constraints_passes() {
    let (start, end) = night();
    assert!(passes_time_constraints(&observation(vec![]), start, end));
}

#[test]
fn test_forever_window_before_night_end_passes() {
    let (start, end) = night();
    let before = TimingWindow::forever(start - Duration::days(30));
    let inside = TimingWindow::forever(end - Duration::minutes(1));
    assert!(passes_time_constraints(&observation(vec![before]), start, end));
    assert!(passes_time_constraints(&observation(vec![inside]), start, end));
}

#[test]
fn test_forever_window_after_night_end_fails() {
    let (start, end) = night();
    let after = TimingWindow::forever(end + Duration::minutes(1));
    let at_end = TimingWindow::forever(end);
    assert!(!passes_time_constraints(&observation(vec![after]), start, end));
    assert!(!passes_time_constraints(&observation(vec![at_end]), start, end));
}

#[test]
fn test_single_window_overlap_is_strict() {
    let (start, end) = night();
    let ending_at_start = TimingWindow::once(start - Duration::hours(2), CalendarSpan::hours(2));
    let starting_at_end = TimingWindow::once(end, CalendarSpan::hours(2));
    let overlapping = TimingWindow::once(start - Duration::hours(1), CalendarSpan::hours(2));
    assert!(!passes_time_constraints(&observation(vec![ending_at_start]), start, end));
    assert!(!passes_time_constraints(&observation(vec![starting_at_end]), start, end));
    assert!(passes_time_constraints(&observation(vec![overlapping]), start, end));
}

#[test]
fn test_any_matching_window_is_enough() {
    let (start, end) = night();
    let miss = TimingWindow::once(start - Duration::days(5), CalendarSpan::hours(1));
    let hit = TimingWindow::once(start + Duration::hours(1), CalendarSpan::hours(1));
    assert!(passes_time_constraints(&observation(vec![miss, hit]), start, end));
    assert!(!passes_time_constraints(&observation(vec![miss]), start, end));
}

#[test]
fn test_repeating_window_checks_later_instances() {
    let (start, end) = night();
    // Daily one-hour window starting 9 days before the night at the night's start time.
    let window = TimingWindow::repeating(
        start - Duration::days(9),
        CalendarSpan::hours(1),
        RepeatCount::Times(10),
        CalendarSpan::days(1),
    );
    assert!(passes_time_constraints(&observation(vec![window]), start, end));
}

#[test]
fn test_repeating_window_exhausts_instances() {
    let (start, end) = night();
    let window = TimingWindow::repeating(
        start - Duration::days(9),
        CalendarSpan::hours(1),
        RepeatCount::Times(9),
        CalendarSpan::days(1),
    );
    assert!(!passes_time_constraints(&observation(vec![window]), start, end));
}

#[test]
fn test_unbounded_repeat_stops_past_night() {
    let (start, end) = night();
    let hit = TimingWindow::repeating(
        start - Duration::days(100),
        CalendarSpan::hours(2),
        RepeatCount::Forever,
        CalendarSpan::days(1),
    );
    assert!(passes_time_constraints(&observation(vec![hit]), start, end));

    // Weekly half-hour window that lands just after each night ends.
    let miss = TimingWindow::repeating(
        end - Duration::weeks(10),
        CalendarSpan::minutes(30),
        RepeatCount::Forever,
        CalendarSpan::days(7),
    );
    assert!(!passes_time_constraints(&observation(vec![miss]), start, end));
}

#[test]
fn test_monthly_repeat_uses_calendar_months() {
    // 31 Jan + 1 month lands on 29 Feb in a leap year, not 2 Mar.
    let night_start = Utc.with_ymd_and_hms(2024, 2, 29, 1, 0, 0).unwrap();
    let night_end = night_start + Duration::hours(8);
    let window = TimingWindow::repeating(
        Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
        CalendarSpan::hours(3),
        RepeatCount::Times(2),
        CalendarSpan::months(1),
    );
    assert!(passes_time_constraints(&observation(vec![window]), night_start, night_end));
}

#[test]
fn test_zero_period_tests_single_instance() {
    let (start, end) = night();
    let window = TimingWindow::repeating(
        start - Duration::days(2),
        CalendarSpan::hours(1),
        RepeatCount::Forever,
        CalendarSpan::default(),
    );
    assert!(!passes_time_constraints(&observation(vec![window]), start, end));
}

#[test]
fn test_old_fine_grained_repeat_skips_to_the_night() {
    let (start, end) = night();
    // Ten years of one-minute instances lie before the night.
    let every_minute = TimingWindow::repeating(
        start - Duration::days(3650),
        CalendarSpan {
            seconds: 30,
            ..CalendarSpan::default()
        },
        RepeatCount::Forever,
        CalendarSpan::minutes(1),
    );
    assert!(passes_time_constraints(&observation(vec![every_minute]), start, end));

    // Same window with too few repeats to ever reach the night.
    let exhausted = TimingWindow {
        repeat: Some(Repeat {
            count: RepeatCount::Times(1_000_000),
            period: CalendarSpan::minutes(1),
        }),
        ..every_minute
    };
    assert!(!passes_time_constraints(&observation(vec![exhausted]), start, end));
}

#[test]
fn test_skip_lands_on_the_overlapping_instance() {
    let (start, end) = night();
    // Instances end exactly at the night's start until one straddles it.
    let window = TimingWindow::repeating(
        start - Duration::hours(1000),
        CalendarSpan::hours(1),
        RepeatCount::Times(1001),
        CalendarSpan::hours(1),
    );
    assert!(passes_time_constraints(&observation(vec![window]), start, end));

    let short = TimingWindow::repeating(
        start - Duration::hours(1000),
        CalendarSpan::hours(1),
        RepeatCount::Times(1000),
        CalendarSpan::hours(1),
    );
    assert!(!passes_time_constraints(&observation(vec![short]), start, end));
}
