//! Interval-set algebra over propagation, closure and shuttering windows.
//!
//! Every function here is pure and total: empty input gives empty output and
//! no domain errors are raised. Degenerate (zero-length) results are dropped
//! rather than emitted.

use crate::models::{
    BlanketClosure, ClearanceWindow, Interval, PropagationWindow, ShutteringWindow, TimeWindow,
};

/// Sort windows ascending by start. Stable, so equal starts keep input order.
pub fn sort_by_start<W: TimeWindow>(windows: &mut [W]) {
    windows.sort_by_key(|w| w.start());
}

/// Gaps between start-adjacent propagation windows.
///
/// For `N` windows with strictly separated neighbours the result has exactly
/// `N - 1` entries, ordered by start and flagged as gaps. Neighbours that touch
/// or overlap leave no gap.
pub fn shuttering_gaps(propagation_windows: &[PropagationWindow]) -> Vec<ShutteringWindow> {
    let mut sorted = propagation_windows.to_vec();
    sort_by_start(&mut sorted);

    sorted
        .windows(2)
        .filter(|pair| pair[0].end < pair[1].start)
        .map(|pair| ShutteringWindow::gap(pair[0].end, pair[1].start))
        .collect()
}

/// Remove every closure from every window.
///
/// Closures are applied in the order given, each one against the fragments
/// left by the previous ones, so a single window may be split several times.
/// The result is ordered ascending by start.
pub fn subtract_closures<W: TimeWindow>(windows: &[W], closures: &[BlanketClosure]) -> Vec<W> {
    let mut result: Vec<W> = Vec::with_capacity(windows.len());

    for window in windows {
        let mut fragments = vec![window.interval()];
        for closure in closures {
            let cut = closure.interval();
            fragments = fragments
                .into_iter()
                .flat_map(|fragment| subtract_one(fragment, cut))
                .collect();
            if fragments.is_empty() {
                break;
            }
        }
        result.extend(
            fragments
                .into_iter()
                .filter(|f| !f.is_empty())
                .map(|f| window.with_interval(f)),
        );
    }

    sort_by_start(&mut result);
    result
}

/// Pieces of `window` left after cutting out `closure`.
fn subtract_one(window: Interval, closure: Interval) -> Vec<Interval> {
    // Entirely before or after: untouched.
    if closure.end <= window.start || closure.start >= window.end {
        return vec![window];
    }

    let covers_start = closure.start <= window.start;
    let covers_end = closure.end >= window.end;

    let pieces = match (covers_start, covers_end) {
        (true, true) => vec![],
        (true, false) => vec![Interval::new_unchecked(closure.end, window.end)],
        (false, true) => vec![Interval::new_unchecked(window.start, closure.start)],
        (false, false) => vec![
            Interval::new_unchecked(window.start, closure.start),
            Interval::new_unchecked(closure.end, window.end),
        ],
    };

    pieces.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Blanket closures merged into the gap list, stable-sorted by start.
///
/// Overlapping entries are kept as separate windows, one per source event.
pub fn merge_with_closures(
    shuttering_windows: &[ShutteringWindow],
    blanket_closures: &[BlanketClosure],
) -> Vec<ShutteringWindow> {
    let mut merged: Vec<ShutteringWindow> =
        Vec::with_capacity(shuttering_windows.len() + blanket_closures.len());
    merged.extend_from_slice(shuttering_windows);
    merged.extend(
        blanket_closures
            .iter()
            .map(|c| ShutteringWindow::blanket(c.start, c.end)),
    );
    sort_by_start(&mut merged);
    merged
}

/// Full shuttering list for a target: gaps between its propagation windows
/// plus every blanket closure.
pub fn shuttering_windows(
    propagation_windows: &[PropagationWindow],
    blanket_closures: &[BlanketClosure],
) -> Vec<ShutteringWindow> {
    merge_with_closures(&shuttering_gaps(propagation_windows), blanket_closures)
}

/// Permitted-fire ranges: propagation windows with the closures cut out.
pub fn clearance_windows(
    propagation_windows: &[PropagationWindow],
    blanket_closures: &[BlanketClosure],
) -> Vec<ClearanceWindow> {
    let mut sorted = propagation_windows.to_vec();
    sort_by_start(&mut sorted);
    subtract_closures(&sorted, blanket_closures)
        .into_iter()
        .map(|w| ClearanceWindow::new(w.start, w.end))
        .collect()
}

#[cfg(test)]
#[path = "windows_tests.rs"]
mod tests;
