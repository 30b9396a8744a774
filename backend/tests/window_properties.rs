//! Property checks for the window algebra.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use lgs_rust::algorithms::{merge_with_closures, shuttering_gaps, subtract_closures};
use lgs_rust::models::{BlanketClosure, PropagationWindow, TimeWindow};

fn t(second: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::seconds(second)
}

/// Sorted, strictly separated windows built from (gap, length) pairs.
fn separated_windows() -> impl Strategy<Value = Vec<PropagationWindow>> {
    prop::collection::vec((1i64..600, 1i64..600), 0..12).prop_map(|steps| {
        let mut cursor = 0;
        steps
            .into_iter()
            .map(|(gap, length)| {
                let start = cursor + gap;
                cursor = start + length;
                PropagationWindow::new(t(start), t(cursor))
            })
            .collect()
    })
}

fn closure_sets() -> impl Strategy<Value = Vec<BlanketClosure>> {
    prop::collection::vec((0i64..10_000, 1i64..900), 0..8).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(start, length)| BlanketClosure::new(t(start), t(start + length)))
            .collect()
    })
}

proptest! {
    #[test]
    fn gaps_count_is_one_less_than_windows(windows in separated_windows()) {
        let gaps = shuttering_gaps(&windows);
        prop_assert_eq!(gaps.len(), windows.len().saturating_sub(1));
        for (gap, pair) in gaps.iter().zip(windows.windows(2)) {
            prop_assert_eq!(gap.start, pair[0].end);
            prop_assert_eq!(gap.end, pair[1].start);
        }
    }

    #[test]
    fn gaps_ignore_input_order(windows in separated_windows()) {
        let mut reversed = windows.clone();
        reversed.reverse();
        prop_assert_eq!(shuttering_gaps(&reversed), shuttering_gaps(&windows));
    }

    #[test]
    fn subtract_outside_closures_is_identity(windows in separated_windows()) {
        let Some(last) = windows.last() else {
            return Ok(());
        };
        let after = BlanketClosure::new(last.end + Duration::seconds(1), last.end + Duration::hours(1));
        let before = BlanketClosure::new(t(-3600), t(0));
        prop_assert_eq!(subtract_closures(&windows, &[after, before]), windows.clone());
    }

    #[test]
    fn covering_closure_removes_everything(windows in separated_windows()) {
        let cover = BlanketClosure::new(t(-1), t(100_000));
        prop_assert!(subtract_closures(&windows, &[cover]).is_empty());
    }

    #[test]
    fn subtract_leaves_nothing_inside_closures(
        windows in separated_windows(),
        closures in closure_sets(),
    ) {
        let left = subtract_closures(&windows, &closures);
        for fragment in &left {
            prop_assert!(fragment.start < fragment.end);
            for closure in &closures {
                prop_assert!(!fragment.interval().overlaps(&closure.interval()));
            }
        }
        for pair in left.windows(2) {
            prop_assert!(pair[0].start <= pair[1].start);
        }
    }

    #[test]
    fn merge_keeps_every_entry_sorted(
        windows in separated_windows(),
        closures in closure_sets(),
    ) {
        let gaps = shuttering_gaps(&windows);
        let merged = merge_with_closures(&gaps, &closures);
        prop_assert_eq!(merged.len(), gaps.len() + closures.len());
        for pair in merged.windows(2) {
            prop_assert!(pair[0].start <= pair[1].start);
        }
    }
}
