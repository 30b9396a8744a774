//! Turn a night's observations into laser targets.
//!
//! Observations are filtered by their timing constraints and by the
//! visibility of their science target, then every target of each surviving
//! observation is fed into [`TargetGrouping`] in input order.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::algorithms::{passes_time_constraints, TargetGrouping};
use crate::config::ClusteringSettings;
use crate::models::{
    Coordinates, LaserTarget, LaserTargetId, Night, Observation, ObservationId,
    ObservationTargetId, Visibility,
};

/// Source of target visibility for one night.
pub trait VisibilityCalculator: Send + Sync {
    fn visibility(&self, coordinates: &Coordinates, night: &Night) -> Visibility;
}

impl<F> VisibilityCalculator for F
where
    F: Fn(&Coordinates, &Night) -> Visibility + Send + Sync,
{
    fn visibility(&self, coordinates: &Coordinates, night: &Night) -> Visibility {
        self(coordinates, night)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No timing window overlaps the night.
    TimingConstraints,
    /// Not exactly one science target.
    ScienceTargetCount { found: usize },
    /// The science target never rises above the horizon.
    NotVisible,
    /// The science target is above the laser limit for too short a time.
    TooShortAboveLimit { minutes: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedObservation {
    pub observation: ObservationId,
    pub reason: SkipReason,
}

/// Laser targets for a night and the observations bound to them.
///
/// Laser target ids are provisional until the result is stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionResult {
    pub laser_targets: Vec<LaserTarget>,
    /// Accepted observations with each target's `laser_target` filled in.
    pub observations: Vec<Observation>,
    pub bindings: Vec<(ObservationTargetId, LaserTargetId)>,
    pub skipped: Vec<SkippedObservation>,
}

/// Filter `observations` for `night` and group their targets.
pub fn collect_observations(
    night: &Night,
    observations: &[Observation],
    visibility: &dyn VisibilityCalculator,
    settings: &ClusteringSettings,
) -> CollectionResult {
    let min_above_limit = Duration::minutes(settings.min_above_limit_minutes);
    let mut grouping = TargetGrouping::new(settings.max_distance_deg);
    let mut accepted = Vec::new();
    let mut skipped = Vec::new();

    for observation in observations {
        let mut skip = |reason: SkipReason| {
            debug!(observation = %observation.id, ?reason, "Skipping observation");
            skipped.push(SkippedObservation {
                observation: observation.id.clone(),
                reason,
            });
        };

        if !passes_time_constraints(observation, night.start, night.end) {
            skip(SkipReason::TimingConstraints);
            continue;
        }

        let science = match observation.science_target() {
            Ok(target) => target,
            Err(violation) => {
                error!(%violation, "Observation has an invalid target list");
                skip(SkipReason::ScienceTargetCount {
                    found: violation.science_targets,
                });
                continue;
            }
        };

        let science_visibility = visibility.visibility(&science.coordinates, night);
        if !science_visibility.is_visible() {
            skip(SkipReason::NotVisible);
            continue;
        }
        let above_limit = science_visibility.max_duration_above_limit();
        if above_limit < min_above_limit || above_limit <= Duration::zero() {
            skip(SkipReason::TooShortAboveLimit {
                minutes: above_limit.num_minutes(),
            });
            continue;
        }

        grouping.add_observation_target(science, science_visibility);
        for auxiliary in observation.auxiliary_targets() {
            let aux_visibility = visibility.visibility(&auxiliary.coordinates, night);
            grouping.add_observation_target(auxiliary, aux_visibility);
        }
        accepted.push(observation);
    }

    // Bind after all targets are in, since later arrivals move group centers.
    let observations = accepted
        .into_iter()
        .map(|observation| {
            let mut observation = observation.clone();
            for target in &mut observation.targets {
                target.laser_target = grouping.laser_target_for(target.id).map(|l| l.id);
            }
            observation
        })
        .collect();

    CollectionResult {
        laser_targets: grouping.laser_targets().into_iter().cloned().collect(),
        observations,
        bindings: grouping.bindings(),
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CalendarSpan, Interval, NightId, ObservationTarget, ObservationTargetKind, TargetRole,
        TimingWindow,
    };
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap()
    }

    fn night() -> Night {
        Night::new(NightId(1), "GS", t0(), t0() + Duration::hours(10))
    }

    fn target(id: i64, role: TargetRole, ra: f64, dec: f64) -> ObservationTarget {
        ObservationTarget {
            id: ObservationTargetId(id),
            name: format!("t{}", id),
            kind: ObservationTargetKind::Sidereal,
            role,
            coordinates: Coordinates::RaDec { ra, dec },
            laser_target: None,
        }
    }

    fn observation(id: &str, targets: Vec<ObservationTarget>) -> Observation {
        Observation {
            id: ObservationId::new(id),
            targets,
            timing_windows: vec![],
        }
    }

    /// Everything is up for the first four hours and above the limit for three.
    fn always_up(_: &Coordinates, night: &Night) -> Visibility {
        Visibility::new(
            vec![Interval::new(night.start, night.start + Duration::hours(4)).unwrap()],
            vec![Interval::new(night.start, night.start + Duration::hours(3)).unwrap()],
        )
    }

    fn settings() -> ClusteringSettings {
        ClusteringSettings {
            max_distance_deg: 0.1,
            min_above_limit_minutes: 30,
        }
    }

    #[test]
    fn test_nearby_targets_share_a_laser_target() {
        let observations = vec![
            observation("GS-1", vec![target(1, TargetRole::Science, 10.0, -30.0)]),
            observation(
                "GS-2",
                vec![
                    target(2, TargetRole::Science, 10.05, -30.0),
                    target(3, TargetRole::Guide, 40.0, -30.0),
                ],
            ),
        ];
        let result = collect_observations(&night(), &observations, &always_up, &settings());

        assert!(result.skipped.is_empty());
        assert_eq!(result.laser_targets.len(), 2);
        assert_eq!(result.bindings.len(), 3);

        let first = result.observations[0].targets[0].laser_target;
        let second = result.observations[1].targets[0].laser_target;
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_ne!(result.observations[1].targets[1].laser_target, first);
    }

    #[test]
    fn test_observation_outside_timing_windows_is_skipped() {
        let mut late = observation("GS-1", vec![target(1, TargetRole::Science, 10.0, -30.0)]);
        late.timing_windows = vec![TimingWindow::once(
            t0() + Duration::days(3),
            CalendarSpan::hours(1),
        )];
        let result = collect_observations(&night(), &[late], &always_up, &settings());

        assert!(result.laser_targets.is_empty());
        assert_eq!(result.skipped[0].reason, SkipReason::TimingConstraints);
    }

    #[test]
    fn test_missing_science_target_is_skipped() {
        let guide_only = observation("GS-1", vec![target(1, TargetRole::Guide, 10.0, -30.0)]);
        let result = collect_observations(&night(), &[guide_only], &always_up, &settings());

        assert_eq!(
            result.skipped,
            vec![SkippedObservation {
                observation: ObservationId::new("GS-1"),
                reason: SkipReason::ScienceTargetCount { found: 0 },
            }]
        );
    }

    #[test]
    fn test_visibility_filters() {
        let observations = vec![observation(
            "GS-1",
            vec![target(1, TargetRole::Science, 10.0, -30.0)],
        )];

        let never_up = |_: &Coordinates, _: &Night| Visibility::default();
        let result = collect_observations(&night(), &observations, &never_up, &settings());
        assert_eq!(result.skipped[0].reason, SkipReason::NotVisible);

        let briefly_high = |_: &Coordinates, night: &Night| {
            Visibility::new(
                vec![Interval::new(night.start, night.start + Duration::hours(4)).unwrap()],
                vec![Interval::new(night.start, night.start + Duration::minutes(20)).unwrap()],
            )
        };
        let result = collect_observations(&night(), &observations, &briefly_high, &settings());
        assert_eq!(
            result.skipped[0].reason,
            SkipReason::TooShortAboveLimit { minutes: 20 }
        );
    }
}
