use super::*;
use crate::models::{
    Coordinates, LaserTarget, LaserTargetKind, Night, PropagationWindow, Visibility,
};
use crate::parsing::CollisionFeed;
use crate::services::live::{GatewayReading, Stamped};
use chrono::{Duration, TimeZone};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 2, 1, 0, 0).unwrap()
}

fn m(minutes: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(minutes)
}

const TARGET: Coordinates = Coordinates::RaDec { ra: 83.0, dec: -5.0 };

fn target_data(closures: Vec<BlanketClosure>) -> TargetData {
    let mut target = LaserTarget::new(
        LaserTargetId(1),
        LaserTargetKind::RaDec,
        TARGET,
        Visibility::default(),
    );
    target.propagation_windows = vec![
        PropagationWindow::new(m(0), m(60)),
        PropagationWindow::new(m(90), m(150)),
    ];
    TargetData { target, closures }
}

fn reading(now: DateTime<Utc>, pointing: Coordinates) -> GatewayReading {
    GatewayReading {
        connected: true,
        simulated: true,
        last_update: Some(now),
        pointing_ra_dec: Some(pointing),
        pointing_az_el: None,
        laser_open: Some(true),
    }
}

/// Every input present and fresh at `now`.
fn healthy(now: DateTime<Utc>) -> SafetySnapshot {
    SafetySnapshot {
        taken_at: now,
        night: Some(Night::new(NightId(1), "GS", m(-120), m(600))),
        target: Some(Stamped::fresh(target_data(vec![]), now)),
        gateway: Some(Stamped::fresh(reading(now, TARGET), now)),
        collisions: Some(Stamped::fresh(CollisionFeed::default(), now)),
        heartbeat: Some(Stamped::fresh(5, now)),
        limits: SafetyLimits::default(),
        auto_shutter: false,
    }
}

fn codes(verdict: &Verdict) -> Vec<&'static str> {
    verdict.reasons.iter().map(ShutterReason::code).collect()
}

#[test]
fn test_all_conditions_met_propagates() {
    let now = m(30);
    let verdict = evaluate(&healthy(now), now);
    assert_eq!(verdict.state, VerdictState::Propagate);
    assert!(verdict.reasons.is_empty());
    assert_eq!(verdict.next_transition, Some(m(60)));
    assert_eq!(verdict.target, Some(LaserTargetId(1)));
}

#[test]
fn test_gap_between_windows_shutters() {
    let now = m(75);
    let verdict = evaluate(&healthy(now), now);
    assert!(!verdict.is_propagate());
    assert_eq!(
        codes(&verdict),
        vec!["outside_propagation_window", "in_shuttering_window"]
    );
    assert!(matches!(
        verdict.reasons[1],
        ShutterReason::InShutteringWindow {
            kind: ShutteringKind::Gap,
            ..
        }
    ));
    assert_eq!(verdict.next_transition, Some(m(90)));
}

#[test]
fn test_blanket_closure_shutters_inside_window() {
    let now = m(30);
    let mut snapshot = healthy(now);
    snapshot.target = Some(Stamped::fresh(
        target_data(vec![BlanketClosure::new(m(20), m(40))]),
        now,
    ));
    let verdict = evaluate(&snapshot, now);
    assert_eq!(codes(&verdict), vec!["in_shuttering_window"]);
    assert_eq!(verdict.next_transition, Some(m(40)));
}

#[test]
fn test_pointing_outside_error_cone() {
    let now = m(30);
    let mut snapshot = healthy(now);
    let off = Coordinates::RaDec {
        ra: 83.0,
        dec: -5.0 + 30.0 / 3600.0,
    };
    snapshot.gateway = Some(Stamped::fresh(reading(now, off), now));
    let verdict = evaluate(&snapshot, now);
    assert_eq!(codes(&verdict), vec!["outside_error_cone"]);
    match &verdict.reasons[0] {
        ShutterReason::OutsideErrorCone { separation_arcsec } => {
            assert!((separation_arcsec - 30.0).abs() < 0.01)
        }
        other => panic!("unexpected reason {:?}", other),
    }
}

#[test]
fn test_pointing_inside_error_cone() {
    let now = m(30);
    let mut snapshot = healthy(now);
    let near = Coordinates::RaDec {
        ra: 83.0,
        dec: -5.0 + 10.0 / 3600.0,
    };
    snapshot.gateway = Some(Stamped::fresh(reading(now, near), now));
    assert!(evaluate(&snapshot, now).is_propagate());
}

#[test]
fn test_missing_gateway_fails_safe() {
    let now = m(30);
    let mut snapshot = healthy(now);
    snapshot.gateway = None;
    let verdict = evaluate(&snapshot, now);
    assert_eq!(
        codes(&verdict),
        vec!["pointing_unknown", "gateway_disconnected"]
    );
}

#[test]
fn test_stale_gateway_reading() {
    let now = m(30);
    let mut snapshot = healthy(now);
    let mut stale = Stamped::fresh(reading(now, TARGET), now);
    stale.stale = true;
    snapshot.gateway = Some(stale);
    let verdict = evaluate(&snapshot, now);
    assert_eq!(
        codes(&verdict),
        vec!["pointing_unknown", "gateway_reading_stale"]
    );
}

#[test]
fn test_telescope_update_too_old() {
    let now = m(30);
    let mut snapshot = healthy(now);
    let mut old = reading(now, TARGET);
    old.last_update = Some(now - Duration::seconds(10));
    snapshot.gateway = Some(Stamped::fresh(old, now));
    assert_eq!(codes(&evaluate(&snapshot, now)), vec!["telescope_update_stale"]);
}

#[test]
fn test_collision_feed_missing_or_stale() {
    let now = m(30);
    let mut snapshot = healthy(now);
    snapshot.collisions = None;
    assert_eq!(codes(&evaluate(&snapshot, now)), vec!["collision_feed_missing"]);

    snapshot.collisions = Some(Stamped::fresh(
        CollisionFeed::default(),
        now - Duration::minutes(5),
    ));
    assert_eq!(codes(&evaluate(&snapshot, now)), vec!["collision_feed_stale"]);
}

#[test]
fn test_active_collision_shutters() {
    let now = m(30);
    let mut snapshot = healthy(now);
    let feed = CollisionFeed {
        active: vec![
            Collision {
                site: "MK".to_string(),
                observatory: "KECK1".to_string(),
                priority: "LGS".to_string(),
                start: m(25),
                end: m(35),
            },
            Collision {
                site: "MK".to_string(),
                observatory: "SUBARU".to_string(),
                priority: "LGS".to_string(),
                start: m(40),
                end: m(45),
            },
        ],
        ..Default::default()
    };
    snapshot.collisions = Some(Stamped::fresh(feed, now));
    let verdict = evaluate(&snapshot, now);
    assert_eq!(codes(&verdict), vec!["collision_active"]);
    // Next clearance starts once the first collision is over.
    assert_eq!(verdict.next_transition, Some(m(35)));
}

#[test]
fn test_heartbeat_stale() {
    let now = m(30);
    let mut snapshot = healthy(now);
    snapshot.heartbeat = Some(Stamped::fresh(5, now - Duration::seconds(4)));
    assert_eq!(codes(&evaluate(&snapshot, now)), vec!["heartbeat_stale"]);
    snapshot.heartbeat = None;
    assert_eq!(codes(&evaluate(&snapshot, now)), vec!["heartbeat_stale"]);
}

#[test]
fn test_no_target_selected() {
    let now = m(30);
    let mut snapshot = healthy(now);
    snapshot.target = None;
    let verdict = evaluate(&snapshot, now);
    assert_eq!(codes(&verdict), vec!["no_target_selected"]);
    assert_eq!(verdict.next_transition, None);
}

#[test]
fn test_no_night_comes_first() {
    let now = m(30);
    let mut snapshot = healthy(now);
    snapshot.night = None;
    snapshot.gateway = None;
    let verdict = evaluate(&snapshot, now);
    assert_eq!(codes(&verdict)[0], "no_night");
}

#[test]
fn test_old_propagation_data_is_stale() {
    let now = m(30);
    let mut snapshot = healthy(now);
    snapshot.target = Some(Stamped::fresh(target_data(vec![]), now - Duration::minutes(5)));
    assert_eq!(codes(&evaluate(&snapshot, now)), vec!["propagation_data_stale"]);
}

#[test]
fn test_target_without_windows() {
    let now = m(30);
    let mut snapshot = healthy(now);
    let mut data = target_data(vec![]);
    data.target.propagation_windows.clear();
    snapshot.target = Some(Stamped::fresh(data, now));
    assert_eq!(codes(&evaluate(&snapshot, now)), vec!["no_propagation_windows"]);
}

#[test]
fn test_margins_shrink_windows_and_widen_collisions() {
    let mut snapshot = healthy(m(0));
    snapshot.limits.post_margin_secs = 60;

    // One minute after a window opens is still inside the post margin.
    let now = m(0) + Duration::seconds(30);
    snapshot.taken_at = now;
    refresh_stamps(&mut snapshot, now);
    assert_eq!(
        codes(&evaluate(&snapshot, now)),
        vec!["outside_propagation_window"]
    );

    // A collision that ended 30 s ago still blocks.
    let now = m(10);
    refresh_stamps(&mut snapshot, now);
    snapshot.collisions = Some(Stamped::fresh(
        CollisionFeed {
            active: vec![Collision {
                site: "CP".to_string(),
                observatory: "VLT-4".to_string(),
                priority: "LGS".to_string(),
                start: m(5),
                end: m(10) - Duration::seconds(30),
            }],
            ..Default::default()
        },
        now,
    ));
    assert_eq!(codes(&evaluate(&snapshot, now)), vec!["collision_active"]);
}

#[test]
fn test_pre_margin_ends_window_early() {
    let now = m(59);
    let mut snapshot = healthy(now);
    snapshot.limits.pre_margin_secs = 120;
    let verdict = evaluate(&snapshot, now);
    // The gap widened by two minutes now starts at 58.
    assert_eq!(
        codes(&verdict),
        vec!["outside_propagation_window", "in_shuttering_window"]
    );
}

#[test]
fn test_same_outcome_ignores_payload() {
    let now = m(30);
    let mut a = healthy(now);
    a.gateway = Some(Stamped::fresh(
        reading(now, Coordinates::RaDec { ra: 84.0, dec: -5.0 }),
        now,
    ));
    let mut b = a.clone();
    b.gateway = Some(Stamped::fresh(
        reading(now, Coordinates::RaDec { ra: 85.0, dec: -5.0 }),
        now,
    ));
    let (va, vb) = (evaluate(&a, now), evaluate(&b, now));
    assert_ne!(va, vb);
    assert!(va.same_outcome(&vb));
    assert!(!va.same_outcome(&evaluate(&healthy(now), now)));
}

fn refresh_stamps(snapshot: &mut SafetySnapshot, now: DateTime<Utc>) {
    if let Some(target) = snapshot.target.as_mut() {
        target.stamp = now;
    }
    snapshot.gateway = Some(Stamped::fresh(reading(now, TARGET), now));
    if let Some(feed) = snapshot.collisions.as_mut() {
        feed.stamp = now;
    }
    snapshot.heartbeat = Some(Stamped::fresh(5, now));
}
