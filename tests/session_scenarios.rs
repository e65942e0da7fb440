// End-to-end scenarios for a run against a ghost
//
// Each test drives a RunSession through the public API the way a live session would:
// ticks advance the clock, fixes grow the route, and the comparison follows along.

use wisp::{
    AheadOrBehind, EngineConfig, GhostProfile, GhostType, LocationFix, RaceStatus, RouteBuilder,
    RunSession, SessionEvent, SessionPhase, Split,
    geo::{Coordinate, offset_north},
};

const ORIGIN: Coordinate = Coordinate {
    latitude: 51.5074,
    longitude: -0.1278,
};

fn pr_ghost() -> GhostProfile {
    GhostProfile::from_splits(
        GhostType::PersonalRecord,
        "2k PR",
        vec![Split::new(1000., 240.), Split::new(2000., 480.)],
    )
    .unwrap()
}

fn fix(meters: f64, timestamp: f64) -> LocationFix {
    LocationFix::new(offset_north(&ORIGIN, meters), timestamp, 5.)
}

/// Starts a session against `ghost` and runs the countdown out
fn running(ghost: GhostProfile) -> RunSession {
    let mut session = RunSession::new(EngineConfig::default());
    session.start_countdown(ghost).unwrap();
    while session.phase() == SessionPhase::Countdown {
        session.tick();
    }
    session
}

/// Runs at a steady speed, one fix every two seconds, for `seconds` of moving time
fn run_steady(session: &mut RunSession, speed_mps: f64, seconds: u32) {
    let start_time = session.state().moving_time;
    let start_distance = session.state().current_distance;
    if session.route().is_empty() {
        session.on_fix(&fix(0., 0.));
    }
    for i in 1..=seconds {
        session.tick();
        if i % 2 == 0 {
            let t = start_time + i as f64;
            session.on_fix(&fix(start_distance + speed_mps * i as f64, t));
        }
    }
}

#[test]
fn test_on_pace_runner_is_tied() {
    let mut session = running(pr_ghost());
    // 1000 m in 240 s is the ghost's own pace
    run_steady(&mut session, 1000. / 240., 120);

    let sample = session.samples().last().unwrap();
    assert_eq!(sample.moving_time, 120.);
    assert!((sample.user_distance - 500.).abs() < 1e-3);
    assert!(sample.gap_seconds.abs() < 0.5);
    assert_eq!(sample.ahead_or_behind, AheadOrBehind::Tied);
}

#[test]
fn test_slow_runner_is_behind() {
    let mut session = running(pr_ghost());
    run_steady(&mut session, 900. / 240., 240);

    let sample = session.samples().last().unwrap();
    assert!((sample.user_distance - 900.).abs() < 1e-3);
    // the ghost covered 900 m after 216 s
    assert!((sample.gap_seconds - 24.).abs() < 1e-3);
    assert_eq!(sample.ahead_or_behind, AheadOrBehind::Behind);
    assert!((session.ghost_distance() - 1000.).abs() < 1e-9);
}

#[test]
fn test_jitter_inside_minimum_distance_is_dropped() {
    let mut builder = RouteBuilder::new(&EngineConfig::default());
    assert!(builder.ingest(&fix(0., 0.)).is_some());
    assert!(builder.ingest(&fix(1.5, 1.)).is_none());
    assert!(builder.ingest(&fix(2.8, 2.)).is_none());
    assert_eq!(builder.len(), 1);
    assert_eq!(builder.total_distance(), 0.);
}

#[test]
fn test_pause_excludes_time_from_ghost() {
    let mut session = running(pr_ghost());
    run_steady(&mut session, 4., 300);
    assert_eq!(session.state().moving_time, 300.);

    session.pause();
    let ghost_at_pause = session.ghost_distance();
    for _ in 0..60 {
        session.tick();
    }
    session.resume();

    assert_eq!(session.state().moving_time, 300.);
    assert_eq!(session.ghost_distance(), ghost_at_pause);
    assert!((ghost_at_pause - 1250.).abs() < 1e-9);
}

#[test]
fn test_discard_mid_run_reports_abandoned() {
    let ghost = GhostProfile::from_target_pace("5k goal", 5000., 1500., 1000.).unwrap();
    let mut session = running(ghost);
    let events = session.subscribe();
    run_steady(&mut session, 5., 360);
    assert!((session.state().current_distance - 1800.).abs() < 1e-3);

    let result = session.discard().unwrap();
    assert_eq!(result.status, RaceStatus::Abandoned);
    assert!((result.distance_completed - 1800.).abs() < 1e-3);
    assert!((result.completion_percentage - 0.36).abs() < 1e-6);
    assert_eq!(session.phase(), SessionPhase::Discarded);
    assert!(session.route().is_empty());

    let reported = events.try_iter().any(|e| {
        matches!(e, SessionEvent::Discarded { result: Some(ref r) } if r.status == RaceStatus::Abandoned)
    });
    assert!(reported);
}

#[test]
fn test_full_race_is_won_with_splits() {
    let mut session = running(pr_ghost());
    // 4.4 m/s covers 2000 m in about 455 s, ahead of the 480 s ghost
    run_steady(&mut session, 4.4, 470);
    let result = session.stop().cloned().unwrap();

    assert_eq!(result.status, RaceStatus::Won);
    assert!(result.time_difference < -20.);
    assert_eq!(result.completion_percentage, 1.);
    assert_eq!(result.split_comparisons.len(), 2);
    assert!(result.split_comparisons.iter().all(|s| s.difference() < 0.));
    assert!(result.min_gap < 0.);

    let summary = session.summary();
    assert_eq!(summary.ghost_name, "2k PR");
    assert_eq!(summary.pace_splits.len(), 3);
}

#[test]
fn test_stopping_short_loses() {
    let mut session = running(pr_ghost());
    run_steady(&mut session, 5., 100);
    let result = session.stop().cloned().unwrap();
    assert_eq!(result.status, RaceStatus::Lost);
    assert!((result.completion_percentage - 0.25).abs() < 1e-6);
}
