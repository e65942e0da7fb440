use log::{debug, info};

use crate::{
    WispError,
    comparison::RaceResult,
    ghost::GhostProfile,
    tracking::{LocationProvider, LocationUpdate},
};

use super::{RunSession, SessionPhase};

const CLOCK_EPSILON: f64 = 1e-9;

/// Runs a whole session offline: fixes are fed in timestamp order and the session clock
/// is ticked until it catches up with each fix, so a recording replays exactly as it
/// would have live.
///
/// The session is stopped when the provider runs dry. Returns the final race result.
pub fn replay(
    session: &mut RunSession,
    ghost: GhostProfile,
    provider: &mut dyn LocationProvider,
) -> Result<Option<RaceResult>, WispError> {
    provider.start()?;
    session.start_countdown(ghost)?;
    while session.phase() == SessionPhase::Countdown {
        session.tick();
    }

    let dt = session.config().tick_seconds();
    let mut ticks: u64 = 0;
    let mut origin: Option<f64> = None;
    let mut fixes = 0usize;

    while let Some(update) = provider.next_update()? {
        match update {
            LocationUpdate::Fix(fix) => {
                let start = *origin.get_or_insert(fix.timestamp);
                let offset = fix.timestamp - start;
                if dt > 0. {
                    while (ticks + 1) as f64 * dt <= offset + CLOCK_EPSILON {
                        session.tick();
                        ticks += 1;
                    }
                }
                session.on_fix(&fix);
                fixes += 1;
            }
            LocationUpdate::Permission(state) => session.on_permission(state),
            LocationUpdate::Fault(fault) => session.on_provider_fault(fault),
        }
    }
    provider.stop();

    debug!("Replayed {} fixes over {} ticks", fixes, ticks);
    let result = session.stop().cloned();
    if let Some(result) = &result {
        info!(
            "Replay finished: {} ({:+.1} s, {:.0}% of the ghost's distance)",
            result.status,
            result.time_difference,
            result.completion_percentage * 100.
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        comparison::RaceStatus,
        config::EngineConfig,
        geo::{Coordinate, offset_north},
        ghost::{GhostType, Split},
        tracking::{LocationFix, MockLocationProvider, PermissionState},
    };

    fn steady_fixes(speed_mps: f64, seconds: usize) -> Vec<LocationFix> {
        let origin = Coordinate::new(35.6762, 139.6503);
        (0..=seconds / 2)
            .map(|i| {
                let t = (i * 2) as f64;
                LocationFix::new(offset_north(&origin, t * speed_mps), 1_000. + t, 4.)
            })
            .collect()
    }

    fn ghost() -> GhostProfile {
        GhostProfile::from_splits(GhostType::PersonalRecord, "pr", vec![Split::new(1000., 250.)])
            .unwrap()
    }

    #[test]
    fn test_replay_faster_than_ghost_wins() {
        let mut session = RunSession::new(EngineConfig::default());
        let mut provider = MockLocationProvider::from_fixes(steady_fixes(5., 220));
        let result = replay(&mut session, ghost(), &mut provider).unwrap().unwrap();

        assert_eq!(result.status, RaceStatus::Won);
        // 1000 m at 5 m/s
        assert!((result.time_difference - -50.).abs() < 1e-3);
        assert_eq!(session.state().moving_time, 220.);
        assert_eq!(session.phase(), SessionPhase::Finished);
    }

    #[test]
    fn test_replay_pauses_on_revoked_permission() {
        let mut updates: Vec<LocationUpdate> = steady_fixes(4., 40)
            .into_iter()
            .map(LocationUpdate::Fix)
            .collect();
        updates.insert(10, LocationUpdate::Permission(PermissionState::Denied));

        let mut session = RunSession::new(EngineConfig::default());
        let mut provider = MockLocationProvider::from_updates(updates);
        let result = replay(&mut session, ghost(), &mut provider).unwrap().unwrap();

        assert_eq!(result.status, RaceStatus::Lost);
        // fixes after the revocation were not recorded
        assert_eq!(session.route().len(), 10);
        assert_eq!(session.state().moving_time, 18.);
    }

    #[test]
    fn test_replay_refuses_unauthorized_provider() {
        let mut session = RunSession::new(EngineConfig::default());
        let mut provider =
            MockLocationProvider::from_fixes(steady_fixes(4., 10)).with_permission(PermissionState::Denied);
        assert!(matches!(
            replay(&mut session, ghost(), &mut provider),
            Err(WispError::PermissionError { .. })
        ));
        assert_eq!(session.phase(), SessionPhase::Idle);
    }
}
