use std::sync::mpsc::{Receiver, Sender, channel};

use log::{debug, error, info, warn};

use crate::{
    WispError,
    comparison::{ComparisonEngine, ComparisonSample, RaceResult},
    config::EngineConfig,
    ghost::{GhostDataSource, GhostProfile},
    persistence::{PersistenceAdapter, SaveRequest, SavedRunId},
    tracking::{LocationFix, PermissionState, ProviderFault, Route, RouteBuilder, Waypoint},
};

use super::{
    DegradedReason, SessionEvent, SessionPhase, SessionSnapshot, SessionState,
    summary::{PaceTracker, RunSummary},
};

/// Lifecycle of one run against one ghost.
///
/// `Idle -> Countdown -> Running <-> Paused -> Finished -> Saved | Discarded`
///
/// The session is deterministic: time only advances through [`RunSession::tick`] and the
/// route only grows through [`RunSession::on_fix`]. Wall-clock timers and sensor threads
/// live in [`super::LiveSession`], which serializes everything into a single owner of
/// this struct.
pub struct RunSession {
    config: EngineConfig,
    state: SessionState,
    ghost: Option<GhostProfile>,
    route: RouteBuilder,
    comparison: Option<ComparisonEngine>,
    pace: PaceTracker,
    result: Option<RaceResult>,
    /// Set when a waypoint produced a sample since the last tick
    sampled_since_tick: bool,
    listeners: Vec<Sender<SessionEvent>>,
}

impl RunSession {
    pub fn new(config: EngineConfig) -> Self {
        let route = RouteBuilder::new(&config);
        Self {
            config,
            state: SessionState::default(),
            ghost: None,
            route,
            comparison: None,
            pace: PaceTracker::default(),
            result: None,
            sampled_since_tick: false,
            listeners: Vec::new(),
        }
    }

    /// Registers a listener for session events. Dropped receivers are pruned on the
    /// next event.
    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (sender, receiver) = channel();
        self.listeners.push(sender);
        receiver
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn ghost(&self) -> Option<&GhostProfile> {
        self.ghost.as_ref()
    }

    /// Current route. Frozen once the session finishes, empty after a discard.
    pub fn route(&self) -> Route {
        self.route.snapshot()
    }

    pub fn samples(&self) -> &[ComparisonSample] {
        self.comparison
            .as_ref()
            .map(|c| c.samples())
            .unwrap_or(&[])
    }

    pub fn result(&self) -> Option<&RaceResult> {
        self.result.as_ref()
    }

    pub fn current_pace_s_per_km(&self) -> Option<f64> {
        self.pace.current_pace_s_per_km()
    }

    /// Where the ghost is now. Keeps answering while degraded or paused.
    pub fn ghost_distance(&self) -> f64 {
        self.comparison
            .as_ref()
            .map(|c| c.clock().distance_at_time(self.state.moving_time))
            .unwrap_or(0.)
    }

    /// Result so far while running; the final result once finished.
    pub fn live_result(&self) -> Option<RaceResult> {
        if let Some(result) = &self.result {
            return Some(result.clone());
        }
        match self.state.phase {
            SessionPhase::Running | SessionPhase::Paused => self
                .comparison
                .as_ref()
                .map(|c| c.live_result(self.state.moving_time, self.state.current_distance)),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.clone(),
            route: self.route.shared(),
            latest_sample: self
                .comparison
                .as_ref()
                .and_then(|c| c.latest().cloned()),
            ghost_distance: self.ghost_distance(),
            current_pace_s_per_km: self.current_pace_s_per_km(),
            live_result: self.live_result(),
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::new(
            self.ghost.as_ref().map(|g| g.name.as_str()).unwrap_or_default(),
            &self.route.snapshot(),
            self.state.elapsed_time,
            self.state.moving_time,
            self.config.split_unit_m,
        )
    }

    /// Loads the ghost from `source` and starts the countdown.
    pub fn start_with(&mut self, source: &mut dyn GhostDataSource) -> Result<(), WispError> {
        let ghost = source.load_ghost()?;
        self.start_countdown(ghost)
    }

    /// Validates the config and the ghost, then enters the countdown. Either being
    /// invalid leaves the session idle, so running can never start.
    pub fn start_countdown(&mut self, ghost: GhostProfile) -> Result<(), WispError> {
        self.require(&[SessionPhase::Idle], "start a countdown")?;
        self.config.validate()?;
        ghost.validate()?;

        info!(
            "Starting countdown against '{}' ({}, {:.0} m)",
            ghost.name, ghost.ghost_type, ghost.target_distance
        );
        self.ghost = Some(ghost);
        self.state.countdown_remaining = self.config.countdown_ticks;
        self.state.degraded = None;
        self.transition(SessionPhase::Countdown);
        if self.state.countdown_remaining == 0 {
            self.begin_running();
        }
        Ok(())
    }

    fn begin_running(&mut self) {
        let Some(ghost) = &self.ghost else {
            error!("Countdown completed without a ghost");
            return;
        };
        self.route.reset();
        self.pace.reset();
        self.result = None;
        self.comparison = Some(ComparisonEngine::new(ghost.clock(), &self.config));
        self.state.elapsed_time = 0.;
        self.state.moving_time = 0.;
        self.state.current_distance = 0.;
        self.sampled_since_tick = false;
        self.transition(SessionPhase::Running);

        // degraded during the countdown: start out paused instead of tracking
        let hold = match &self.state.degraded {
            Some(DegradedReason::PermissionRevoked(_)) => true,
            Some(_) => self.config.auto_pause_on_degraded,
            None => false,
        };
        if hold {
            warn!("Starting paused, recording is degraded");
            self.pause();
        }
    }

    /// Advances the session clock by one tick.
    pub fn tick(&mut self) {
        let dt = self.config.tick_seconds();
        match self.state.phase {
            SessionPhase::Countdown => {
                self.state.countdown_remaining = self.state.countdown_remaining.saturating_sub(1);
                self.emit(SessionEvent::CountdownTick {
                    remaining: self.state.countdown_remaining,
                });
                if self.state.countdown_remaining == 0 {
                    self.begin_running();
                }
            }
            SessionPhase::Running => {
                self.state.elapsed_time += dt;
                self.state.moving_time += dt;
                self.emit(SessionEvent::Tick {
                    elapsed_time: self.state.elapsed_time,
                    moving_time: self.state.moving_time,
                });
                // keep the gap fresh when no waypoint came in during this tick
                if !self.sampled_since_tick {
                    self.sample_comparison();
                }
                self.sampled_since_tick = false;
            }
            SessionPhase::Paused => {
                if self.config.count_elapsed_while_paused {
                    self.state.elapsed_time += dt;
                    self.emit(SessionEvent::Tick {
                        elapsed_time: self.state.elapsed_time,
                        moving_time: self.state.moving_time,
                    });
                }
            }
            _ => {}
        }
    }

    /// Offers a location fix to the route. Only fixes arriving while running count.
    pub fn on_fix(&mut self, fix: &LocationFix) -> Option<Waypoint> {
        if self.state.phase != SessionPhase::Running {
            return None;
        }
        let waypoint = self.route.ingest(fix)?;
        self.state.current_distance = waypoint.cumulative_distance;
        self.pace.update(&waypoint);
        self.emit(SessionEvent::WaypointAccepted(waypoint.clone()));
        self.sample_comparison();
        self.sampled_since_tick = true;
        Some(waypoint)
    }

    fn sample_comparison(&mut self) {
        let Some(comparison) = self.comparison.as_mut() else {
            return;
        };
        let sample = comparison.sample(
            self.state.elapsed_time,
            self.state.moving_time,
            self.state.current_distance,
        );
        self.emit(SessionEvent::Comparison(sample));
    }

    /// Reacts to a permission change. Losing permission pauses tracking and flags the
    /// session as degraded; regaining it clears the flag but does not resume.
    pub fn on_permission(&mut self, permission: PermissionState) {
        if permission.revokes_tracking() {
            if !self.state.phase.is_live() {
                return;
            }
            warn!("Location permission {}, stopping tracking", permission);
            self.mark_degraded(DegradedReason::PermissionRevoked(permission));
            self.pause();
        } else if permission.is_authorized()
            && matches!(
                self.state.degraded,
                Some(DegradedReason::PermissionRevoked(_))
            )
        {
            info!("Location permission restored ({})", permission);
            self.state.degraded = None;
        }
    }

    /// Records a provider fault. Pauses when configured to.
    pub fn on_provider_fault(&mut self, fault: ProviderFault) {
        if !self.state.phase.is_live() {
            return;
        }
        warn!("Degraded recording: {}", fault);
        self.mark_degraded(fault.into());
        if self.config.auto_pause_on_degraded {
            self.pause();
        }
    }

    /// The provider stopped delivering updates.
    pub fn on_provider_ended(&mut self) {
        if matches!(
            self.state.phase,
            SessionPhase::Running | SessionPhase::Paused
        ) {
            warn!("Location stream ended while the session was live");
            self.mark_degraded(DegradedReason::ProviderEnded);
        }
    }

    fn mark_degraded(&mut self, reason: DegradedReason) {
        if self.state.degraded.as_ref() != Some(&reason) {
            self.state.degraded = Some(reason.clone());
            self.emit(SessionEvent::Degraded(reason));
        }
    }

    /// Pauses a running session. Has no effect in any other phase.
    pub fn pause(&mut self) {
        if self.state.phase == SessionPhase::Running {
            self.transition(SessionPhase::Paused);
        }
    }

    /// Resumes a paused session. Has no effect in any other phase.
    pub fn resume(&mut self) {
        if self.state.phase == SessionPhase::Paused {
            self.sampled_since_tick = false;
            self.transition(SessionPhase::Running);
        }
    }

    /// Ends the run, freezes the route and computes the race result.
    ///
    /// Stopping during the countdown cancels back to idle. Calling it again after the
    /// session finished changes nothing.
    pub fn stop(&mut self) -> Option<&RaceResult> {
        match self.state.phase {
            SessionPhase::Countdown => {
                self.ghost = None;
                self.state = SessionState::default();
                self.transition_from(SessionPhase::Countdown, SessionPhase::Idle);
                None
            }
            SessionPhase::Running | SessionPhase::Paused => {
                self.route.freeze();
                let result = self.comparison.as_mut().map(|c| {
                    c.finish(self.state.moving_time, self.state.current_distance)
                });
                if let Some(result) = &result {
                    info!(
                        "Run finished: {} by {:+.1} s over {:.0} m",
                        result.status, result.time_difference, result.distance_completed
                    );
                    self.emit(SessionEvent::Finished(result.clone()));
                }
                self.result = result;
                self.transition(SessionPhase::Finished);
                self.result.as_ref()
            }
            _ => self.result.as_ref(),
        }
    }

    /// Collects what persistence needs. The session stays finished until
    /// [`RunSession::mark_saved`] confirms the write.
    pub fn prepare_save(&self) -> Result<SaveRequest, WispError> {
        self.require(&[SessionPhase::Finished], "save")?;
        let result = self
            .result
            .clone()
            .ok_or_else(|| WispError::PersistenceFailure {
                reason: "no race result to save".to_string(),
            })?;
        Ok(SaveRequest {
            route: self.route.snapshot(),
            result,
            summary: self.summary(),
        })
    }

    pub fn mark_saved(&mut self, id: SavedRunId) {
        if self.state.phase == SessionPhase::Finished {
            info!("Run saved as {}", id);
            self.emit(SessionEvent::Saved(id));
            self.transition(SessionPhase::Saved);
        }
    }

    /// Keeps the finished session in memory after a failed save so the caller can
    /// retry or export it.
    pub fn mark_save_failed(&mut self, error: &WispError) {
        error!("Could not save run: {}", error);
        self.emit(SessionEvent::SaveFailed {
            reason: error.to_string(),
        });
    }

    /// Hands the finished run to `adapter` on the calling thread. No retries.
    pub fn save(&mut self, adapter: &mut dyn PersistenceAdapter) -> Result<SavedRunId, WispError> {
        let request = self.prepare_save()?;
        match adapter.save(&request.route, &request.result, &request.summary) {
            Ok(id) => {
                self.mark_saved(id.clone());
                Ok(id)
            }
            Err(e) => {
                self.mark_save_failed(&e);
                Err(WispError::PersistenceFailure {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Throws the run away and purges its route and result.
    ///
    /// Discarding mid-run returns the abandoned result for reporting before it is
    /// purged; discarding a finished run returns its final result. Discarding during the
    /// countdown cancels back to idle.
    pub fn discard(&mut self) -> Option<RaceResult> {
        let result = match self.state.phase {
            SessionPhase::Countdown => {
                self.stop();
                return None;
            }
            SessionPhase::Running | SessionPhase::Paused => {
                self.route.freeze();
                self.comparison
                    .as_mut()
                    .map(|c| c.abandon(self.state.moving_time, self.state.current_distance))
            }
            SessionPhase::Finished => self.result.clone(),
            _ => return None,
        };

        if let Some(result) = &result {
            debug!(
                "Discarding run: {} at {:.0} m ({:.0}%)",
                result.status,
                result.distance_completed,
                result.completion_percentage * 100.
            );
        }
        self.route.reset();
        self.route.freeze();
        self.result = None;
        self.comparison = None;
        self.pace.reset();
        self.emit(SessionEvent::Discarded {
            result: result.clone(),
        });
        self.transition(SessionPhase::Discarded);
        result
    }

    /// Returns a saved or discarded session to idle for the next run.
    pub fn reset(&mut self) -> Result<(), WispError> {
        self.require(&[SessionPhase::Saved, SessionPhase::Discarded], "reset")?;
        let from = self.state.phase;
        self.ghost = None;
        self.route.reset();
        self.comparison = None;
        self.result = None;
        self.pace.reset();
        self.state = SessionState::default();
        self.transition_from(from, SessionPhase::Idle);
        Ok(())
    }

    fn require(&self, allowed: &[SessionPhase], action: &str) -> Result<(), WispError> {
        if allowed.contains(&self.state.phase) {
            Ok(())
        } else {
            Err(WispError::InvalidSessionTransition {
                from: self.state.phase.to_string(),
                action: action.to_string(),
            })
        }
    }

    fn transition(&mut self, to: SessionPhase) {
        let from = self.state.phase;
        self.state.phase = to;
        self.transition_from(from, to);
    }

    fn transition_from(&mut self, from: SessionPhase, to: SessionPhase) {
        self.state.phase = to;
        if from != to {
            debug!("Session {} -> {}", from, to);
            self.emit(SessionEvent::PhaseChanged { from, to });
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        self.listeners
            .retain(|listener| listener.send(event.clone()).is_ok());
    }
}
