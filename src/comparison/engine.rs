use log::debug;

use crate::{
    config::{EngineConfig, MIN_SPLIT_UNIT_M},
    ghost::GhostClock,
};

use super::{AheadOrBehind, ComparisonSample, RaceResult, RaceStatus, SplitComparison};

/// Compares live progress against the ghost in the distance domain.
///
/// For a runner at distance `d` after moving time `t`, the gap is `t` minus the time
/// the ghost needed to reach `d`. Positive gaps mean the runner is behind.
///
/// The engine never fails: distances that are not finite or go backwards are clamped
/// to the furthest distance seen so far, and an empty or zero-length ghost simply
/// yields zero ghost times.
pub struct ComparisonEngine {
    clock: GhostClock,
    target_distance: f64,
    target_duration: f64,
    split_unit_m: f64,
    tied_threshold_s: f64,
    samples: Vec<ComparisonSample>,
    split_comparisons: Vec<SplitComparison>,
    next_split_mark: f64,
    gap_sum: f64,
    min_gap: Option<f64>,
    max_gap: Option<f64>,
    /// (moving time, distance) when the distance last grew
    last_progress: (f64, f64),
    last_moving_time: f64,
    target_reached_at: Option<f64>,
    result: Option<RaceResult>,
}

impl ComparisonEngine {
    pub fn new(clock: GhostClock, config: &EngineConfig) -> Self {
        let target_distance = clock.final_distance();
        let target_duration = clock.final_time();
        Self {
            clock,
            target_distance,
            target_duration,
            split_unit_m: config.split_unit_m,
            tied_threshold_s: config.tied_threshold_s,
            samples: Vec::new(),
            split_comparisons: Vec::new(),
            next_split_mark: config.split_unit_m,
            gap_sum: 0.,
            min_gap: None,
            max_gap: None,
            last_progress: (0., 0.),
            last_moving_time: 0.,
            target_reached_at: None,
            result: None,
        }
    }

    pub fn clock(&self) -> &GhostClock {
        &self.clock
    }

    pub fn samples(&self) -> &[ComparisonSample] {
        &self.samples
    }

    pub fn latest(&self) -> Option<&ComparisonSample> {
        self.samples.last()
    }

    pub fn split_comparisons(&self) -> &[SplitComparison] {
        &self.split_comparisons
    }

    /// Moving time at which the runner covered the ghost's target distance
    pub fn target_reached_at(&self) -> Option<f64> {
        self.target_reached_at
    }

    pub fn avg_gap(&self) -> f64 {
        if self.samples.is_empty() {
            0.
        } else {
            self.gap_sum / self.samples.len() as f64
        }
    }

    pub fn min_gap(&self) -> f64 {
        self.min_gap.unwrap_or(0.)
    }

    pub fn max_gap(&self) -> f64 {
        self.max_gap.unwrap_or(0.)
    }

    /// Records a comparison sample for the runner's current progress.
    pub fn sample(
        &mut self,
        elapsed_time: f64,
        moving_time: f64,
        user_distance: f64,
    ) -> ComparisonSample {
        let moving_time = sanitize(moving_time).max(self.last_moving_time);
        let elapsed_time = sanitize(elapsed_time).max(moving_time);
        let user_distance = sanitize(user_distance).max(self.last_progress.1);

        self.track_marks(moving_time, user_distance);

        let gap_seconds = moving_time - self.clock.time_at_distance(user_distance);
        let sample = ComparisonSample {
            elapsed_time,
            moving_time,
            user_distance,
            ghost_distance_at_same_time: self.clock.distance_at_time(moving_time),
            gap_seconds,
            ahead_or_behind: AheadOrBehind::from_gap(gap_seconds, self.tied_threshold_s),
        };

        self.gap_sum += gap_seconds;
        self.min_gap = Some(self.min_gap.map_or(gap_seconds, |g| g.min(gap_seconds)));
        self.max_gap = Some(self.max_gap.map_or(gap_seconds, |g| g.max(gap_seconds)));
        self.samples.push(sample.clone());

        sample
    }

    /// Records split crossings and target completion between the last distance change
    /// and this update, interpolating the runner's time at each mark.
    ///
    /// Updates that do not add distance only move the clock, so a tick landing just
    /// before a waypoint does not drag crossings towards the later time.
    fn track_marks(&mut self, moving_time: f64, user_distance: f64) {
        let (prev_time, prev_distance) = self.last_progress;
        let time_at = |mark: f64| {
            if user_distance > prev_distance {
                prev_time + (moving_time - prev_time) * (mark - prev_distance) / (user_distance - prev_distance)
            } else {
                moving_time
            }
        };

        // sub-meter units would never step past large marks
        if self.split_unit_m >= MIN_SPLIT_UNIT_M {
            while user_distance >= self.next_split_mark {
                let mark = self.next_split_mark;
                let split = SplitComparison {
                    distance_mark: mark,
                    user_split_time: time_at(mark),
                    ghost_split_time: self.clock.time_at_distance(mark),
                };
                debug!(
                    "Split at {:.0} m: {:.1} s vs ghost {:.1} s",
                    mark, split.user_split_time, split.ghost_split_time
                );
                self.split_comparisons.push(split);
                self.next_split_mark += self.split_unit_m;
            }
        }

        if self.target_reached_at.is_none()
            && self.target_distance > 0.
            && user_distance >= self.target_distance
        {
            self.target_reached_at = Some(time_at(self.target_distance));
        }

        if user_distance > prev_distance {
            self.last_progress = (moving_time, user_distance);
        }
        self.last_moving_time = moving_time;
    }

    /// Live result while the session runs. Never cached.
    pub fn live_result(&self, moving_time: f64, user_distance: f64) -> RaceResult {
        let user_distance = sanitize(user_distance).max(self.last_progress.1);
        let time_difference = sanitize(moving_time) - self.clock.time_at_distance(user_distance);
        self.build_result(RaceStatus::InProgress, time_difference, user_distance)
    }

    /// Final result when the runner stops. Computed once; later calls return the same
    /// result.
    pub fn finish(&mut self, moving_time: f64, user_distance: f64) -> RaceResult {
        if let Some(result) = &self.result {
            return result.clone();
        }
        let moving_time = sanitize(moving_time).max(self.last_moving_time);
        let user_distance = sanitize(user_distance).max(self.last_progress.1);
        self.track_marks(moving_time, user_distance);

        let (status, time_difference) = match self.target_reached_at {
            Some(reached_at) => {
                let difference = reached_at - self.target_duration;
                let status = if reached_at < self.target_duration {
                    RaceStatus::Won
                } else {
                    RaceStatus::Lost
                };
                (status, difference)
            }
            None => (
                RaceStatus::Lost,
                moving_time - self.clock.time_at_distance(user_distance),
            ),
        };

        let result = self.build_result(status, time_difference, user_distance);
        self.result = Some(result.clone());
        result
    }

    /// Result for a session thrown away by the runner. Sessions that already covered the
    /// ghost's target distance keep their won/lost outcome.
    pub fn abandon(&mut self, moving_time: f64, user_distance: f64) -> RaceResult {
        if let Some(result) = &self.result {
            return result.clone();
        }
        let user_distance = sanitize(user_distance).max(self.last_progress.1);
        if self.target_distance > 0. && user_distance >= self.target_distance {
            return self.finish(moving_time, user_distance);
        }

        let moving_time = sanitize(moving_time).max(self.last_moving_time);
        self.track_marks(moving_time, user_distance);
        let time_difference = moving_time - self.clock.time_at_distance(user_distance);
        let result = self.build_result(RaceStatus::Abandoned, time_difference, user_distance);
        self.result = Some(result.clone());
        result
    }

    pub fn result(&self) -> Option<&RaceResult> {
        self.result.as_ref()
    }

    fn build_result(&self, status: RaceStatus, time_difference: f64, distance: f64) -> RaceResult {
        let completion_percentage = if self.target_distance > 0. {
            (distance / self.target_distance).clamp(0., 1.)
        } else {
            1.
        };
        RaceResult {
            status,
            time_difference,
            distance_completed: distance,
            completion_percentage,
            split_comparisons: self.split_comparisons.clone(),
            avg_gap: self.avg_gap(),
            max_gap: self.max_gap(),
            min_gap: self.min_gap(),
        }
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value.max(0.) } else { 0. }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ghost::{GhostProfile, GhostType, Split};

    fn engine() -> ComparisonEngine {
        let ghost = GhostProfile::from_splits(
            GhostType::PersonalRecord,
            "pr",
            vec![Split::new(1000., 240.), Split::new(2000., 480.)],
        )
        .unwrap();
        ComparisonEngine::new(ghost.clock(), &EngineConfig::default())
    }

    #[test]
    fn test_tied_when_on_ghost_pace() {
        let mut engine = engine();
        let sample = engine.sample(120., 120., 500.);
        assert_eq!(sample.gap_seconds, 0.);
        assert_eq!(sample.ahead_or_behind, AheadOrBehind::Tied);
        assert_eq!(sample.ghost_distance_at_same_time, 500.);
    }

    #[test]
    fn test_behind_when_slower() {
        let mut engine = engine();
        let sample = engine.sample(240., 240., 900.);
        assert!((sample.gap_seconds - 24.).abs() < 1e-9);
        assert_eq!(sample.ahead_or_behind, AheadOrBehind::Behind);
        assert_eq!(sample.ghost_distance_at_same_time, 1000.);
    }

    #[test]
    fn test_ahead_when_faster() {
        let mut engine = engine();
        let sample = engine.sample(200., 200., 1000.);
        assert_eq!(sample.gap_seconds, -40.);
        assert_eq!(sample.ahead_or_behind, AheadOrBehind::Ahead);
    }

    #[test]
    fn test_sub_meter_split_unit_skips_splits() {
        let ghost = GhostProfile::from_target_pace("goal", 2000., 480., 1000.).unwrap();
        let config = EngineConfig {
            split_unit_m: 1e-13,
            ..Default::default()
        };
        let mut engine = ComparisonEngine::new(ghost.clock(), &config);
        engine.sample(10., 10., 2000.);
        let result = engine.finish(10., 2000.);

        assert!(engine.split_comparisons().is_empty());
        assert!(result.split_comparisons.is_empty());
        assert_eq!(result.status, RaceStatus::Won);
    }

    #[test]
    fn test_gap_aggregates() {
        let mut engine = engine();
        engine.sample(100., 100., 500.); // -20
        engine.sample(240., 240., 900.); // +24
        engine.sample(300., 300., 1250.); // 0
        assert_eq!(engine.min_gap(), -20.);
        assert!((engine.max_gap() - 24.).abs() < 1e-9);
        assert!((engine.avg_gap() - 4. / 3.).abs() < 1e-9);
        assert_eq!(engine.samples().len(), 3);
    }

    #[test]
    fn test_splits_recorded_once_with_interpolated_time() {
        let mut engine = engine();
        engine.sample(200., 200., 800.);
        engine.sample(300., 300., 1200.);
        // going backwards is clamped and records nothing new
        engine.sample(310., 310., 1100.);

        let splits = engine.split_comparisons();
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].distance_mark, 1000.);
        assert_eq!(splits[0].user_split_time, 250.);
        assert_eq!(splits[0].ghost_split_time, 240.);
        assert_eq!(splits[0].difference(), 10.);
        assert_eq!(engine.latest().unwrap().user_distance, 1200.);
    }

    #[test]
    fn test_jump_across_several_splits() {
        let mut engine = engine();
        engine.sample(600., 600., 2500.);
        let marks: Vec<f64> = engine
            .split_comparisons()
            .iter()
            .map(|s| s.distance_mark)
            .collect();
        assert_eq!(marks, vec![1000., 2000.]);
    }

    #[test]
    fn test_won_when_faster_than_target() {
        let mut engine = engine();
        engine.sample(230., 230., 1000.);
        engine.sample(470., 470., 2000.);
        let result = engine.finish(475., 2010.);
        assert_eq!(result.status, RaceStatus::Won);
        assert_eq!(result.time_difference, -10.);
        assert_eq!(result.completion_percentage, 1.);
        assert_eq!(result.split_comparisons.len(), 2);
    }

    #[test]
    fn test_lost_when_slower_than_target() {
        let mut engine = engine();
        engine.sample(250., 250., 1000.);
        engine.sample(500., 500., 2000.);
        let result = engine.finish(500., 2000.);
        assert_eq!(result.status, RaceStatus::Lost);
        assert_eq!(result.time_difference, 20.);
    }

    #[test]
    fn test_lost_when_stopping_short() {
        let mut engine = engine();
        engine.sample(240., 240., 900.);
        let result = engine.finish(240., 900.);
        assert_eq!(result.status, RaceStatus::Lost);
        assert!((result.completion_percentage - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_finish_is_computed_once() {
        let mut engine = engine();
        engine.sample(240., 240., 900.);
        let first = engine.finish(240., 900.);
        let second = engine.finish(999., 2000.);
        assert_eq!(first, second);
        assert_eq!(engine.result(), Some(&first));
    }

    #[test]
    fn test_abandoned_before_target() {
        let ghost = GhostProfile::from_target_pace("5k", 5000., 1500., 1000.).unwrap();
        let mut engine = ComparisonEngine::new(ghost.clock(), &EngineConfig::default());
        engine.sample(600., 600., 1800.);
        let result = engine.abandon(600., 1800.);
        assert_eq!(result.status, RaceStatus::Abandoned);
        assert_eq!(result.distance_completed, 1800.);
        assert_eq!(result.completion_percentage, 0.36);
        assert_eq!(result.split_comparisons.len(), 1);
    }

    #[test]
    fn test_abandon_after_target_keeps_outcome() {
        let mut engine = engine();
        engine.sample(470., 470., 2000.);
        let result = engine.abandon(480., 2000.);
        assert_eq!(result.status, RaceStatus::Won);
    }

    #[test]
    fn test_live_result_is_in_progress() {
        let mut engine = engine();
        engine.sample(120., 120., 500.);
        let live = engine.live_result(120., 500.);
        assert_eq!(live.status, RaceStatus::InProgress);
        assert_eq!(live.completion_percentage, 0.25);
        assert!(engine.result().is_none());
    }

    #[test]
    fn test_no_samples_and_garbage_input() {
        let mut engine = engine();
        let result = engine.live_result(0., 0.);
        assert_eq!(result.avg_gap, 0.);
        assert_eq!(result.min_gap, 0.);
        assert_eq!(result.max_gap, 0.);

        let sample = engine.sample(f64::NAN, f64::INFINITY, -5.);
        assert_eq!(sample.user_distance, 0.);
        assert_eq!(sample.moving_time, 0.);
        assert_eq!(sample.gap_seconds, 0.);
    }

    #[test]
    fn test_zero_duration_ghost() {
        let ghost =
            GhostProfile::from_splits(GhostType::CustomGoal, "instant", vec![Split::new(1000., 0.)])
                .unwrap();
        let mut engine = ComparisonEngine::new(ghost.clock(), &EngineConfig::default());
        let sample = engine.sample(10., 10., 50.);
        assert_eq!(sample.gap_seconds, 10.);
        let result = engine.finish(10., 50.);
        assert_eq!(result.status, RaceStatus::Lost);
    }
}
