// Ghost pacing profiles and the replay clock that drives them

pub mod clock;
pub mod source;

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    WispError,
    config::MIN_SPLIT_UNIT_M,
    geo::{Coordinate, polyline},
    tracking::Route,
};

pub use clock::GhostClock;
pub use source::{FileGhostSource, GhostDataSource, StaticGhostSource};

/// Where a ghost's pacing comes from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GhostType {
    PersonalRecord,
    StravaFriend,
    CustomGoal,
    PastRun,
}

impl fmt::Display for GhostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GhostType::PersonalRecord => write!(f, "Personal Record"),
            GhostType::StravaFriend => write!(f, "Friend Activity"),
            GhostType::CustomGoal => write!(f, "Custom Goal"),
            GhostType::PastRun => write!(f, "Past Run"),
        }
    }
}

/// A checkpoint the ghost reaches at a given cumulative time
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Split {
    /// Meters from the start
    pub distance_mark: f64,
    /// Seconds from the start
    pub cumulative_target_time: f64,
}

impl Split {
    pub fn new(distance_mark: f64, cumulative_target_time: f64) -> Self {
        Self {
            distance_mark,
            cumulative_target_time,
        }
    }
}

/// One sample of a recorded reference route
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GhostRoutePoint {
    pub elapsed_seconds: f64,
    pub cumulative_distance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaceData {
    Splits(Vec<Split>),
    Route(Vec<GhostRoutePoint>),
}

/// Immutable pacing target a live run is compared against.
///
/// Loaded once before the countdown and never mutated by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GhostProfile {
    pub ghost_type: GhostType,
    pub name: String,
    /// Meters the ghost covers
    pub target_distance: f64,
    /// Seconds the ghost needs to cover `target_distance`
    pub target_duration: f64,
    pub pace: PaceData,
}

impl GhostProfile {
    /// Builds a split-based ghost. The last split sets the target distance and duration.
    pub fn from_splits(
        ghost_type: GhostType,
        name: impl Into<String>,
        splits: Vec<Split>,
    ) -> Result<Self, WispError> {
        let last = *splits.last().ok_or_else(|| WispError::GhostProfileInvalid {
            reason: "ghost has no splits".to_string(),
        })?;
        let profile = Self {
            ghost_type,
            name: name.into(),
            target_distance: last.distance_mark,
            target_duration: last.cumulative_target_time,
            pace: PaceData::Splits(splits),
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Even-paced goal ghost with a split every `split_unit` meters.
    pub fn from_target_pace(
        name: impl Into<String>,
        target_distance: f64,
        target_duration: f64,
        split_unit: f64,
    ) -> Result<Self, WispError> {
        if !(target_distance > 0.)
            || !(target_duration >= 0.)
            || !(split_unit >= MIN_SPLIT_UNIT_M)
        {
            return Err(WispError::GhostProfileInvalid {
                reason: format!(
                    "goal needs positive distance and a unit of at least a meter, got {target_distance} m in {target_duration} s every {split_unit} m"
                ),
            });
        }
        let mut splits: Vec<Split> = (1..)
            .map(|i| i as f64 * split_unit)
            .take_while(|mark| *mark < target_distance)
            .map(|mark| Split::new(mark, mark * target_duration / target_distance))
            .collect();
        splits.push(Split::new(target_distance, target_duration));

        Self::from_splits(GhostType::CustomGoal, name, splits)
    }

    /// Replays a recorded route 1:1 against elapsed time.
    pub fn from_route(
        ghost_type: GhostType,
        name: impl Into<String>,
        route: &Route,
    ) -> Result<Self, WispError> {
        let start = route.first().ok_or_else(|| WispError::GhostProfileInvalid {
            reason: "reference route is empty".to_string(),
        })?;
        let points: Vec<GhostRoutePoint> = route
            .waypoints()
            .iter()
            .map(|w| GhostRoutePoint {
                elapsed_seconds: w.timestamp - start.timestamp,
                cumulative_distance: w.cumulative_distance,
            })
            .collect();

        Self::from_route_points(ghost_type, name, points)
    }

    pub fn from_route_points(
        ghost_type: GhostType,
        name: impl Into<String>,
        points: Vec<GhostRoutePoint>,
    ) -> Result<Self, WispError> {
        let last = *points.last().ok_or_else(|| WispError::GhostProfileInvalid {
            reason: "reference route is empty".to_string(),
        })?;
        let profile = Self {
            ghost_type,
            name: name.into(),
            target_distance: last.cumulative_distance,
            target_duration: last.elapsed_seconds,
            pace: PaceData::Route(points),
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Builds a ghost from a summary activity that only carries an encoded polyline and
    /// a moving time. Time is spread along the route in proportion to distance.
    pub fn from_polyline_activity(
        ghost_type: GhostType,
        name: impl Into<String>,
        encoded_polyline: &str,
        moving_time: f64,
    ) -> Result<Self, WispError> {
        let coordinates = polyline::decode(encoded_polyline, polyline::DEFAULT_PRECISION)?;
        Self::from_constant_pace_path(ghost_type, name, &coordinates, moving_time)
    }

    pub fn from_constant_pace_path(
        ghost_type: GhostType,
        name: impl Into<String>,
        coordinates: &[Coordinate],
        moving_time: f64,
    ) -> Result<Self, WispError> {
        let mut cumulative = vec![0.];
        for (a, b) in coordinates.iter().tuple_windows() {
            let last = cumulative.last().copied().unwrap_or(0.);
            cumulative.push(last + a.distance_to(b));
        }
        let total = cumulative.last().copied().unwrap_or(0.);
        if coordinates.len() < 2 || !(total > 0.) {
            return Err(WispError::GhostProfileInvalid {
                reason: "activity path covers no distance".to_string(),
            });
        }

        let points = cumulative
            .into_iter()
            .map(|distance| GhostRoutePoint {
                elapsed_seconds: moving_time * distance / total,
                cumulative_distance: distance,
            })
            .collect();
        Self::from_route_points(ghost_type, name, points)
    }

    /// Average pace in seconds per meter, 0 for a ghost that covers no distance
    pub fn average_pace(&self) -> f64 {
        if self.target_distance > 0. {
            self.target_duration / self.target_distance
        } else {
            0.
        }
    }

    /// Rejects profiles the replay clock cannot honor: empty or non-monotonic pace data,
    /// negative or non-finite values, or targets that disagree with the pace data.
    pub fn validate(&self) -> Result<(), WispError> {
        let invalid = |reason: String| Err(WispError::GhostProfileInvalid { reason });

        if !self.target_distance.is_finite() || self.target_distance <= 0. {
            return invalid(format!("target distance {} is not positive", self.target_distance));
        }
        if !self.target_duration.is_finite() || self.target_duration < 0. {
            return invalid(format!("target duration {} is negative", self.target_duration));
        }

        // (time, distance) pairs in replay order
        let series: Vec<(f64, f64)> = match &self.pace {
            PaceData::Splits(splits) => splits
                .iter()
                .map(|s| (s.cumulative_target_time, s.distance_mark))
                .collect(),
            PaceData::Route(points) => points
                .iter()
                .map(|p| (p.elapsed_seconds, p.cumulative_distance))
                .collect(),
        };
        let Some(&(last_time, last_distance)) = series.last() else {
            return invalid("ghost has no pace data".to_string());
        };

        for (i, &(time, distance)) in series.iter().enumerate() {
            if !time.is_finite() || !distance.is_finite() || time < 0. || distance < 0. {
                return invalid(format!("pace entry {i} has an invalid value"));
            }
        }
        for (i, (a, b)) in series.iter().tuple_windows().enumerate() {
            if b.0 < a.0 {
                return invalid(format!("pace entry {} goes back in time", i + 1));
            }
            let distance_ok = match self.pace {
                // split marks must be distinct to be interpolated
                PaceData::Splits(_) => b.1 > a.1,
                PaceData::Route(_) => b.1 >= a.1,
            };
            if !distance_ok {
                return invalid(format!("pace entry {} goes back in distance", i + 1));
            }
        }

        if (last_distance - self.target_distance).abs() > 1e-6
            || (last_time - self.target_duration).abs() > 1e-6
        {
            return invalid("targets do not match the last pace entry".to_string());
        }

        Ok(())
    }

    pub fn clock(&self) -> GhostClock {
        GhostClock::new(self)
    }

    /// The ghost's time at every full `unit` meters of its target distance. Empty for
    /// units under a meter.
    pub fn schedule(&self, unit: f64) -> Vec<Split> {
        if !(unit >= MIN_SPLIT_UNIT_M) {
            return Vec::new();
        }
        let clock = self.clock();
        (1..)
            .map(|i| i as f64 * unit)
            .take_while(|mark| *mark <= self.target_distance)
            .map(|mark| Split::new(mark, clock.time_at_distance(mark)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::offset_north;
    use crate::tracking::Waypoint;

    #[test]
    fn test_from_splits_sets_targets() {
        let ghost = GhostProfile::from_splits(
            GhostType::PersonalRecord,
            "5k PR",
            vec![Split::new(1000., 240.), Split::new(2000., 480.)],
        )
        .unwrap();
        assert_eq!(ghost.target_distance, 2000.);
        assert_eq!(ghost.target_duration, 480.);
        assert_eq!(ghost.average_pace(), 0.24);
    }

    #[test]
    fn test_non_monotonic_splits_rejected() {
        let result = GhostProfile::from_splits(
            GhostType::StravaFriend,
            "bad",
            vec![Split::new(1000., 240.), Split::new(900., 480.)],
        );
        assert!(matches!(result, Err(WispError::GhostProfileInvalid { .. })));

        let result = GhostProfile::from_splits(
            GhostType::StravaFriend,
            "bad",
            vec![Split::new(1000., 240.), Split::new(2000., 200.)],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_splits_rejected() {
        assert!(GhostProfile::from_splits(GhostType::CustomGoal, "none", vec![]).is_err());
    }

    #[test]
    fn test_mismatched_targets_rejected() {
        let mut ghost = GhostProfile::from_target_pace("goal", 5000., 1500., 1000.).unwrap();
        ghost.target_duration = 1400.;
        assert!(ghost.validate().is_err());
    }

    #[test]
    fn test_target_pace_splits() {
        let ghost = GhostProfile::from_target_pace("sub 25", 5000., 1500., 1000.).unwrap();
        let PaceData::Splits(splits) = &ghost.pace else {
            panic!("expected splits");
        };
        assert_eq!(splits.len(), 5);
        assert_eq!(splits[0], Split::new(1000., 300.));
        assert_eq!(splits[4], Split::new(5000., 1500.));
        assert_eq!(ghost.ghost_type, GhostType::CustomGoal);
    }

    #[test]
    fn test_target_pace_rejects_sub_meter_unit() {
        assert!(matches!(
            GhostProfile::from_target_pace("tiny", 5000., 1500., 1e-13),
            Err(WispError::GhostProfileInvalid { .. })
        ));
    }

    #[test]
    fn test_schedule_follows_unit() {
        let ghost = GhostProfile::from_target_pace("5k", 5000., 1500., 1000.).unwrap();
        let by_mile = ghost.schedule(1609.344);
        assert_eq!(by_mile.len(), 3);
        assert!((by_mile[0].cumulative_target_time - 482.8032).abs() < 1e-6);

        assert_eq!(ghost.schedule(500.).len(), 10);
        assert!(ghost.schedule(0.5).is_empty());
    }

    #[test]
    fn test_target_pace_with_partial_last_split() {
        let ghost = GhostProfile::from_target_pace("half", 2500., 750., 1000.).unwrap();
        let PaceData::Splits(splits) = &ghost.pace else {
            panic!("expected splits");
        };
        assert_eq!(splits.len(), 3);
        assert_eq!(splits[2], Split::new(2500., 750.));
    }

    #[test]
    fn test_from_route_is_relative_to_first_waypoint() {
        let origin = Coordinate::new(40., -3.);
        let route = Route::from_waypoints(
            (0..4)
                .map(|i| Waypoint {
                    coordinate: offset_north(&origin, i as f64 * 100.),
                    timestamp: 1000. + i as f64 * 25.,
                    cumulative_distance: 0.,
                    altitude: None,
                })
                .collect(),
        );
        let ghost = GhostProfile::from_route(GhostType::PastRun, "tuesday", &route).unwrap();
        assert!((ghost.target_distance - 300.).abs() < 1e-6);
        assert_eq!(ghost.target_duration, 75.);
    }

    #[test]
    fn test_from_empty_route_rejected() {
        assert!(GhostProfile::from_route(GhostType::PastRun, "empty", &Route::default()).is_err());
    }

    #[test]
    fn test_from_polyline_activity_spreads_time_by_distance() {
        let ghost = GhostProfile::from_polyline_activity(
            GhostType::StravaFriend,
            "friend",
            "_p~iF~ps|U_ulLnnqC_mqNvxq`@",
            3600.,
        )
        .unwrap();
        let PaceData::Route(points) = &ghost.pace else {
            panic!("expected route");
        };
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].elapsed_seconds, 0.);
        assert!((points[2].elapsed_seconds - 3600.).abs() < 1e-6);
        let pace_a = points[1].elapsed_seconds / points[1].cumulative_distance;
        let pace_b = points[2].elapsed_seconds / points[2].cumulative_distance;
        assert!((pace_a - pace_b).abs() < 1e-9);
    }

    #[test]
    fn test_single_point_polyline_rejected() {
        let single = polyline::encode(&[Coordinate::new(1., 1.)], polyline::DEFAULT_PRECISION);
        assert!(
            GhostProfile::from_polyline_activity(GhostType::StravaFriend, "x", &single, 60.)
                .is_err()
        );
    }
}
