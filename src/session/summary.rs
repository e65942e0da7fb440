use itertools::Itertools;
use serde::{Deserialize, Serialize};
use simple_moving_average::{SMA, SumTreeSMA};
use uom::si::{
    f64::{Length, Time, Velocity},
    length::{kilometer, meter},
    time::second,
    velocity::meter_per_second,
};

use crate::{
    config::MIN_SPLIT_UNIT_M,
    geo::Coordinate,
    tracking::{Route, Waypoint},
};

/// Number of recent route segments averaged into the current pace
pub const PACE_WINDOW: usize = 10;

/// Time spent on one distance unit of the route
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaceSplit {
    /// Length of the split, the configured unit except for a trailing partial split
    pub distance_meters: f64,
    pub time_seconds: f64,
    pub pace_seconds_per_meter: f64,
    /// Climb inside the split, when the route carries altitudes
    pub elevation_gain: Option<f64>,
}

/// Totals handed to persistence alongside the route and the race result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub ghost_name: String,
    pub distance_m: f64,
    pub moving_time_s: f64,
    pub elapsed_time_s: f64,
    /// Seconds per kilometer over moving time
    pub average_pace_s_per_km: Option<f64>,
    pub average_speed_mps: f64,
    pub start: Option<Coordinate>,
    pub end: Option<Coordinate>,
    pub elevation_gain_m: f64,
    pub total_points: usize,
    pub pace_splits: Vec<PaceSplit>,
}

impl RunSummary {
    pub fn new(
        ghost_name: impl Into<String>,
        route: &Route,
        elapsed_time_s: f64,
        moving_time_s: f64,
        split_unit_m: f64,
    ) -> Self {
        let distance = Length::new::<meter>(route.total_distance());
        let moving = Time::new::<second>(moving_time_s);

        let (average_speed_mps, average_pace_s_per_km) =
            if moving_time_s > 0. && distance.get::<meter>() > 0. {
                let speed: Velocity = distance / moving;
                (
                    speed.get::<meter_per_second>(),
                    Some(moving_time_s / distance.get::<kilometer>()),
                )
            } else {
                (0., None)
            };

        Self {
            ghost_name: ghost_name.into(),
            distance_m: distance.get::<meter>(),
            moving_time_s,
            elapsed_time_s,
            average_pace_s_per_km,
            average_speed_mps,
            start: route.first().map(|w| w.coordinate),
            end: route.last().map(|w| w.coordinate),
            elevation_gain_m: route.elevation_gain(),
            total_points: route.len(),
            pace_splits: pace_splits(route, split_unit_m),
        }
    }
}

/// Splits the route into `unit`-meter chunks, timed by the waypoints' own clock.
///
/// Crossing times are interpolated between the two waypoints around each mark. A
/// trailing partial split is included when it spans any time.
pub fn pace_splits(route: &Route, unit: f64) -> Vec<PaceSplit> {
    let Some(first) = route.first() else {
        return Vec::new();
    };
    if !(unit >= MIN_SPLIT_UNIT_M) {
        return Vec::new();
    }

    let has_altitude = route.waypoints().iter().any(|w| w.altitude.is_some());
    let mut splits = Vec::new();
    let mut split_start_time = first.timestamp;
    let mut next_mark = unit;
    let mut gain = 0.;

    for (a, b) in route.waypoints().iter().tuple_windows() {
        if let (Some(alt_a), Some(alt_b)) = (a.altitude, b.altitude) {
            gain += (alt_b - alt_a).max(0.);
        }
        while b.cumulative_distance >= next_mark {
            let crossing = interpolate_time(a, b, next_mark);
            splits.push(make_split(unit, crossing - split_start_time, has_altitude, gain));
            split_start_time = crossing;
            next_mark += unit;
            gain = 0.;
        }
    }

    if let Some(last) = route.last() {
        let remaining = last.cumulative_distance - (next_mark - unit);
        let time = last.timestamp - split_start_time;
        if remaining > 0. && time > 0. {
            splits.push(make_split(remaining, time, has_altitude, gain));
        }
    }

    splits
}

fn interpolate_time(a: &Waypoint, b: &Waypoint, mark: f64) -> f64 {
    let span = b.cumulative_distance - a.cumulative_distance;
    if span <= 0. {
        return b.timestamp;
    }
    a.timestamp + (b.timestamp - a.timestamp) * (mark - a.cumulative_distance) / span
}

fn make_split(distance: f64, time: f64, has_altitude: bool, gain: f64) -> PaceSplit {
    PaceSplit {
        distance_meters: distance,
        time_seconds: time,
        pace_seconds_per_meter: if distance > 0. { time / distance } else { 0. },
        elevation_gain: has_altitude.then_some(gain),
    }
}

/// Rolling pace over the last few accepted route segments
pub struct PaceTracker {
    speeds: SumTreeSMA<f64, f64, PACE_WINDOW>,
    last: Option<(f64, f64)>,
}

impl Default for PaceTracker {
    fn default() -> Self {
        Self {
            speeds: SumTreeSMA::new(),
            last: None,
        }
    }
}

impl PaceTracker {
    pub fn update(&mut self, waypoint: &Waypoint) {
        if let Some((timestamp, distance)) = self.last {
            let dt = waypoint.timestamp - timestamp;
            if dt > 0. {
                self.speeds
                    .add_sample((waypoint.cumulative_distance - distance) / dt);
            }
        }
        self.last = Some((waypoint.timestamp, waypoint.cumulative_distance));
    }

    /// Seconds per kilometer, `None` until two waypoints arrived or while standing still
    pub fn current_pace_s_per_km(&self) -> Option<f64> {
        if self.speeds.get_num_samples() == 0 {
            return None;
        }
        let speed = self.speeds.get_average();
        (speed > 0.).then(|| 1000. / speed)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
