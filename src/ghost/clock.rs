//! Ghost replay clock.
//!
//! Maps session time to the distance the ghost has covered and back. The clock is
//! built once from a [`GhostProfile`] and holds no mutable state afterwards, so the
//! same query always yields the same answer no matter how the session is driven.
//!
//! Both directions interpolate linearly over the profile's (time, distance) series,
//! which always starts at the origin. Past the end of the series the ghost is
//! considered finished: its distance is held, and distances beyond it are mapped to
//! times by extrapolating the ghost's average pace.

use super::{GhostProfile, PaceData};

#[derive(Clone, Copy, Debug, PartialEq)]
struct PacePoint {
    time: f64,
    distance: f64,
}

#[derive(Clone, Debug)]
pub struct GhostClock {
    points: Vec<PacePoint>,
}

impl GhostClock {
    pub fn new(profile: &GhostProfile) -> Self {
        let mut points = vec![PacePoint {
            time: 0.,
            distance: 0.,
        }];
        let series: Vec<PacePoint> = match &profile.pace {
            PaceData::Splits(splits) => splits
                .iter()
                .map(|s| PacePoint {
                    time: s.cumulative_target_time,
                    distance: s.distance_mark,
                })
                .collect(),
            PaceData::Route(route) => route
                .iter()
                .map(|p| PacePoint {
                    time: p.elapsed_seconds,
                    distance: p.cumulative_distance,
                })
                .collect(),
        };

        // Keep the series monotonic even for an unvalidated profile
        for point in series {
            let Some(last) = points.last() else { break };
            if !point.time.is_finite() || !point.distance.is_finite() {
                continue;
            }
            if point.time >= last.time && point.distance >= last.distance {
                if point == *last {
                    continue;
                }
                points.push(point);
            }
        }

        Self { points }
    }

    fn final_point(&self) -> PacePoint {
        self.points.last().copied().unwrap_or(PacePoint {
            time: 0.,
            distance: 0.,
        })
    }

    /// Meters the ghost finishes with
    pub fn final_distance(&self) -> f64 {
        self.final_point().distance
    }

    /// Seconds the ghost needs to finish
    pub fn final_time(&self) -> f64 {
        self.final_point().time
    }

    pub fn is_finished_at(&self, elapsed_seconds: f64) -> bool {
        elapsed_seconds >= self.final_time()
    }

    /// Seconds per meter over the whole ghost, 0 when it covers no distance
    pub fn average_pace(&self) -> f64 {
        let last = self.final_point();
        if last.distance > 0. {
            last.time / last.distance
        } else {
            0.
        }
    }

    /// Distance the ghost has covered after `elapsed_seconds`.
    ///
    /// 0 at or before the start, held at the final distance once the ghost finishes.
    pub fn distance_at_time(&self, elapsed_seconds: f64) -> f64 {
        let last = self.final_point();
        if elapsed_seconds.is_nan() {
            return 0.;
        }
        if elapsed_seconds >= last.time {
            return last.distance;
        }
        if elapsed_seconds <= 0. {
            return 0.;
        }

        // first point strictly after `elapsed_seconds`; always >= 1 here
        let idx = self.points.partition_point(|p| p.time <= elapsed_seconds);
        let (a, b) = (self.points[idx - 1], self.points[idx]);
        let span = b.time - a.time;
        if span <= 0. {
            return b.distance;
        }
        a.distance + (b.distance - a.distance) * (elapsed_seconds - a.time) / span
    }

    /// Time at which the ghost reaches `distance`.
    ///
    /// Distances beyond the ghost's finish are extrapolated at its average pace so a
    /// runner going further still gets a meaningful comparison.
    pub fn time_at_distance(&self, distance: f64) -> f64 {
        let last = self.final_point();
        if !(distance > 0.) || last.distance <= 0. {
            return 0.;
        }
        if distance >= last.distance {
            return last.time + (distance - last.distance) * self.average_pace();
        }

        // first point at or beyond `distance`; index 0 is the origin so idx >= 1
        let idx = self.points.partition_point(|p| p.distance < distance);
        let (a, b) = (self.points[idx - 1], self.points[idx]);
        let span = b.distance - a.distance;
        if span <= 0. {
            return a.time;
        }
        a.time + (b.time - a.time) * (distance - a.distance) / span
    }

    /// Seconds per meter the ghost is running at `elapsed_seconds`, 0 once finished
    pub fn pace_at_time(&self, elapsed_seconds: f64) -> f64 {
        if self.is_finished_at(elapsed_seconds) {
            return 0.;
        }
        let t = elapsed_seconds.max(0.);
        let idx = self.points.partition_point(|p| p.time <= t);
        if idx == 0 || idx >= self.points.len() {
            return 0.;
        }
        let (a, b) = (self.points[idx - 1], self.points[idx]);
        let span = b.distance - a.distance;
        if span > 0. {
            (b.time - a.time) / span
        } else {
            0.
        }
    }
}
