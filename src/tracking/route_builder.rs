use std::sync::Arc;

use log::trace;

use crate::config::EngineConfig;

use super::{LocationFix, Route, Waypoint};

/// Reason a fix did not become a waypoint
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FixRejection {
    /// Accuracy radius above the configured maximum, or not a usable number
    LowAccuracy,
    /// Coordinate or timestamp is not a usable number
    Malformed,
    /// Closer than the minimum distance to the last waypoint
    TooClose,
    /// Sooner than the minimum interval after the last waypoint
    TooSoon,
    /// Timestamp not after the last waypoint
    OutOfOrder,
    /// The route has been frozen
    Frozen,
}

/// Filters raw fixes into a distance-accumulating route.
///
/// A fix is accepted when it is accurate enough and, unless it is the first one, both far
/// enough and late enough after the last accepted waypoint. The dual threshold debounces
/// GPS jitter; slow, sharp turns can be under-sampled as a result.
pub struct RouteBuilder {
    max_accuracy_m: f64,
    min_distance_m: f64,
    min_interval_s: f64,
    waypoints: Vec<Waypoint>,
    /// Published copy, rebuilt only when a waypoint is added or the route is cleared
    shared: Arc<Route>,
    frozen: bool,
}

impl RouteBuilder {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_thresholds(
            config.max_horizontal_accuracy_m,
            config.min_distance_m,
            config.min_interval_s,
        )
    }

    pub fn with_thresholds(max_accuracy_m: f64, min_distance_m: f64, min_interval_s: f64) -> Self {
        Self {
            max_accuracy_m,
            min_distance_m,
            min_interval_s,
            waypoints: Vec::new(),
            shared: Arc::default(),
            frozen: false,
        }
    }

    /// Checks a fix against the filters without mutating the route.
    ///
    /// On success returns the distance the fix would add to the route.
    pub fn classify(&self, fix: &LocationFix) -> Result<f64, FixRejection> {
        if self.frozen {
            return Err(FixRejection::Frozen);
        }
        if !fix.horizontal_accuracy.is_finite()
            || fix.horizontal_accuracy < 0.
            || fix.horizontal_accuracy > self.max_accuracy_m
        {
            return Err(FixRejection::LowAccuracy);
        }
        if !fix.coordinate.is_valid() || !fix.timestamp.is_finite() {
            return Err(FixRejection::Malformed);
        }

        let Some(last) = self.waypoints.last() else {
            return Ok(0.);
        };

        let elapsed = fix.timestamp - last.timestamp;
        if elapsed <= 0. {
            return Err(FixRejection::OutOfOrder);
        }
        let distance = last.coordinate.distance_to(&fix.coordinate);
        if distance < self.min_distance_m {
            return Err(FixRejection::TooClose);
        }
        if elapsed < self.min_interval_s {
            return Err(FixRejection::TooSoon);
        }

        Ok(distance)
    }

    /// Offers a fix to the route. Returns the new waypoint when the fix is accepted.
    pub fn ingest(&mut self, fix: &LocationFix) -> Option<Waypoint> {
        match self.classify(fix) {
            Ok(distance) => {
                let waypoint = Waypoint {
                    coordinate: fix.coordinate,
                    timestamp: fix.timestamp,
                    cumulative_distance: self.total_distance() + distance,
                    altitude: fix.altitude,
                };
                self.waypoints.push(waypoint.clone());
                self.shared = Arc::new(self.snapshot());
                Some(waypoint)
            }
            Err(reason) => {
                trace!("Dropping fix at t={}: {:?}", fix.timestamp, reason);
                None
            }
        }
    }

    pub fn total_distance(&self) -> f64 {
        self.waypoints
            .last()
            .map(|w| w.cumulative_distance)
            .unwrap_or(0.)
    }

    /// Meters per second between the first and the last waypoint
    pub fn average_speed(&self) -> f64 {
        match (self.waypoints.first(), self.waypoints.last()) {
            (Some(first), Some(last)) if last.timestamp > first.timestamp => {
                last.cumulative_distance / (last.timestamp - first.timestamp)
            }
            _ => 0.,
        }
    }

    pub fn last_waypoint(&self) -> Option<&Waypoint> {
        self.waypoints.last()
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Immutable copy of the route as it stands
    pub fn snapshot(&self) -> Route {
        Route::from_accepted(self.waypoints.clone())
    }

    /// Shared handle on the route as it stands. Cheap to call between waypoints.
    pub fn shared(&self) -> Arc<Route> {
        Arc::clone(&self.shared)
    }

    /// Stops accepting fixes. The route can still be read.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Drops every waypoint and unfreezes the builder
    pub fn reset(&mut self) {
        self.waypoints.clear();
        self.shared = Arc::default();
        self.frozen = false;
    }
}
