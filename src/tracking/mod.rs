pub mod provider;
pub mod route_builder;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::geo::Coordinate;

pub use provider::{
    ChannelLocationProvider, LocationProvider, LocationUpdate, MockLocationProvider,
    PermissionState, ProviderFault,
};
pub use route_builder::{FixRejection, RouteBuilder};

/// A raw position report from the location provider
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub coordinate: Coordinate,
    /// Sensor timestamp in seconds. Only differences between fixes are meaningful.
    pub timestamp: f64,
    /// Radius of uncertainty in meters
    pub horizontal_accuracy: f64,
    /// Altitude in meters, when the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

impl LocationFix {
    pub fn new(coordinate: Coordinate, timestamp: f64, horizontal_accuracy: f64) -> Self {
        Self {
            coordinate,
            timestamp,
            horizontal_accuracy,
            altitude: None,
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }
}

/// A fix that made it through jitter filtering
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub coordinate: Coordinate,
    pub timestamp: f64,
    /// Meters covered from the first waypoint of the route
    pub cumulative_distance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

/// Ordered, immutable list of waypoints.
///
/// Timestamps strictly increase and cumulative distance never decreases along the route.
/// Serialized as a plain waypoint list; deserializing goes through
/// [`Route::from_waypoints`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Waypoint>", into = "Vec<Waypoint>")]
pub struct Route {
    waypoints: Vec<Waypoint>,
}

impl From<Vec<Waypoint>> for Route {
    fn from(waypoints: Vec<Waypoint>) -> Self {
        Route::from_waypoints(waypoints)
    }
}

impl From<Route> for Vec<Waypoint> {
    fn from(route: Route) -> Self {
        route.waypoints
    }
}

impl Route {
    pub(crate) fn from_accepted(waypoints: Vec<Waypoint>) -> Self {
        Self { waypoints }
    }

    /// Rebuilds a route from a stored waypoint list.
    ///
    /// Points that would break ordering are skipped and cumulative distances are
    /// recomputed from the coordinates, so a tampered or rounded list still yields a
    /// well formed route.
    pub fn from_waypoints(waypoints: Vec<Waypoint>) -> Self {
        let mut accepted: Vec<Waypoint> = Vec::with_capacity(waypoints.len());
        for mut waypoint in waypoints {
            if !waypoint.coordinate.is_valid() || !waypoint.timestamp.is_finite() {
                continue;
            }
            match accepted.last() {
                Some(last) if waypoint.timestamp <= last.timestamp => continue,
                Some(last) => {
                    waypoint.cumulative_distance =
                        last.cumulative_distance + last.coordinate.distance_to(&waypoint.coordinate)
                }
                None => waypoint.cumulative_distance = 0.,
            }
            accepted.push(waypoint);
        }
        Self {
            waypoints: accepted,
        }
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn first(&self) -> Option<&Waypoint> {
        self.waypoints.first()
    }

    pub fn last(&self) -> Option<&Waypoint> {
        self.waypoints.last()
    }

    pub fn total_distance(&self) -> f64 {
        self.last().map(|w| w.cumulative_distance).unwrap_or(0.)
    }

    /// Seconds between the first and last waypoint
    pub fn duration(&self) -> f64 {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.,
        }
    }

    /// Average speed in m/s over the whole route, 0 when it spans no time
    pub fn average_speed(&self) -> f64 {
        let duration = self.duration();
        if duration > 0. {
            self.total_distance() / duration
        } else {
            0.
        }
    }

    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.waypoints.iter().map(|w| w.coordinate).collect()
    }

    /// Sum of positive altitude changes between consecutive waypoints that carry one
    pub fn elevation_gain(&self) -> f64 {
        self.waypoints
            .iter()
            .filter_map(|w| w.altitude)
            .tuple_windows()
            .map(|(a, b)| (b - a).max(0.))
            .sum()
    }

    /// GeoJSON `Feature` with a `LineString` geometry, ready for map rendering.
    pub fn to_geojson(&self) -> serde_json::Value {
        let coordinates: Vec<[f64; 2]> = self
            .waypoints
            .iter()
            .map(|w| w.coordinate.to_lon_lat())
            .collect();
        json!({
            "type": "Feature",
            "geometry": {
                "type": "LineString",
                "coordinates": coordinates,
            },
            "properties": {
                "total_points": self.waypoints.len(),
                "distance_m": self.total_distance(),
            }
        })
    }
}
