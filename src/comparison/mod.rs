pub mod engine;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use engine::ComparisonEngine;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AheadOrBehind {
    Ahead,
    Behind,
    Tied,
}

impl AheadOrBehind {
    pub fn from_gap(gap_seconds: f64, tied_threshold_s: f64) -> Self {
        if gap_seconds.abs() < tied_threshold_s {
            AheadOrBehind::Tied
        } else if gap_seconds > 0. {
            AheadOrBehind::Behind
        } else {
            AheadOrBehind::Ahead
        }
    }
}

impl fmt::Display for AheadOrBehind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AheadOrBehind::Ahead => write!(f, "ahead"),
            AheadOrBehind::Behind => write!(f, "behind"),
            AheadOrBehind::Tied => write!(f, "tied"),
        }
    }
}

/// Runner vs. ghost at one instant of the session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSample {
    pub elapsed_time: f64,
    pub moving_time: f64,
    pub user_distance: f64,
    /// Where the ghost is after the same moving time
    pub ghost_distance_at_same_time: f64,
    /// Seconds behind the ghost at the runner's distance, negative when ahead
    pub gap_seconds: f64,
    pub ahead_or_behind: AheadOrBehind,
}

/// Cumulative times of runner and ghost at a whole split mark
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitComparison {
    pub distance_mark: f64,
    pub user_split_time: f64,
    pub ghost_split_time: f64,
}

impl SplitComparison {
    /// Positive when the runner was slower to reach the mark
    pub fn difference(&self) -> f64 {
        self.user_split_time - self.ghost_split_time
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceStatus {
    Won,
    Lost,
    Abandoned,
    /// Only reported while the session is running
    InProgress,
}

impl fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceStatus::Won => write!(f, "won"),
            RaceStatus::Lost => write!(f, "lost"),
            RaceStatus::Abandoned => write!(f, "abandoned"),
            RaceStatus::InProgress => write!(f, "in progress"),
        }
    }
}

/// Outcome of a run against its ghost
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    pub status: RaceStatus,
    /// Runner's time minus the ghost's, at the target distance when it was reached and
    /// at the runner's final distance otherwise
    pub time_difference: f64,
    pub distance_completed: f64,
    /// Fraction of the ghost's target distance covered, in `0..=1`
    pub completion_percentage: f64,
    pub split_comparisons: Vec<SplitComparison>,
    pub avg_gap: f64,
    pub max_gap: f64,
    pub min_gap: f64,
}
