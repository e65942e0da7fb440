pub mod live;
pub mod machine;
pub mod replay;
pub mod summary;
pub mod ticker;

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    comparison::{ComparisonSample, RaceResult},
    persistence::SavedRunId,
    tracking::{PermissionState, ProviderFault, Route, Waypoint},
};

pub use live::{LiveSession, SessionCommand, SessionHandle};
pub use machine::RunSession;
pub use summary::{PaceSplit, RunSummary};
pub use ticker::{ManualTicks, TickSource, Ticker};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    Countdown,
    Running,
    Paused,
    Finished,
    Saved,
    Discarded,
}

impl SessionPhase {
    /// Phases in which the tick timer must be alive
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SessionPhase::Countdown | SessionPhase::Running | SessionPhase::Paused
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Saved | SessionPhase::Discarded)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Countdown => write!(f, "counting down"),
            SessionPhase::Running => write!(f, "running"),
            SessionPhase::Paused => write!(f, "paused"),
            SessionPhase::Finished => write!(f, "finished"),
            SessionPhase::Saved => write!(f, "saved"),
            SessionPhase::Discarded => write!(f, "discarded"),
        }
    }
}

/// Why recording quality dropped during a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DegradedReason {
    PermissionRevoked(PermissionState),
    ServiceDisabled,
    ProviderFailure(String),
    /// The provider's stream ended while the session was still live
    ProviderEnded,
}

impl From<ProviderFault> for DegradedReason {
    fn from(fault: ProviderFault) -> Self {
        match fault {
            ProviderFault::ServiceDisabled => DegradedReason::ServiceDisabled,
            ProviderFault::Failure { description } => DegradedReason::ProviderFailure(description),
        }
    }
}

/// Timing and progress of the session. The state machine is its only writer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    /// Seconds since running started. Frozen while paused unless configured otherwise.
    pub elapsed_time: f64,
    /// Seconds spent running, pauses excluded. Drives the ghost.
    pub moving_time: f64,
    /// Meters covered by the route
    pub current_distance: f64,
    pub countdown_remaining: u32,
    pub degraded: Option<DegradedReason>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            elapsed_time: 0.,
            moving_time: 0.,
            current_distance: 0.,
            countdown_remaining: 0,
            degraded: None,
        }
    }
}

/// Notifications published by a session to its presentation layer
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    PhaseChanged {
        from: SessionPhase,
        to: SessionPhase,
    },
    CountdownTick {
        remaining: u32,
    },
    Tick {
        elapsed_time: f64,
        moving_time: f64,
    },
    WaypointAccepted(Waypoint),
    Comparison(ComparisonSample),
    Degraded(DegradedReason),
    Finished(RaceResult),
    Saved(SavedRunId),
    SaveFailed {
        reason: String,
    },
    Discarded {
        result: Option<RaceResult>,
    },
}

/// Read-only copy of everything a UI needs to render the session
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Shared with the engine until the next waypoint arrives
    pub route: Arc<Route>,
    pub latest_sample: Option<ComparisonSample>,
    pub ghost_distance: f64,
    pub current_pace_s_per_km: Option<f64>,
    pub live_result: Option<RaceResult>,
}
