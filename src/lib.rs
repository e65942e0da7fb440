// Library interface for wisp
// This allows integration tests and benches to access internal modules

pub mod comparison;
pub mod config;
pub mod errors;
pub mod geo;
pub mod ghost;
pub mod persistence;
pub mod session;
pub mod tracking;

// Re-export commonly used types
pub use comparison::{AheadOrBehind, ComparisonEngine, ComparisonSample, RaceResult, RaceStatus};
pub use config::EngineConfig;
pub use errors::WispError;
pub use geo::Coordinate;
pub use ghost::{GhostClock, GhostDataSource, GhostProfile, GhostType, Split};
pub use persistence::{FileBasedStorage, PersistenceAdapter, SavedRunId};
pub use session::{
    LiveSession, RunSession, RunSummary, SessionEvent, SessionHandle, SessionPhase,
    SessionSnapshot, SessionState,
};
pub use tracking::{LocationFix, LocationProvider, Route, RouteBuilder, Waypoint};
