pub mod storage;
pub mod worker;

use std::{
    fmt,
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::{WispError, comparison::RaceResult, session::RunSummary, tracking::Route};

pub use storage::{FileBasedStorage, SavedRunGhostSource};
pub use worker::PersistenceWorker;

/// Identifier handed back by a persistence adapter for a stored run
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SavedRunId(pub String);

impl SavedRunId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SavedRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SavedRunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Everything a finished session hands to persistence
#[derive(Clone, Debug, PartialEq)]
pub struct SaveRequest {
    pub route: Route,
    pub result: RaceResult,
    pub summary: RunSummary,
}

/// A run as written to storage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedRun {
    pub id: SavedRunId,
    /// Seconds since the Unix epoch
    pub saved_at: u64,
    pub summary: RunSummary,
    pub result: RaceResult,
    pub route: Route,
}

impl SavedRun {
    pub fn new(id: SavedRunId, route: &Route, result: &RaceResult, summary: &RunSummary) -> Self {
        Self {
            id,
            saved_at: unix_now().as_secs(),
            summary: summary.clone(),
            result: result.clone(),
            route: route.clone(),
        }
    }
}

pub(crate) fn unix_now() -> std::time::Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Writes a finished run somewhere durable.
///
/// The session calls this once per save request and does not retry. An error keeps the
/// run in memory so the caller can try again.
pub trait PersistenceAdapter {
    fn save(
        &mut self,
        route: &Route,
        result: &RaceResult,
        summary: &RunSummary,
    ) -> Result<SavedRunId, WispError>;
}

/// In-memory adapter. Clones share the same runs, so one clone can be handed to a
/// session or worker and another kept for inspection.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    runs: Arc<Mutex<Vec<SavedRun>>>,
    fail: bool,
}

impl MemoryStorage {
    /// An adapter whose every save fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn get(&self, id: &SavedRunId) -> Option<SavedRun> {
        self.runs
            .lock()
            .ok()?
            .iter()
            .find(|run| &run.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.runs.lock().map(|runs| runs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PersistenceAdapter for MemoryStorage {
    fn save(
        &mut self,
        route: &Route,
        result: &RaceResult,
        summary: &RunSummary,
    ) -> Result<SavedRunId, WispError> {
        if self.fail {
            return Err(WispError::PersistenceFailure {
                reason: "storage unavailable".to_string(),
            });
        }
        let mut runs = self.runs.lock().map_err(|_| WispError::PersistenceFailure {
            reason: "storage lock poisoned".to_string(),
        })?;
        let id = SavedRunId(format!("memory-{}", runs.len() + 1));
        runs.push(SavedRun::new(id.clone(), route, result, summary));
        Ok(id)
    }
}
