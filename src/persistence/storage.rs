// File storage for finished runs

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};

use crate::{
    WispError,
    comparison::RaceResult,
    ghost::{GhostDataSource, GhostProfile, GhostType},
    session::RunSummary,
    tracking::Route,
};

use super::{PersistenceAdapter, SavedRun, SavedRunId, unix_now};

/// One pretty-printed JSON file per run under a storage directory
pub struct FileBasedStorage {
    storage_path: PathBuf,
}

impl FileBasedStorage {
    /// Create a new file-based storage instance, creating the directory if needed
    pub fn new(storage_path: PathBuf) -> Result<Self, WispError> {
        if !storage_path.exists() {
            fs::create_dir_all(&storage_path)
                .map_err(|e| WispError::StorageIOError { source: e })?;
        }
        Ok(Self { storage_path })
    }

    /// Create storage in the default application data directory
    pub fn new_default() -> Result<Self, WispError> {
        Self::new(Self::default_storage_path()?)
    }

    pub fn default_storage_path() -> Result<PathBuf, WispError> {
        let app_data_dir = dirs::data_dir().ok_or(WispError::NoConfigDir)?;
        Ok(app_data_dir.join("wisp").join("runs"))
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    fn file_path_for_run(&self, id: &SavedRunId) -> PathBuf {
        self.storage_path.join(format!("{}.json", Self::normalize_id(id.as_str())))
    }

    /// Ids become file names, keep them filesystem safe
    fn normalize_id(id: &str) -> String {
        id.chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    fn next_id(&self) -> SavedRunId {
        let base = format!("run-{}", unix_now().as_millis());
        let mut id = SavedRunId(base.clone());
        let mut suffix = 1;
        while self.file_path_for_run(&id).exists() {
            id = SavedRunId(format!("{base}-{suffix}"));
            suffix += 1;
        }
        id
    }

    /// Ids of every stored run, oldest first
    pub fn list_runs(&self) -> Result<Vec<SavedRunId>, WispError> {
        let entries =
            fs::read_dir(&self.storage_path).map_err(|e| WispError::StorageIOError { source: e })?;

        let mut ids: Vec<SavedRunId> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(SavedRunId::from)
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn run_exists(&self, id: &SavedRunId) -> bool {
        self.file_path_for_run(id).exists()
    }

    pub fn load_run(&self, id: &SavedRunId) -> Result<Option<SavedRun>, WispError> {
        let file_path = self.file_path_for_run(id);
        if !file_path.exists() {
            debug!("No stored run at {:?}", file_path);
            return Ok(None);
        }

        let content =
            fs::read_to_string(&file_path).map_err(|e| WispError::StorageIOError { source: e })?;
        // the route recomputes its distances on load, in case the file was edited by hand
        let run: SavedRun =
            serde_json::from_str(&content).map_err(|e| WispError::SerializeError { source: e })?;
        Ok(Some(run))
    }

    pub fn delete_run(&mut self, id: &SavedRunId) -> Result<(), WispError> {
        let file_path = self.file_path_for_run(id);
        if file_path.exists() {
            fs::remove_file(&file_path).map_err(|e| WispError::StorageIOError { source: e })?;
            info!("Deleted run {}", id);
        } else {
            warn!("Asked to delete missing run {}", id);
        }
        Ok(())
    }

    fn write_run(&self, run: &SavedRun) -> Result<(), WispError> {
        let file_path = self.file_path_for_run(&run.id);
        let content =
            serde_json::to_string_pretty(run).map_err(|e| WispError::SerializeError { source: e })?;

        // write next to the target and rename so a crash never leaves half a run behind
        let temp_path = file_path.with_extension("json.tmp");
        fs::write(&temp_path, content).map_err(|e| WispError::StorageIOError { source: e })?;
        fs::rename(&temp_path, &file_path).map_err(|e| WispError::StorageIOError { source: e })?;
        Ok(())
    }
}

impl PersistenceAdapter for FileBasedStorage {
    fn save(
        &mut self,
        route: &Route,
        result: &RaceResult,
        summary: &RunSummary,
    ) -> Result<SavedRunId, WispError> {
        let id = self.next_id();
        let run = SavedRun::new(id.clone(), route, result, summary);
        self.write_run(&run).map_err(|e| WispError::PersistenceFailure {
            reason: e.to_string(),
        })?;
        info!(
            "Stored run {} ({:.0} m, {} points)",
            id,
            summary.distance_m,
            route.len()
        );
        Ok(id)
    }
}

/// Races against a run stored earlier
pub struct SavedRunGhostSource {
    storage: FileBasedStorage,
    id: SavedRunId,
}

impl SavedRunGhostSource {
    pub fn new(storage: FileBasedStorage, id: SavedRunId) -> Self {
        Self { storage, id }
    }
}

impl GhostDataSource for SavedRunGhostSource {
    fn load_ghost(&mut self) -> Result<GhostProfile, WispError> {
        let run = self
            .storage
            .load_run(&self.id)?
            .ok_or_else(|| WispError::GhostSourceError {
                reason: format!("no stored run with id {}", self.id),
            })?;
        GhostProfile::from_route(GhostType::PastRun, format!("Run {}", run.id), &run.route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        comparison::RaceStatus,
        geo::{Coordinate, offset_north},
        tracking::Waypoint,
    };
    use tempfile::TempDir;

    fn route() -> Route {
        let origin = Coordinate::new(48.8566, 2.3522);
        Route::from_waypoints(
            (0..20)
                .map(|i| Waypoint {
                    coordinate: offset_north(&origin, i as f64 * 10.),
                    timestamp: i as f64 * 3.,
                    cumulative_distance: 0.,
                    altitude: None,
                })
                .collect(),
        )
    }

    fn result() -> RaceResult {
        RaceResult {
            status: RaceStatus::Lost,
            time_difference: 12.,
            distance_completed: 190.,
            completion_percentage: 0.19,
            split_comparisons: vec![],
            avg_gap: 5.,
            max_gap: 12.,
            min_gap: 0.,
        }
    }

    #[test]
    fn test_save_list_load_delete() {
        let temp_dir = TempDir::new().unwrap();
        let mut storage = FileBasedStorage::new(temp_dir.path().join("runs")).unwrap();
        let route = route();
        let summary = RunSummary::new("pr", &route, 57., 57., 1000.);

        let first = storage.save(&route, &result(), &summary).unwrap();
        let second = storage.save(&route, &result(), &summary).unwrap();
        assert_ne!(first, second);
        assert_eq!(storage.list_runs().unwrap().len(), 2);

        let loaded = storage.load_run(&first).unwrap().unwrap();
        assert_eq!(loaded.id, first);
        assert_eq!(loaded.route.len(), 20);
        assert_eq!(loaded.result, result());
        assert_eq!(loaded.summary.ghost_name, "pr");

        storage.delete_run(&first).unwrap();
        assert!(!storage.run_exists(&first));
        assert_eq!(storage.list_runs().unwrap(), vec![second]);
    }

    #[test]
    fn test_missing_run_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileBasedStorage::new(temp_dir.path().to_path_buf()).unwrap();
        assert!(storage.load_run(&SavedRunId::from("nope")).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_run_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileBasedStorage::new(temp_dir.path().to_path_buf()).unwrap();
        fs::write(temp_dir.path().join("broken.json"), "{ not json").unwrap();
        assert!(matches!(
            storage.load_run(&SavedRunId::from("broken")),
            Err(WispError::SerializeError { .. })
        ));
    }

    #[test]
    fn test_stored_run_becomes_past_run_ghost() {
        let temp_dir = TempDir::new().unwrap();
        let mut storage = FileBasedStorage::new(temp_dir.path().to_path_buf()).unwrap();
        let route = route();
        let summary = RunSummary::new("pr", &route, 57., 57., 1000.);
        let id = storage.save(&route, &result(), &summary).unwrap();

        let mut source = SavedRunGhostSource::new(storage, id);
        let ghost = source.load_ghost().unwrap();
        assert_eq!(ghost.ghost_type, GhostType::PastRun);
        assert!((ghost.target_distance - 190.).abs() < 1e-6);
        assert_eq!(ghost.target_duration, 57.);
    }

    #[test]
    fn test_unknown_run_ghost_source_fails() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileBasedStorage::new(temp_dir.path().to_path_buf()).unwrap();
        let mut source = SavedRunGhostSource::new(storage, SavedRunId::from("run-0"));
        assert!(matches!(
            source.load_ghost(),
            Err(WispError::GhostSourceError { .. })
        ));
    }
}
