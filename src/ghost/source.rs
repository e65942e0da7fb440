use std::{fs, path::PathBuf};

use log::{debug, error};

use crate::WispError;

use super::GhostProfile;

/// Supplies the ghost a session races against.
///
/// Called once before the countdown. The returned profile is never mutated or
/// re-fetched by the engine.
pub trait GhostDataSource {
    fn load_ghost(&mut self) -> Result<GhostProfile, WispError>;
}

/// Hands out a profile that is already in memory
pub struct StaticGhostSource {
    profile: GhostProfile,
}

impl StaticGhostSource {
    pub fn new(profile: GhostProfile) -> Self {
        Self { profile }
    }
}

impl GhostDataSource for StaticGhostSource {
    fn load_ghost(&mut self) -> Result<GhostProfile, WispError> {
        self.profile.validate()?;
        Ok(self.profile.clone())
    }
}

/// Reads a ghost profile stored as JSON
pub struct FileGhostSource {
    path: PathBuf,
}

impl FileGhostSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl GhostDataSource for FileGhostSource {
    fn load_ghost(&mut self) -> Result<GhostProfile, WispError> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            error!("Could not read ghost file {:?}: {}", self.path, e);
            WispError::GhostSourceError {
                reason: format!("could not read {}: {}", self.path.display(), e),
            }
        })?;
        let profile: GhostProfile =
            serde_json::from_str(&content).map_err(|e| WispError::GhostSourceError {
                reason: format!("could not parse {}: {}", self.path.display(), e),
            })?;
        profile.validate()?;
        debug!(
            "Loaded ghost '{}' ({}, {:.0} m in {:.0} s)",
            profile.name, profile.ghost_type, profile.target_distance, profile.target_duration
        );
        Ok(profile)
    }
}
