use std::{
    fs::File,
    path::{Path, PathBuf},
    time::Duration,
};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::WispError;

const CONFIG_FILE_NAME: &str = "engine.json";
const APP_DIR_NAME: &str = "wisp";

pub(crate) const MAX_HORIZONTAL_ACCURACY_M: f64 = 50.;
pub(crate) const MIN_DISTANCE_M: f64 = 5.;
pub(crate) const MIN_INTERVAL_S: f64 = 2.;
pub(crate) const COUNTDOWN_TICKS: u32 = 3;
pub(crate) const TICK_INTERVAL_MS: u64 = 1000;
pub(crate) const SPLIT_UNIT_M: f64 = 1000.;
pub(crate) const TIED_THRESHOLD_S: f64 = 0.5;

/// Shortest tick period a config may ask for
pub(crate) const MIN_TICK_INTERVAL_MS: u64 = 10;
/// Split units below this are ignored by the comparison engine
pub(crate) const MIN_SPLIT_UNIT_M: f64 = 1.;

/// Tunables for route filtering, session timing and ghost comparison.
///
/// Every field has a default, so a partial `engine.json` only overrides what it names.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixes reporting a worse horizontal accuracy (meters) are dropped
    pub max_horizontal_accuracy_m: f64,
    /// Minimum geodesic distance between two accepted waypoints
    pub min_distance_m: f64,
    /// Minimum time between two accepted waypoints
    pub min_interval_s: f64,
    /// Number of ticks spent in countdown before running starts
    pub countdown_ticks: u32,
    /// Session tick period
    pub tick_interval_ms: u64,
    /// Distance between two recorded split comparisons
    pub split_unit_m: f64,
    /// Gaps smaller than this (seconds, absolute) are reported as tied
    pub tied_threshold_s: f64,
    /// Keep counting elapsed time while paused. Moving time never counts while paused.
    pub count_elapsed_while_paused: bool,
    /// Pause the session when the location provider reports a fault
    pub auto_pause_on_degraded: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_horizontal_accuracy_m: MAX_HORIZONTAL_ACCURACY_M,
            min_distance_m: MIN_DISTANCE_M,
            min_interval_s: MIN_INTERVAL_S,
            countdown_ticks: COUNTDOWN_TICKS,
            tick_interval_ms: TICK_INTERVAL_MS,
            split_unit_m: SPLIT_UNIT_M,
            tied_threshold_s: TIED_THRESHOLD_S,
            count_elapsed_while_paused: false,
            auto_pause_on_degraded: true,
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Seconds added to the session clocks by one tick
    pub fn tick_seconds(&self) -> f64 {
        self.tick_interval_ms as f64 / 1000.
    }

    /// Rejects values the engine cannot run with: non-finite or negative thresholds, a
    /// tick period under `MIN_TICK_INTERVAL_MS` and split units under one meter.
    pub fn validate(&self) -> Result<(), WispError> {
        let invalid = |reason: String| Err(WispError::InvalidConfig { reason });

        for (name, value) in [
            ("max_horizontal_accuracy_m", self.max_horizontal_accuracy_m),
            ("min_distance_m", self.min_distance_m),
            ("min_interval_s", self.min_interval_s),
            ("split_unit_m", self.split_unit_m),
            ("tied_threshold_s", self.tied_threshold_s),
        ] {
            if !value.is_finite() || value < 0. {
                return invalid(format!("{} must be a non-negative number, got {}", name, value));
            }
        }
        if self.max_horizontal_accuracy_m == 0. {
            return invalid("max_horizontal_accuracy_m must be positive".to_string());
        }
        if self.tick_interval_ms < MIN_TICK_INTERVAL_MS {
            return invalid(format!(
                "tick_interval_ms must be at least {}, got {}",
                MIN_TICK_INTERVAL_MS, self.tick_interval_ms
            ));
        }
        if self.split_unit_m < MIN_SPLIT_UNIT_M {
            return invalid(format!(
                "split_unit_m must be at least {} m, got {}",
                MIN_SPLIT_UNIT_M, self.split_unit_m
            ));
        }
        Ok(())
    }

    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Loads the config from the user's config directory, if one was saved there.
    pub fn from_local_file() -> Option<Self> {
        let config_path = Self::default_path()?;
        if !config_path.exists() {
            return None;
        }
        match Self::from_file(&config_path) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Ignoring unreadable config file {:?}: {}", config_path, e);
                None
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, WispError> {
        let file = File::open(path).map_err(|e| WispError::ConfigIOError { source: e })?;
        let config: Self = serde_json::from_reader(file)
            .map_err(|e| WispError::ConfigSerializeError { source: e })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), WispError> {
        let config_path = Self::default_path().ok_or(WispError::NoConfigDir)?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), WispError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| WispError::ConfigIOError { source: e })?;
            }
        }

        let file = File::create(path).map_err(|e| WispError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| WispError::ConfigSerializeError { source: e })
    }
}
