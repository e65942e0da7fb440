use std::{
    collections::VecDeque,
    fmt,
    path::Path,
    sync::mpsc::{Receiver, Sender, channel},
};

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::WispError;

use super::LocationFix;

/// Authorization the user granted to location tracking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    NotDetermined,
    Denied,
    Restricted,
    WhenInUse,
    Always,
}

impl PermissionState {
    pub fn is_authorized(&self) -> bool {
        matches!(self, PermissionState::WhenInUse | PermissionState::Always)
    }

    /// Denied and restricted both end tracking immediately
    pub fn revokes_tracking(&self) -> bool {
        matches!(self, PermissionState::Denied | PermissionState::Restricted)
    }
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionState::NotDetermined => write!(f, "not determined"),
            PermissionState::Denied => write!(f, "denied"),
            PermissionState::Restricted => write!(f, "restricted"),
            PermissionState::WhenInUse => write!(f, "when in use"),
            PermissionState::Always => write!(f, "always"),
        }
    }
}

/// Non-fatal problems reported by the provider while a session is live
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ProviderFault {
    ServiceDisabled,
    Failure { description: String },
}

impl fmt::Display for ProviderFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderFault::ServiceDisabled => write!(f, "location services disabled"),
            ProviderFault::Failure { description } => write!(f, "{}", description),
        }
    }
}

/// One item of the provider's push stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LocationUpdate {
    Fix(LocationFix),
    Permission(PermissionState),
    Fault(ProviderFault),
}

/// Source of location fixes and permission changes.
///
/// Implementations wrap the platform's push-style location API. `next_update` blocks
/// until the platform delivers something and returns `Ok(None)` once the stream ends.
pub trait LocationProvider {
    /// Begin delivering updates.
    ///
    /// Fails with [`WispError::PermissionError`] when tracking is not authorized and
    /// [`WispError::ServiceDisabledError`] when the platform has location turned off.
    fn start(&mut self) -> Result<(), WispError>;

    /// Wait for the next update. `Ok(None)` means the stream is over.
    fn next_update(&mut self) -> Result<Option<LocationUpdate>, WispError>;

    /// Stop delivering updates. Further calls to `next_update` return `Ok(None)`.
    fn stop(&mut self);

    fn permission(&self) -> PermissionState;
}

/// Replays a fixed list of updates, for tests and offline replay.
pub struct MockLocationProvider {
    updates: VecDeque<LocationUpdate>,
    permission: PermissionState,
    service_enabled: bool,
    started: bool,
}

impl Default for MockLocationProvider {
    fn default() -> Self {
        Self {
            updates: VecDeque::new(),
            permission: PermissionState::WhenInUse,
            service_enabled: true,
            started: false,
        }
    }
}

impl MockLocationProvider {
    pub fn from_fixes(fixes: Vec<LocationFix>) -> Self {
        Self::from_updates(fixes.into_iter().map(LocationUpdate::Fix).collect())
    }

    pub fn from_updates(updates: Vec<LocationUpdate>) -> Self {
        Self {
            updates: updates.into(),
            ..Default::default()
        }
    }

    /// Loads a fix recording written by [`write_fixes`].
    pub fn from_file(path: &Path) -> Result<Self, WispError> {
        Ok(Self::from_fixes(read_fixes(path)?))
    }

    pub fn with_permission(mut self, permission: PermissionState) -> Self {
        self.permission = permission;
        self
    }

    pub fn with_service_disabled(mut self) -> Self {
        self.service_enabled = false;
        self
    }

    pub fn remaining(&self) -> usize {
        self.updates.len()
    }
}

impl LocationProvider for MockLocationProvider {
    fn start(&mut self) -> Result<(), WispError> {
        if !self.permission.is_authorized() {
            return Err(WispError::PermissionError {
                state: self.permission.to_string(),
            });
        }
        if !self.service_enabled {
            return Err(WispError::ServiceDisabledError);
        }
        self.started = true;
        Ok(())
    }

    fn next_update(&mut self) -> Result<Option<LocationUpdate>, WispError> {
        if !self.started {
            return Ok(None);
        }
        let update = self.updates.pop_front();
        if let Some(LocationUpdate::Permission(state)) = &update {
            self.permission = *state;
        }
        Ok(update)
    }

    fn stop(&mut self) {
        self.started = false;
    }

    fn permission(&self) -> PermissionState {
        self.permission
    }
}

/// Adapts a push callback API: the platform side holds the [`Sender`] returned by
/// [`ChannelLocationProvider::new`] and pushes updates into it as they arrive.
pub struct ChannelLocationProvider {
    receiver: Receiver<LocationUpdate>,
    permission: PermissionState,
    stopped: bool,
}

impl ChannelLocationProvider {
    pub fn new(permission: PermissionState) -> (Sender<LocationUpdate>, Self) {
        let (sender, receiver) = channel();
        (
            sender,
            Self {
                receiver,
                permission,
                stopped: false,
            },
        )
    }
}

impl LocationProvider for ChannelLocationProvider {
    fn start(&mut self) -> Result<(), WispError> {
        if !self.permission.is_authorized() {
            return Err(WispError::PermissionError {
                state: self.permission.to_string(),
            });
        }
        Ok(())
    }

    fn next_update(&mut self) -> Result<Option<LocationUpdate>, WispError> {
        if self.stopped {
            return Ok(None);
        }
        // a disconnected sender is the end of the stream
        let update = self.receiver.recv().ok();
        if let Some(LocationUpdate::Permission(state)) = &update {
            self.permission = *state;
        }
        Ok(update)
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn permission(&self) -> PermissionState {
        self.permission
    }
}

/// Reads a JSON Lines fix recording.
pub fn read_fixes(path: &Path) -> Result<Vec<LocationFix>, WispError> {
    let lines = serde_jsonlines::json_lines::<LocationFix, _>(path)
        .map_err(|e| WispError::RecordingIOError { source: e })?;
    let fixes = lines
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            error!("Could not parse fix recording {:?}: {}", path, e);
            WispError::RecordingIOError { source: e }
        })?;
    debug!("Loaded {} fixes from {:?}", fixes.len(), path);
    Ok(fixes)
}

/// Writes fixes as JSON Lines, one fix per line.
pub fn write_fixes(path: &Path, fixes: &[LocationFix]) -> Result<(), WispError> {
    serde_jsonlines::write_json_lines(path, fixes)
        .map_err(|e| WispError::RecordingIOError { source: e })
}
