// Error types for wisp

use crate::session::live::EngineInput;
use snafu::Snafu;
use std::{io, sync::mpsc::SendError};

#[derive(Debug, Snafu)]
pub enum WispError {
    // Location provider errors
    #[snafu(display("Location permission not granted: {state}"))]
    PermissionError { state: String },
    #[snafu(display("Location services are disabled"))]
    ServiceDisabledError,
    #[snafu(display("Location provider error: {description}"))]
    LocationProviderError { description: String },
    #[snafu(display("Error reading fix recording"))]
    RecordingIOError { source: io::Error },

    // Ghost loading and validation errors
    #[snafu(display("Invalid ghost profile: {reason}"))]
    GhostProfileInvalid { reason: String },
    #[snafu(display("Ghost data source error: {reason}"))]
    GhostSourceError { reason: String },
    #[snafu(display("Invalid encoded polyline: {reason}"))]
    InvalidPolyline { reason: String },

    // Session lifecycle errors
    #[snafu(display("Cannot {action} while session is {from}"))]
    InvalidSessionTransition { from: String, action: String },
    #[snafu(display("Error sending input to the session engine"))]
    EngineChannelError { source: Box<SendError<EngineInput>> },
    #[snafu(display("Session engine thread terminated unexpectedly"))]
    EngineThreadPanicked,

    // Persistence errors
    #[snafu(display("Persistence failure: {reason}"))]
    PersistenceFailure { reason: String },
    #[snafu(display("Error accessing run storage"))]
    StorageIOError { source: io::Error },
    #[snafu(display("Error serializing run data"))]
    SerializeError { source: serde_json::Error },

    // Config management errors
    #[snafu(display("Could not find application data directory"))]
    NoConfigDir,
    #[snafu(display("Error writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
    #[snafu(display("Invalid engine config: {reason}"))]
    InvalidConfig { reason: String },
}

impl From<SendError<EngineInput>> for WispError {
    fn from(value: SendError<EngineInput>) -> Self {
        WispError::EngineChannelError {
            source: Box::new(value),
        }
    }
}
