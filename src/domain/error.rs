use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::session::SessionState;

/// Domain-level errors for voicebridge.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Configuration file not found: {0}")]
    ConfigMissing(PathBuf),

    #[error("Configuration file is not well-formed: {0}")]
    ConfigCorrupt(String),

    #[error("Failed to write configuration: {0}")]
    ConfigWrite(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("No microphone available")]
    NoMicrophone,

    #[error("Audio capture error: {message}")]
    Capture { message: String },

    #[error("Not currently recording")]
    NotRecording,

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Invalid session state transition from {from:?} to {to:?}")]
    SessionStateTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("{action} timed out after {after:?}")]
    Timeout { action: String, after: Duration },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
