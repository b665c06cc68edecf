//! Error handling for Layerloop
//!
//! There is no watchdog timeout error: a capture that outlives
//! its watchdog completes with whatever data was buffered.

use thiserror::Error;

/// Result type alias for Layerloop operations
pub type Result<T> = std::result::Result<T, LoopError>;

/// Main error type for Layerloop operations
#[derive(Error, Debug)]
pub enum LoopError {
    // Capture Errors
    #[error("Capture produced no data")]
    EmptyCapture,

    #[error("Capture backend failed: {reason}")]
    CaptureBackend { reason: String },

    #[error("Capture device unavailable: {reason}")]
    DeviceUnavailable { reason: String },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Runtime Errors
    #[error("Engine runtime has shut down")]
    EngineClosed,

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LoopError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            LoopError::EmptyCapture => "EMPTY_CAPTURE",
            LoopError::CaptureBackend { .. } => "CAPTURE_BACKEND_ERROR",
            LoopError::DeviceUnavailable { .. } => "DEVICE_UNAVAILABLE",
            LoopError::InvalidConfig { .. } => "INVALID_CONFIG",
            LoopError::EngineClosed => "ENGINE_CLOSED",
            LoopError::Io(_) => "IO_ERROR",
            LoopError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the performance can carry on after this error
    ///
    /// Only a missing device is fatal: the system stays in its
    /// "waiting for device" state.
    pub fn is_recoverable(&self) -> bool {
        match self {
            LoopError::EmptyCapture => true,
            LoopError::CaptureBackend { .. } => true,
            LoopError::InvalidConfig { .. } => true,
            _ => false,
        }
    }

    /// Returns a user-facing recovery suggestion.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            LoopError::EmptyCapture => Some("Nothing was recorded; toggle again to retry."),
            LoopError::CaptureBackend { .. } => {
                Some("The engine is back to idle. Toggle to start a new capture.")
            }
            LoopError::DeviceUnavailable { .. } => {
                Some("Connect a camera and grant capture permission, then restart.")
            }
            LoopError::InvalidConfig { .. } => Some("Check the configuration file values."),
            _ => None,
        }
    }
}
