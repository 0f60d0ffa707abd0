//! Error types for tonecast-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;
use tonecast_common::DisposedError;

/// Main error type for tonecast-ap module
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration or parameter errors (mismatched buffer sizes,
    /// invalid playback settings, malformed config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Native audio device errors, identifying the failing call
    #[error("Device error during {operation}: {detail}")]
    Device {
        /// Native operation that failed (open, submit, pause, ...)
        operation: &'static str,
        /// Underlying cause
        detail: String,
    },

    /// Playback was requested with no output channels enabled
    #[error("No output channels are enabled for playback")]
    NoChannels,

    /// Playback was requested on an empty playlist
    #[error("The playlist contains no tracks")]
    NoTracks,

    /// Use of an object after dispose, or double dispose
    #[error(transparent)]
    Disposed(#[from] DisposedError),

    /// Playback worker thread terminated abnormally
    #[error("Playback worker failed: {0}")]
    Worker(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Remote catalogue errors
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using tonecast-ap Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a device error.
    pub fn device(operation: &'static str, detail: impl std::fmt::Display) -> Self {
        Error::Device {
            operation,
            detail: detail.to_string(),
        }
    }
}
