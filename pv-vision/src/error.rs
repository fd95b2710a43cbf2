//! Error types for pv-vision
//!
//! Per-frame failures (`NoPersonDetected`, `LowVisibilityLandmark`,
//! `FrameProcessing`) are isolated by the frame pump and never end a session.
//! `VideoSourceDisconnected` ends the session. Session and request errors are
//! reported back to the requesting client.

use thiserror::Error;

/// Main error type for pv-vision
#[derive(Error, Debug)]
pub enum Error {
    /// The landmark provider found no person in the frame
    #[error("No person detected")]
    NoPersonDetected,

    /// A joint required by the analyzer is missing or below the visibility threshold
    #[error("Landmark not visible: {0}")]
    LowVisibilityLandmark(String),

    /// A single frame could not be processed
    #[error("Frame processing error: {0}")]
    FrameProcessing(String),

    /// Capture source failed or could not be opened
    #[error("Video source disconnected: {0}")]
    VideoSourceDisconnected(String),

    /// Start requested while a session is active
    #[error("Session already running")]
    SessionAlreadyRunning,

    /// Stop requested with no active session
    #[error("Session not running")]
    SessionNotRunning,

    /// Outbound queue for a client is closed or full
    #[error("Failed to send to client {0}")]
    ClientSendFailure(String),

    /// Exercise name not in the analyzer table
    #[error("Invalid exercise: {0}")]
    InvalidExercise(String),

    /// Malformed client request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Speech synthesis collaborator failed
    #[error("Speech synthesis error: {0}")]
    Speech(String),

    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] pv_common::Error),
}

/// Convenience Result type using pv-vision Error
pub type Result<T> = std::result::Result<T, Error>;
