//! Error types surfaced across the supervisor's method boundary

use std::path::PathBuf;
use thiserror::Error;

/// Failure to start an encoder process
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Executable could not be located
    #[error("{0} not found. Install it or place it in the application directory")]
    ExecutableNotFound(String),

    /// OS refused to start the process
    #[error("Failed to start encoder: {0}")]
    Spawn(#[from] std::io::Error),

    /// Process started without a readable stderr pipe
    #[error("Failed to capture encoder stderr")]
    StderrUnavailable,
}

/// Errors returned synchronously by [`crate::StreamSupervisor`] operations
///
/// Failures that happen after a stream is running are never returned here;
/// they show up in the status snapshot's `error` field instead.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Stream is already running")]
    AlreadyStreaming,

    #[error("No stream is running")]
    NotStreaming,

    #[error("Video file does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Invalid quality preset: {0}")]
    UnknownQuality(String),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}
