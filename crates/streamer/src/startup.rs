//! Startup checks for the restreamer
//!
//! Verifies the encoder can be located and executed before any stream is
//! attempted.

use crate::binaries::BinaryLocator;
use crate::error::LaunchError;
use crate::process::std_command;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Encoder not available: {0}")]
    EncoderUnavailable(String),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

/// Parse the version token from `ffmpeg -version` output
///
/// Handles various FFmpeg version formats:
/// - Standard: "ffmpeg version 7.1 ..."
/// - N-prefixed: "ffmpeg version n7.1-... ..."
/// - Git builds: "ffmpeg version N-112233-gabcdef ..."
pub fn parse_ffmpeg_version(version_output: &str) -> Option<String> {
    const MARKER: &str = "ffmpeg version";

    version_output.lines().find_map(|line| {
        // ASCII lowercasing keeps byte offsets valid for slicing `line`
        let at = line.to_ascii_lowercase().find(MARKER)? + MARKER.len();
        let token = line[at..].split_whitespace().next()?;
        let version = token.trim_start_matches(['n', 'N']).trim_start_matches('-');
        (!version.is_empty()).then(|| version.to_string())
    })
}

/// Run `<ffmpeg> -version` and return the reported version
pub fn check_encoder_available(ffmpeg: &Path) -> Result<String, StartupError> {
    let output = std_command(ffmpeg).arg("-version").output().map_err(|e| {
        StartupError::EncoderUnavailable(format!(
            "{} -version failed: {}",
            ffmpeg.display(),
            e
        ))
    })?;

    if !output.status.success() {
        return Err(StartupError::EncoderUnavailable(format!(
            "{} -version exited with {}",
            ffmpeg.display(),
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ffmpeg_version(&stdout).ok_or_else(|| {
        StartupError::EncoderUnavailable(format!(
            "Could not parse FFmpeg version from output: {}",
            stdout.lines().next().unwrap_or("(empty)")
        ))
    })
}

/// Locate the encoder and verify it runs
pub fn run_startup_checks(locator: &BinaryLocator) -> Result<String, StartupError> {
    let ffmpeg = locator.ffmpeg()?;
    let version = check_encoder_available(&ffmpeg)?;
    tracing::info!(path = %ffmpeg.display(), version = %version, "Found encoder");

    if let Err(e) = locator.ffprobe() {
        tracing::warn!("{}; stream durations will be unknown", e);
    }
    Ok(version)
}
