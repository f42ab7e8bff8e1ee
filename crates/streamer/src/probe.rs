//! Media duration probing via ffprobe

use crate::binaries::BinaryLocator;
use crate::process::std_command;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("ffprobe not found")]
    ExecutableNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ffprobe exited with {0}")]
    Failed(ExitStatus),

    #[error("Failed to parse duration: {0:?}")]
    Parse(String),
}

/// Determines the playback length of a media file, in seconds.
///
/// Called from a blocking thread; implementations may shell out.
pub trait DurationProber: Send + Sync {
    fn probe_duration(&self, path: &Path) -> Result<f64, ProbeError>;
}

/// Prober backed by the `ffprobe` CLI
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    locator: BinaryLocator,
}

impl FfprobeProber {
    pub fn new(locator: BinaryLocator) -> Self {
        Self { locator }
    }
}

impl DurationProber for FfprobeProber {
    fn probe_duration(&self, path: &Path) -> Result<f64, ProbeError> {
        let ffprobe = self
            .locator
            .ffprobe()
            .map_err(|_| ProbeError::ExecutableNotFound)?;

        let output = std_command(ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            return Err(ProbeError::Failed(output.status));
        }

        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Prober that reports a fixed duration without touching the file
#[derive(Debug, Clone, Copy)]
pub struct FixedDuration(pub f64);

impl DurationProber for FixedDuration {
    fn probe_duration(&self, _path: &Path) -> Result<f64, ProbeError> {
        Ok(self.0)
    }
}

/// Parse ffprobe's bare `format=duration` output
pub fn parse_duration(output: &str) -> Result<f64, ProbeError> {
    let text = output.trim();
    match text.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(secs),
        _ => Err(ProbeError::Parse(text.to_string())),
    }
}
