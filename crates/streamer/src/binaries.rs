//! Executable resolution for the encoder and prober
//!
//! Lookup order for a logical binary name:
//! 1. an explicitly configured path for that binary
//! 2. the configured binaries directory
//! 3. the directory of the running executable
//! 4. `PATH`

use crate::config::BinariesConfig;
use crate::error::LaunchError;
use std::path::{Path, PathBuf};

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";

/// Resolves logical binary names to absolute executable paths
#[derive(Debug, Clone)]
pub struct BinaryLocator {
    dir: Option<PathBuf>,
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
    /// Search the executable's directory and `PATH` after explicit paths
    search_fallbacks: bool,
}

impl BinaryLocator {
    pub fn new(config: &BinariesConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            ffmpeg: config.ffmpeg.clone(),
            ffprobe: config.ffprobe.clone(),
            search_fallbacks: true,
        }
    }

    /// Locator pinned to the given paths; a missing file is
    /// `ExecutableNotFound` rather than a `PATH` hit
    pub fn with_paths(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            dir: None,
            ffmpeg: Some(ffmpeg.into()),
            ffprobe: Some(ffprobe.into()),
            search_fallbacks: false,
        }
    }

    pub fn ffmpeg(&self) -> Result<PathBuf, LaunchError> {
        self.resolve(FFMPEG)
    }

    pub fn ffprobe(&self) -> Result<PathBuf, LaunchError> {
        self.resolve(FFPROBE)
    }

    /// Resolve `name` to an executable path
    pub fn resolve(&self, name: &str) -> Result<PathBuf, LaunchError> {
        let explicit = match name {
            FFMPEG => self.ffmpeg.as_deref(),
            FFPROBE => self.ffprobe.as_deref(),
            _ => None,
        };
        if let Some(path) = explicit.filter(|p| p.is_file()) {
            return Ok(path.to_path_buf());
        }

        if let Some(path) = self.dir.as_deref().and_then(|d| find_in_dir(d, name)) {
            return Ok(path);
        }

        let not_found = || LaunchError::ExecutableNotFound(name.to_string());
        if !self.search_fallbacks {
            return Err(not_found());
        }

        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        if let Some(path) = exe_dir.as_deref().and_then(|d| find_in_dir(d, name)) {
            return Ok(path);
        }

        which::which(name).map_err(|_| not_found())
    }
}

fn find_in_dir(dir: &Path, name: &str) -> Option<PathBuf> {
    let candidate = dir.join(executable_name(name));
    candidate.is_file().then_some(candidate)
}

fn executable_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}
