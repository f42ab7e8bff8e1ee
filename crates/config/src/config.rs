//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Locations of the encoder and prober executables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BinariesConfig {
    /// Directory holding bundled `ffmpeg`/`ffprobe` executables
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Explicit path to the encoder, takes precedence over `dir`
    #[serde(default)]
    pub ffmpeg: Option<PathBuf>,
    /// Explicit path to the prober, takes precedence over `dir`
    #[serde(default)]
    pub ffprobe: Option<PathBuf>,
}

/// Stream supervision settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
    /// Quality preset selected at startup
    #[serde(default = "default_quality")]
    pub quality: String,
    /// Automatic relaunches allowed per session
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before each relaunch
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    /// How often the health watchdog runs
    #[serde(default = "default_watchdog_interval_secs")]
    pub watchdog_interval_secs: u64,
    /// Silence after which a healthy connection is demoted to degraded
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
}

fn default_quality() -> String {
    "high".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_secs() -> u64 {
    5
}

fn default_watchdog_interval_secs() -> u64 {
    10
}

fn default_health_timeout_secs() -> u64 {
    30
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff_secs(),
            watchdog_interval_secs: default_watchdog_interval_secs(),
            health_timeout_secs: default_health_timeout_secs(),
        }
    }
}

/// HTTP status endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusServerConfig {
    #[serde(default = "default_status_enabled")]
    pub enabled: bool,
    /// Socket address to bind, e.g. `127.0.0.1:7878`
    #[serde(default = "default_status_bind")]
    pub bind: String,
}

fn default_status_enabled() -> bool {
    true
}

fn default_status_bind() -> String {
    "127.0.0.1:7878".to_string()
}

impl Default for StatusServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_status_enabled(),
            bind: default_status_bind(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub binaries: BinariesConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub status_server: StatusServerConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - RESTREAMER_BINARY_DIR -> binaries.dir
    /// - RESTREAMER_FFMPEG -> binaries.ffmpeg
    /// - RESTREAMER_FFPROBE -> binaries.ffprobe
    /// - RESTREAMER_QUALITY -> stream.quality
    /// - RESTREAMER_MAX_RETRIES -> stream.max_retries
    /// - RESTREAMER_RETRY_BACKOFF_SECS -> stream.retry_backoff_secs
    /// - RESTREAMER_STATUS_BIND -> status_server.bind
    /// - RESTREAMER_STATUS_SERVER -> status_server.enabled
    pub fn apply_env_overrides(&mut self) {
        if let Some(val) = non_empty_var("RESTREAMER_BINARY_DIR") {
            self.binaries.dir = Some(PathBuf::from(val));
        }

        if let Some(val) = non_empty_var("RESTREAMER_FFMPEG") {
            self.binaries.ffmpeg = Some(PathBuf::from(val));
        }

        if let Some(val) = non_empty_var("RESTREAMER_FFPROBE") {
            self.binaries.ffprobe = Some(PathBuf::from(val));
        }

        if let Some(val) = non_empty_var("RESTREAMER_QUALITY") {
            self.stream.quality = val;
        }

        if let Ok(val) = env::var("RESTREAMER_MAX_RETRIES") {
            if let Ok(retries) = val.parse::<u32>() {
                self.stream.max_retries = retries;
            }
        }

        if let Ok(val) = env::var("RESTREAMER_RETRY_BACKOFF_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.stream.retry_backoff_secs = secs;
            }
        }

        if let Some(val) = non_empty_var("RESTREAMER_STATUS_BIND") {
            self.status_server.bind = val;
        }

        if let Ok(val) = env::var("RESTREAMER_STATUS_SERVER") {
            // Accept "true", "1", "yes" as true; "false", "0", "no" as false
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.status_server.enabled = true,
                "false" | "0" | "no" => self.status_server.enabled = false,
                _ => {}
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = match Self::load_from_file(path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Config::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        Ok(config)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
