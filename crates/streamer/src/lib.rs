//! RTMP restreamer
//!
//! Supervises an FFmpeg process that pushes a local video to an RTMP
//! endpoint: launch, output monitoring, health tracking, bounded automatic
//! reconnection, and status snapshots for a polling UI.

pub mod binaries;
pub mod destination;
pub mod error;
pub mod launcher;
pub mod monitor;
pub mod probe;
pub mod process;
pub mod quality;
pub mod session;
pub mod startup;
pub mod status;
pub mod status_server;
pub mod supervisor;
pub mod watchdog;

pub use restreamer_config as config;
pub use restreamer_config::Config;

pub use binaries::BinaryLocator;
pub use destination::{compose_destination, DestinationError};
pub use error::{LaunchError, SupervisorError};
pub use launcher::{build_ffmpeg_command, Launcher, StreamParams};
pub use monitor::{OutputPatterns, FFMPEG_PATTERNS};
pub use probe::{DurationProber, FfprobeProber, ProbeError};
pub use quality::{find_preset, presets, QualityPreset, DEFAULT_QUALITY};
pub use session::{ConnectionHealth, SessionPhase};
pub use startup::{check_encoder_available, parse_ffmpeg_version, run_startup_checks, StartupError};
pub use status::StreamStatus;
pub use status_server::{create_status_router, run_status_server, ServerError};
pub use supervisor::{StreamSupervisor, SupervisorSettings};
