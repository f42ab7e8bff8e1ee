//! Encoder launcher
//!
//! Builds the ffmpeg invocation for one streaming attempt and starts it with
//! stderr piped for the output monitor.

use crate::binaries::BinaryLocator;
use crate::error::LaunchError;
use crate::process::tokio_command;
use crate::quality::QualityPreset;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, ChildStderr, Command};

/// Inputs for a single encoder run
#[derive(Debug, Clone)]
pub struct StreamParams {
    /// Local video file to read at native frame rate
    pub source: PathBuf,
    /// Ingest URL, passed through as one opaque argument
    pub destination: String,
    pub preset: QualityPreset,
}

impl StreamParams {
    pub fn new(source: PathBuf, destination: String, preset: QualityPreset) -> Self {
        Self {
            source,
            destination,
            preset,
        }
    }
}

/// A running encoder process and its diagnostic stream
#[derive(Debug)]
pub struct Attempt {
    pub child: Child,
    pub stderr: ChildStderr,
}

/// Build the encoder command for `params`
///
/// Creates a Command configured with:
/// - native-rate input from the source file
/// - libx264/veryfast video capped by the preset's bitrate, buffer and size
/// - AAC 128k stereo-rate audio
/// - FLV output to the destination URL
pub fn build_ffmpeg_command(program: &Path, params: &StreamParams) -> Command {
    let mut cmd = tokio_command(program);
    let preset = &params.preset;

    cmd.arg("-re");
    cmd.arg("-i").arg(&params.source);

    cmd.arg("-c:v").arg("libx264");
    cmd.arg("-preset").arg("veryfast");
    cmd.arg("-maxrate").arg(preset.max_bitrate);
    cmd.arg("-bufsize").arg(preset.buffer_size);
    cmd.arg("-s").arg(preset.resolution);
    cmd.arg("-pix_fmt").arg("yuv420p");
    cmd.arg("-g").arg("50");

    cmd.arg("-c:a").arg("aac");
    cmd.arg("-b:a").arg("128k");
    cmd.arg("-ar").arg("44100");

    cmd.arg("-f").arg("flv");
    cmd.arg("-flvflags").arg("no_duration_filesize");

    // Everything after the app name, query included, is the stream key to
    // the server. Never re-encode it.
    cmd.arg(&params.destination);

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cmd
}

/// Starts encoder attempts using executables from a [`BinaryLocator`]
#[derive(Debug, Clone)]
pub struct Launcher {
    locator: BinaryLocator,
}

impl Launcher {
    pub fn new(locator: BinaryLocator) -> Self {
        Self { locator }
    }

    /// Start the encoder without waiting for it to finish
    ///
    /// # Errors
    /// Returns an error if:
    /// - the ffmpeg executable cannot be located
    /// - the OS refuses to start the process
    pub fn launch(&self, params: &StreamParams) -> Result<Attempt, LaunchError> {
        let ffmpeg = self.locator.ffmpeg()?;
        let mut cmd = build_ffmpeg_command(&ffmpeg, params);

        tracing::info!(
            program = %ffmpeg.display(),
            args = ?cmd.as_std().get_args().collect::<Vec<_>>(),
            "Starting encoder"
        );

        let mut child = cmd.spawn()?;
        let stderr = child.stderr.take().ok_or(LaunchError::StderrUnavailable)?;

        Ok(Attempt { child, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::{find_preset, presets};
    use proptest::prelude::*;
    use std::ffi::OsStr;

    /// Helper to convert Command args to a Vec of strings for easier testing
    fn get_command_args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .filter_map(|arg| arg.to_str().map(String::from))
            .collect()
    }

    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|pair| pair[0] == flag && pair[1] == value)
    }

    fn path_strategy() -> impl Strategy<Value = String> {
        prop::string::string_regex("[a-zA-Z0-9_/. -]{1,50}").unwrap()
    }

    fn destination_strategy() -> impl Strategy<Value = String> {
        (
            prop::sample::select(vec!["rtmp", "rtmps"]),
            "[a-z0-9.]{1,20}",
            "[a-z]{1,10}",
            "[a-zA-Z0-9_-]{1,20}",
            proptest::option::of("[a-z]{1,8}=[a-zA-Z0-9%&=]{1,16}"),
        )
            .prop_map(|(scheme, host, app, key, query)| match query {
                Some(q) => format!("{}://{}/{}/{}?{}", scheme, host, app, key, q),
                None => format!("{}://{}/{}/{}", scheme, host, app, key),
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_ffmpeg_command_completeness(
            source in path_strategy(),
            destination in destination_strategy(),
            preset_idx in 0usize..4,
        ) {
            let preset = presets()[preset_idx];
            let params = StreamParams::new(PathBuf::from(&source), destination.clone(), preset);

            let cmd = build_ffmpeg_command(Path::new("/opt/bin/ffmpeg"), &params);
            let args = get_command_args(&cmd);

            prop_assert_eq!(cmd.as_std().get_program(), OsStr::new("/opt/bin/ffmpeg"));
            prop_assert_eq!(args.first().map(String::as_str), Some("-re"));
            prop_assert!(has_flag_with_value(&args, "-i", &source), "args: {:?}", args);
            prop_assert!(has_flag_with_value(&args, "-maxrate", preset.max_bitrate));
            prop_assert!(has_flag_with_value(&args, "-bufsize", preset.buffer_size));
            prop_assert!(has_flag_with_value(&args, "-s", preset.resolution));
            prop_assert!(has_flag_with_value(&args, "-c:v", "libx264"));
            prop_assert!(has_flag_with_value(&args, "-f", "flv"));

            // Destination is the final argument, byte for byte
            prop_assert_eq!(args.last(), Some(&destination));
            prop_assert_eq!(args.iter().filter(|a| **a == destination).count(), 1);
        }
    }

    #[test]
    fn test_fixed_encoder_settings() {
        let params = StreamParams::new(
            PathBuf::from("/media/video.mp4"),
            "rtmp://live.example.com/app/key?password=a&b=c".to_string(),
            *find_preset("medium").unwrap(),
        );
        let args = get_command_args(&build_ffmpeg_command(Path::new("ffmpeg"), &params));

        for (flag, value) in [
            ("-preset", "veryfast"),
            ("-pix_fmt", "yuv420p"),
            ("-g", "50"),
            ("-c:a", "aac"),
            ("-b:a", "128k"),
            ("-ar", "44100"),
            ("-flvflags", "no_duration_filesize"),
            ("-s", "1280x720"),
        ] {
            assert!(has_flag_with_value(&args, flag, value), "missing {} {}", flag, value);
        }
    }

    #[tokio::test]
    async fn test_launch_missing_executable() {
        let launcher = Launcher::new(BinaryLocator::with_paths(
            "/nonexistent/ffmpeg",
            "/nonexistent/ffprobe",
        ));
        let params = StreamParams::new(
            PathBuf::from("/media/video.mp4"),
            "rtmp://localhost/live/key".to_string(),
            *find_preset("high").unwrap(),
        );

        let err = launcher.launch(&params).unwrap_err();
        assert!(matches!(err, LaunchError::ExecutableNotFound(ref n) if n == "ffmpeg"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_rejected_by_os() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let not_executable = dir.path().join("ffmpeg");
        std::fs::write(&not_executable, b"#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&not_executable, std::fs::Permissions::from_mode(0o644))
            .unwrap();

        let launcher = Launcher::new(BinaryLocator::with_paths(&not_executable, "/nonexistent"));
        let params = StreamParams::new(
            PathBuf::from("/media/video.mp4"),
            "rtmp://localhost/live/key".to_string(),
            *find_preset("low").unwrap(),
        );

        let err = launcher.launch(&params).unwrap_err();
        assert!(matches!(err, LaunchError::Spawn(_)));
    }
}
