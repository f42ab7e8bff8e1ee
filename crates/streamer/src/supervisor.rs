//! Stream lifecycle supervisor
//!
//! Owns the session record, launches encoder attempts, and decides after each
//! encoder exit whether to relaunch, give up, or stay stopped.
//!
//! Per attempt three tasks run next to the caller:
//! - the output monitor reading stderr
//! - the health watchdog
//! - the exit handler, which owns the child process and waits for it
//!
//! All of them share one lock around [`SessionState`].

use crate::binaries::BinaryLocator;
use crate::config::Config;
use crate::error::SupervisorError;
use crate::launcher::{Attempt, Launcher, StreamParams};
use crate::monitor::{monitor_output, OutputPatterns, OutputTail};
use crate::probe::{DurationProber, FfprobeProber};
use crate::quality::{is_known_quality, preset_or_default, DEFAULT_QUALITY};
use crate::session::{ConnectionHealth, SessionPhase, SessionState, SharedSession};
use crate::status::StreamStatus;
use crate::watchdog::spawn_watchdog;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Upper bound on waiting for the output monitor after the encoder exits.
/// Grandchildren that inherited stderr can keep the pipe open.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Timing and retry policy for the supervisor
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub watchdog_interval: Duration,
    pub health_timeout: Duration,
    pub patterns: OutputPatterns,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_secs(5),
            watchdog_interval: Duration::from_secs(10),
            health_timeout: Duration::from_secs(30),
            patterns: OutputPatterns::default(),
        }
    }
}

impl SupervisorSettings {
    pub fn from_config(config: &Config) -> Self {
        let stream = &config.stream;
        Self {
            max_retries: stream.max_retries,
            retry_backoff: Duration::from_secs(stream.retry_backoff_secs),
            watchdog_interval: Duration::from_secs(stream.watchdog_interval_secs.max(1)),
            health_timeout: Duration::from_secs(stream.health_timeout_secs),
            patterns: OutputPatterns::default(),
        }
    }
}

struct Inner {
    session: SharedSession,
    launcher: Launcher,
    prober: Arc<dyn DurationProber>,
    settings: SupervisorSettings,
}

/// Supervises one RTMP stream at a time
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct StreamSupervisor {
    inner: Arc<Inner>,
}

impl StreamSupervisor {
    pub fn new(
        launcher: Launcher,
        prober: Arc<dyn DurationProber>,
        settings: SupervisorSettings,
    ) -> Self {
        Self::with_quality(launcher, prober, settings, DEFAULT_QUALITY)
    }

    fn with_quality(
        launcher: Launcher,
        prober: Arc<dyn DurationProber>,
        settings: SupervisorSettings,
        quality: &str,
    ) -> Self {
        let session = SessionState::shared(quality.to_string(), settings.max_retries);
        Self {
            inner: Arc::new(Inner {
                session,
                launcher,
                prober,
                settings,
            }),
        }
    }

    /// Build a supervisor using ffmpeg/ffprobe located per `config`
    pub fn from_config(config: &Config) -> Self {
        let locator = BinaryLocator::new(&config.binaries);

        let mut quality = config.stream.quality.as_str();
        if !is_known_quality(quality) {
            tracing::warn!(quality, "Unknown quality preset in config, using {}", DEFAULT_QUALITY);
            quality = DEFAULT_QUALITY;
        }

        Self::with_quality(
            Launcher::new(locator.clone()),
            Arc::new(FfprobeProber::new(locator)),
            SupervisorSettings::from_config(config),
            quality,
        )
    }

    /// Start streaming `source` to `destination`
    ///
    /// # Errors
    /// - [`SupervisorError::AlreadyStreaming`] if a session is live
    /// - [`SupervisorError::SourceNotFound`] if `source` does not exist
    /// - [`SupervisorError::Launch`] if the encoder cannot be started
    pub async fn start(
        &self,
        source: impl Into<PathBuf>,
        destination: impl Into<String>,
    ) -> Result<(), SupervisorError> {
        let source = source.into();
        let destination = destination.into();

        let quality = {
            let s = self.inner.session.lock().await;
            if s.is_live() {
                return Err(SupervisorError::AlreadyStreaming);
            }
            if !source.exists() {
                return Err(SupervisorError::SourceNotFound(source));
            }
            s.quality.clone()
        };

        // The probe runs unlocked; the session is only claimed once the
        // encoder is running, so a concurrent start may win in between.
        let duration = self.probe_duration(&source).await;
        let params = StreamParams::new(source, destination, *preset_or_default(&quality));

        let mut s = self.inner.session.lock().await;
        if s.is_live() {
            return Err(SupervisorError::AlreadyStreaming);
        }

        let attempt = self.inner.launcher.launch(&params)?;
        s.retry_count = 0;
        s.manual_stop = false;

        let session_id = Uuid::new_v4();
        s.session_id = Some(session_id);
        s.duration = duration;
        tracing::info!(
            session = %session_id,
            source = %params.source.display(),
            quality = params.preset.id,
            duration,
            "Stream started"
        );
        self.begin_attempt(&mut s, params, attempt, ConnectionHealth::Healthy);

        Ok(())
    }

    /// Stop the live session
    ///
    /// Returns once the stop is recorded and the kill signal sent; exit
    /// handling finishes in the background and will not relaunch.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let mut s = self.inner.session.lock().await;
        if !s.is_live() {
            return Err(SupervisorError::NotStreaming);
        }

        // Set before the kill so the exit handler observes it
        s.manual_stop = true;

        if let Some(kill) = s.kill_switch.take() {
            let _ = kill.send(());
        }
        s.deactivate(Instant::now());

        tracing::info!(session = ?s.session_id, "Stream stopped");
        Ok(())
    }

    /// Snapshot of the session; holds the lock only while copying
    pub async fn status(&self) -> StreamStatus {
        let s = self.inner.session.lock().await;
        StreamStatus::capture(&s, Instant::now())
    }

    /// True while a stream is running or waiting to relaunch
    pub async fn is_live(&self) -> bool {
        self.inner.session.lock().await.is_live()
    }

    /// Select the quality preset used by the next start
    pub async fn set_quality(&self, quality: &str) -> Result<(), SupervisorError> {
        if !is_known_quality(quality) {
            return Err(SupervisorError::UnknownQuality(quality.to_string()));
        }
        self.inner.session.lock().await.quality = quality.to_string();
        Ok(())
    }

    pub async fn quality(&self) -> String {
        self.inner.session.lock().await.quality.clone()
    }

    async fn probe_duration(&self, source: &Path) -> f64 {
        let prober = self.inner.prober.clone();
        let path = source.to_path_buf();

        match tokio::task::spawn_blocking(move || prober.probe_duration(&path)).await {
            Ok(Ok(secs)) => secs,
            Ok(Err(e)) => {
                tracing::warn!("Could not get video duration: {}", e);
                0.0
            }
            Err(join_err) => {
                tracing::warn!("Duration probe panicked: {}", join_err);
                0.0
            }
        }
    }

    /// Record a freshly launched attempt and spawn its tasks.
    /// Caller holds the session lock.
    fn begin_attempt(
        &self,
        s: &mut SessionState,
        params: StreamParams,
        attempt: Attempt,
        health: ConnectionHealth,
    ) {
        s.attempt += 1;
        let id = s.attempt;
        let now = Instant::now();

        s.source = params.source.clone();
        s.destination = params.destination.clone();
        s.params = Some(params);
        s.phase = SessionPhase::Streaming;
        s.last_error.clear();
        s.recent_output.clear();
        s.started_at = Some(now);
        s.ended_at = None;
        s.health = health;
        s.last_health_signal_at = now;

        let (kill_tx, kill_rx) = oneshot::channel();
        s.kill_switch = Some(kill_tx);

        let Attempt { child, stderr } = attempt;
        tracing::debug!(attempt = id, pid = child.id(), "Attempt running");
        let settings = &self.inner.settings;
        let session = self.inner.session.clone();

        let monitor = tokio::spawn(monitor_output(stderr, session.clone(), id, settings.patterns));
        spawn_watchdog(
            session,
            id,
            settings.watchdog_interval,
            settings.health_timeout,
        );
        tokio::spawn(self.clone().handle_attempt(id, child, kill_rx, monitor));
    }

    /// Wait for the attempt to exit, then apply the retry policy
    async fn handle_attempt(
        self,
        id: u64,
        mut child: Child,
        kill_rx: oneshot::Receiver<()>,
        mut monitor: JoinHandle<()>,
    ) {
        let exit = tokio::select! {
            status = child.wait() => status,
            _ = kill_rx => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(attempt = id, "Failed to kill encoder: {}", e);
                }
                child.wait().await
            }
        };

        // Let the monitor classify the final lines before reporting them
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut monitor).await.is_err() {
            tracing::debug!(attempt = id, "Encoder output still open, closing it");
            monitor.abort();
        }

        let params = {
            let mut s = self.inner.session.lock().await;
            if s.attempt != id {
                tracing::debug!(attempt = id, "Superseded attempt exited");
                return;
            }
            s.deactivate(Instant::now());

            if s.manual_stop {
                tracing::debug!(attempt = id, "Encoder exited after manual stop");
                return;
            }

            if let Ok(status) = &exit {
                if status.success() {
                    tracing::info!(attempt = id, "Encoder finished, stream ended");
                    return;
                }
            }

            let failure = describe_exit(&exit, &s.recent_output);
            tracing::warn!(attempt = id, "{}", failure.lines().next().unwrap_or_default());

            if s.retry_count >= s.max_retries {
                tracing::warn!(
                    "Maximum reconnection attempts ({}) reached. Stream stopped.",
                    s.max_retries
                );
                s.last_error = format!(
                    "Stream failed after {} reconnection attempts, retries exhausted\n\n{}",
                    s.max_retries, failure
                );
                return;
            }

            s.last_error = failure;
            s.retry_count += 1;
            s.health = ConnectionHealth::Reconnecting;
            s.phase = SessionPhase::AwaitingRetry;
            tracing::info!(
                "Stream disconnected. Attempting reconnect {}/{} in {:?}...",
                s.retry_count,
                s.max_retries,
                self.inner.settings.retry_backoff
            );
            s.params.clone()
        };

        tokio::time::sleep(self.inner.settings.retry_backoff).await;

        let mut s = self.inner.session.lock().await;
        if s.attempt != id || s.phase != SessionPhase::AwaitingRetry || s.manual_stop {
            tracing::debug!(attempt = id, "Pending reconnect cancelled");
            return;
        }
        s.phase = SessionPhase::Idle;

        let Some(params) = params else {
            return;
        };
        match self.inner.launcher.launch(&params) {
            Ok(attempt) => {
                tracing::info!("Reconnect attempt {} successful", s.retry_count);
                self.begin_attempt(&mut s, params, attempt, ConnectionHealth::Reconnecting);
            }
            Err(e) => {
                tracing::warn!("Reconnect failed: {}", e);
                s.last_error = format!("Reconnect attempt {} failed: {}", s.retry_count, e);
                s.health = ConnectionHealth::Disconnected;
            }
        }
    }
}

fn describe_exit(exit: &std::io::Result<ExitStatus>, output: &OutputTail) -> String {
    let reason = match exit {
        Ok(status) => format!("FFmpeg error: {}", status),
        Err(e) => format!("FFmpeg error: {}", e),
    };

    if output.is_empty() {
        reason
    } else {
        format!("{}\n\nLast output:\n{}", reason, output.joined())
    }
}
