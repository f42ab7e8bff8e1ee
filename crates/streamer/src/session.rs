//! Shared session record
//!
//! One [`SessionState`] lives for the whole supervisor and is reused by each
//! session. The output monitor, the health watchdog, the exit handler and
//! caller operations all mutate it under a single lock.

use crate::launcher::StreamParams;
use crate::monitor::OutputTail;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

/// Connection health as inferred from encoder output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionHealth {
    Disconnected,
    Healthy,
    Degraded,
    Reconnecting,
}

impl ConnectionHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionHealth::Disconnected => "disconnected",
            ConnectionHealth::Healthy => "healthy",
            ConnectionHealth::Degraded => "degraded",
            ConnectionHealth::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    /// An encoder attempt is running
    Streaming,
    /// The last attempt failed and a relaunch is waiting out the backoff
    AwaitingRetry,
}

pub type SharedSession = Arc<Mutex<SessionState>>;

#[derive(Debug)]
pub struct SessionState {
    /// Set when a session is started, kept after it ends
    pub session_id: Option<Uuid>,
    /// Id of the most recent attempt; bumped on every launch
    pub attempt: u64,
    pub source: PathBuf,
    pub destination: String,
    /// Quality selected for the next start
    pub quality: String,
    /// Parameters captured at start and reused for relaunches
    pub params: Option<StreamParams>,
    /// Launch time of the current attempt
    pub started_at: Option<Instant>,
    /// When the session last became inactive
    pub ended_at: Option<Instant>,
    /// Media duration in seconds, 0 when unknown
    pub duration: f64,
    pub phase: SessionPhase,
    pub manual_stop: bool,
    pub health: ConnectionHealth,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: String,
    pub recent_output: OutputTail,
    pub last_health_signal_at: Instant,
    pub(crate) kill_switch: Option<oneshot::Sender<()>>,
}

impl SessionState {
    pub fn new(quality: String, max_retries: u32) -> Self {
        Self {
            session_id: None,
            attempt: 0,
            source: PathBuf::new(),
            destination: String::new(),
            quality,
            params: None,
            started_at: None,
            ended_at: None,
            duration: 0.0,
            phase: SessionPhase::Idle,
            manual_stop: false,
            health: ConnectionHealth::Disconnected,
            retry_count: 0,
            max_retries,
            last_error: String::new(),
            recent_output: OutputTail::default(),
            last_health_signal_at: Instant::now(),
            kill_switch: None,
        }
    }

    pub fn shared(quality: String, max_retries: u32) -> SharedSession {
        Arc::new(Mutex::new(Self::new(quality, max_retries)))
    }

    /// A session is live from Start until it is stopped or gives up,
    /// including the backoff window between attempts.
    pub fn is_live(&self) -> bool {
        self.phase != SessionPhase::Idle
    }

    /// An encoder attempt is running
    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Streaming
    }

    /// Positive progress report from the encoder. Returns true on
    /// transition. Ignored unless an attempt is running, so late output
    /// cannot revive a stopped session or reset retries during backoff.
    pub fn record_health_signal(&mut self, now: Instant) -> bool {
        if !self.is_active() {
            return false;
        }
        self.last_health_signal_at = now;
        if self.health == ConnectionHealth::Healthy {
            return false;
        }
        self.health = ConnectionHealth::Healthy;
        self.retry_count = 0;
        true
    }

    /// Network failure reported by the encoder. Returns true on transition.
    pub fn record_error_signal(&mut self) -> bool {
        if !self.is_active() || self.health == ConnectionHealth::Degraded {
            return false;
        }
        self.health = ConnectionHealth::Degraded;
        true
    }

    /// Demote a healthy connection that has gone quiet. Returns true on
    /// transition.
    pub fn demote_if_silent(&mut self, now: Instant, timeout: Duration) -> bool {
        if self.health != ConnectionHealth::Healthy {
            return false;
        }
        if now.saturating_duration_since(self.last_health_signal_at) > timeout {
            self.health = ConnectionHealth::Degraded;
            return true;
        }
        false
    }

    /// Mark the session idle and disconnected
    pub fn deactivate(&mut self, now: Instant) {
        if self.is_active() {
            self.ended_at = Some(now);
        }
        self.phase = SessionPhase::Idle;
        self.health = ConnectionHealth::Disconnected;
        self.kill_switch = None;
    }
}
