//! Point-in-time stream status for UI polling

use crate::session::{ConnectionHealth, SessionState};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Immutable copy of the session record. Timing fields are computed when the
/// snapshot is taken.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub is_streaming: bool,
    pub video_path: String,
    #[serde(rename = "rtmpUrl")]
    pub rtmp_url: String,
    pub error: String,
    pub elapsed_seconds: f64,
    pub duration_seconds: f64,
    pub remaining_seconds: f64,
    pub quality: String,
    pub connection_health: ConnectionHealth,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl StreamStatus {
    pub fn capture(s: &SessionState, now: Instant) -> Self {
        let elapsed = elapsed_seconds(s, now);

        Self {
            is_streaming: s.is_active(),
            video_path: s.source.to_string_lossy().to_string(),
            rtmp_url: s.destination.clone(),
            error: s.last_error.clone(),
            elapsed_seconds: elapsed,
            duration_seconds: s.duration,
            remaining_seconds: remaining_seconds(s.duration, elapsed),
            quality: s.quality.clone(),
            connection_health: s.health,
            retry_count: s.retry_count,
            max_retries: s.max_retries,
        }
    }
}

/// Seconds since the current attempt launched, frozen once the session ends
fn elapsed_seconds(s: &SessionState, now: Instant) -> f64 {
    match s.started_at {
        Some(started) => {
            let until = s.ended_at.filter(|_| !s.is_active()).unwrap_or(now);
            until.saturating_duration_since(started).as_secs_f64()
        }
        None => 0.0,
    }
}

/// `max(0, duration - elapsed)`; always 0 for an unknown (zero) duration
pub fn remaining_seconds(duration: f64, elapsed: f64) -> f64 {
    if duration <= 0.0 {
        return 0.0;
    }
    (duration - elapsed).max(0.0)
}
