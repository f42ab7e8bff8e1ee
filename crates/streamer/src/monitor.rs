//! Encoder output monitor
//!
//! Reads the encoder's stderr until it closes, classifies every line as a
//! health signal, an error signal or noise, and keeps the trailing lines for
//! error reports.

use crate::session::SharedSession;
use std::collections::VecDeque;
use std::io;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Number of trailing encoder lines kept for diagnostics
pub const OUTPUT_TAIL_LINES: usize = 20;

/// Substrings that identify encoder diagnostic lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPatterns {
    /// Bumped whenever the matched text changes
    pub revision: u32,
    /// Periodic progress report
    pub health: &'static str,
    /// Network failures
    pub errors: &'static [&'static str],
}

pub const FFMPEG_PATTERNS: OutputPatterns = OutputPatterns {
    revision: 1,
    health: "frame=",
    errors: &[
        "Connection refused",
        "Connection timed out",
        "Failed to update",
        "I/O error",
    ],
};

impl Default for OutputPatterns {
    fn default() -> Self {
        FFMPEG_PATTERNS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Health,
    Error,
    Noise,
}

impl OutputPatterns {
    pub fn classify(&self, line: &str) -> LineClass {
        if line.contains(self.health) {
            LineClass::Health
        } else if self.errors.iter().any(|p| line.contains(p)) {
            LineClass::Error
        } else {
            LineClass::Noise
        }
    }
}

/// Bounded buffer of the most recent output lines
#[derive(Debug, Clone, Default)]
pub struct OutputTail {
    lines: VecDeque<String>,
}

impl OutputTail {
    pub fn push(&mut self, line: String) {
        if self.lines.len() == OUTPUT_TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Lines joined with trailing newlines
    pub fn joined(&self) -> String {
        self.lines.iter().fold(String::new(), |mut out, line| {
            out.push_str(line);
            out.push('\n');
            out
        })
    }
}

/// Splits a diagnostic stream into lines on `\n` or `\r`.
///
/// ffmpeg terminates its progress reports with a bare carriage return, so
/// splitting on newlines alone would batch many reports into one line.
/// Empty fragments are skipped.
pub struct DiagnosticLines<R> {
    reader: R,
    partial: Vec<u8>,
    ready: VecDeque<String>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> DiagnosticLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            partial: Vec::new(),
            ready: VecDeque::new(),
            eof: false,
        }
    }

    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(None);
            }

            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                self.eof = true;
                self.flush_partial();
                continue;
            }

            for &byte in &chunk[..n] {
                if byte == b'\n' || byte == b'\r' {
                    self.flush_partial();
                } else {
                    self.partial.push(byte);
                }
            }
        }
    }

    fn flush_partial(&mut self) {
        if self.partial.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.partial).trim_end().to_string();
        self.partial.clear();
        if !line.is_empty() {
            self.ready.push_back(line);
        }
    }
}

/// Consume one attempt's diagnostic stream until it closes
///
/// Lines from an attempt that is no longer current are drained but do not
/// touch the session.
pub async fn monitor_output<R>(
    stderr: R,
    session: SharedSession,
    attempt: u64,
    patterns: OutputPatterns,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = DiagnosticLines::new(stderr);
    tracing::debug!(attempt, patterns = patterns.revision, "Monitoring encoder output");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(attempt, "Error reading encoder output: {}", e);
                break;
            }
        };

        tracing::trace!(attempt, "{}", line);
        let class = patterns.classify(&line);

        let mut s = session.lock().await;
        if s.attempt != attempt {
            continue;
        }

        // Classify before the line can be evicted from the tail
        match class {
            LineClass::Health => {
                if s.record_health_signal(Instant::now()) {
                    tracing::info!(attempt, "Connection healthy");
                }
            }
            LineClass::Error => {
                if s.record_error_signal() {
                    tracing::warn!(attempt, "Connection degraded: {}", line);
                }
            }
            LineClass::Noise => {}
        }
        s.recent_output.push(line);
    }

    tracing::debug!(attempt, "Encoder output closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ConnectionHealth, SessionPhase, SessionState};
    use proptest::prelude::*;

    async fn collect_lines(input: &[u8]) -> Vec<String> {
        let mut lines = DiagnosticLines::new(input);
        let mut out = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            out.push(line);
        }
        out
    }

    #[test]
    fn test_classify_ffmpeg_lines() {
        let p = FFMPEG_PATTERNS;
        assert_eq!(
            p.classify("frame=  250 fps= 25 q=28.0 size=    1024kB time=00:00:10.00 bitrate= 838.9kbits/s speed=1x"),
            LineClass::Health
        );
        assert_eq!(
            p.classify("[tcp @ 0x55d] Connection to tcp://live.example.com:1935 failed: Connection refused"),
            LineClass::Error
        );
        assert_eq!(p.classify("rtmp://host/app/key: I/O error"), LineClass::Error);
        assert_eq!(p.classify("Connection timed out"), LineClass::Error);
        assert_eq!(p.classify("Failed to update header with correct duration."), LineClass::Error);
        assert_eq!(p.classify("Stream mapping:"), LineClass::Noise);
    }

    #[test]
    fn test_substitute_pattern_table() {
        const FIXTURE: OutputPatterns = OutputPatterns {
            revision: 99,
            health: "tick",
            errors: &["boom"],
        };
        assert_eq!(FIXTURE.classify("tick 1"), LineClass::Health);
        assert_eq!(FIXTURE.classify("frame=1"), LineClass::Noise);
        assert_eq!(FIXTURE.classify("a boom"), LineClass::Error);
    }

    #[test]
    fn test_tail_keeps_last_lines_in_order() {
        let mut tail = OutputTail::default();
        for i in 0..1000 {
            tail.push(format!("line {}", i));
        }
        assert_eq!(tail.len(), OUTPUT_TAIL_LINES);
        let expected: Vec<String> = (980..1000).map(|i| format!("line {}", i)).collect();
        assert_eq!(tail.lines().collect::<Vec<_>>(), expected);
        assert!(tail.joined().starts_with("line 980\n"));
        assert!(tail.joined().ends_with("line 999\n"));
    }

    proptest! {
        #[test]
        fn prop_tail_never_exceeds_bound(count in 0usize..200) {
            let mut tail = OutputTail::default();
            for i in 0..count {
                tail.push(i.to_string());
            }
            prop_assert_eq!(tail.len(), count.min(OUTPUT_TAIL_LINES));
            if count > 0 {
                let last = (count - 1).to_string();
                prop_assert_eq!(tail.lines().last(), Some(last.as_str()));
            }
        }
    }

    #[tokio::test]
    async fn test_split_on_carriage_returns() {
        let input = b"Input #0, mov\nframe=  1 fps=0\rframe=  2 fps=25\r\nlast";
        assert_eq!(
            collect_lines(input).await,
            vec!["Input #0, mov", "frame=  1 fps=0", "frame=  2 fps=25", "last"]
        );
    }

    #[tokio::test]
    async fn test_split_skips_blank_fragments() {
        assert!(collect_lines(b"\r\n\n\r").await.is_empty());
        assert!(collect_lines(b"").await.is_empty());
    }

    #[tokio::test]
    async fn test_monitor_classifies_every_line() {
        let session = SessionState::shared("high".into(), 3);
        {
            let mut s = session.lock().await;
            s.attempt = 7;
            s.phase = SessionPhase::Streaming;
            s.health = ConnectionHealth::Reconnecting;
            s.retry_count = 2;
        }

        // The health signal is the first of 1000 lines and long gone from the
        // tail by the time the stream closes.
        let mut input = String::from("frame=  1 fps=25\n");
        for i in 0..998 {
            input.push_str(&format!("noise {}\n", i));
        }
        input.push_str("Connection refused\n");

        monitor_output(input.as_bytes(), session.clone(), 7, FFMPEG_PATTERNS).await;

        let s = session.lock().await;
        assert_eq!(s.retry_count, 0);
        assert_eq!(s.health, ConnectionHealth::Degraded);
        assert_eq!(s.recent_output.len(), OUTPUT_TAIL_LINES);
        assert_eq!(s.recent_output.lines().last(), Some("Connection refused"));
        assert_eq!(s.recent_output.lines().next(), Some("noise 979"));
    }

    #[tokio::test]
    async fn test_monitor_ignores_stale_attempt() {
        let session = SessionState::shared("high".into(), 3);
        {
            let mut s = session.lock().await;
            s.attempt = 2;
            s.phase = SessionPhase::Streaming;
            s.health = ConnectionHealth::Healthy;
        }

        monitor_output(&b"Connection refused\n"[..], session.clone(), 1, FFMPEG_PATTERNS).await;

        let s = session.lock().await;
        assert_eq!(s.health, ConnectionHealth::Healthy);
        assert!(s.recent_output.is_empty());
    }

    #[tokio::test]
    async fn test_monitor_progress_after_stop_keeps_disconnected() {
        let session = SessionState::shared("high".into(), 3);
        {
            let mut s = session.lock().await;
            s.attempt = 3;
            s.phase = SessionPhase::Streaming;
            s.health = ConnectionHealth::Healthy;
            s.retry_count = 1;
            s.deactivate(Instant::now());
        }

        let input = "frame=  1 fps=25\rframe=  2 fps=25\rframe=  3 fps=25\n".repeat(50);
        monitor_output(input.as_bytes(), session.clone(), 3, FFMPEG_PATTERNS).await;

        let s = session.lock().await;
        assert_eq!(s.health, ConnectionHealth::Disconnected);
        assert_eq!(s.retry_count, 1);
        assert!(!s.is_live());
    }
}
