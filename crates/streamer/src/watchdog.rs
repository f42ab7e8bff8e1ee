//! Connection health watchdog
//!
//! Periodically demotes a `healthy` connection to `degraded` when the encoder
//! has stopped reporting progress. Exits once its attempt is no longer the
//! active one.

use crate::session::SharedSession;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

pub fn spawn_watchdog(
    session: SharedSession,
    attempt: u64,
    interval: Duration,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);

        loop {
            ticker.tick().await;

            let mut s = session.lock().await;
            if s.attempt != attempt || !s.is_active() {
                return;
            }

            if s.demote_if_silent(Instant::now(), timeout) {
                tracing::warn!(
                    attempt,
                    "No frame updates in {} seconds, connection degraded",
                    timeout.as_secs()
                );
            }
        }
    })
}
