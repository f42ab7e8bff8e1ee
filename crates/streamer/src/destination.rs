//! Ingest URL composition at the caller boundary
//!
//! The supervisor treats the destination as opaque; this is where callers
//! check the scheme and glue on the stream key.

use thiserror::Error;

const ALLOWED_SCHEMES: &[&str] = &["rtmp://", "rtmps://"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DestinationError {
    #[error("Invalid RTMP URL: must start with rtmp:// or rtmps://")]
    InvalidDestination,
}

/// Join an ingest base URL and a stream key
///
/// Trailing slashes on `base` are dropped. The key is appended verbatim, so
/// any `?query` credentials it carries reach the server untouched. An empty
/// key means `base` already is the full URL.
pub fn compose_destination(base: &str, stream_key: &str) -> Result<String, DestinationError> {
    let base = base.trim().trim_end_matches('/');

    if !ALLOWED_SCHEMES.iter().any(|scheme| base.starts_with(scheme)) {
        return Err(DestinationError::InvalidDestination);
    }

    let stream_key = stream_key.trim();
    if stream_key.is_empty() {
        Ok(base.to_string())
    } else {
        Ok(format!("{}/{}", base, stream_key))
    }
}
