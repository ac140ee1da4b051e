//! Error types for trailsync wire types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding trailsync data.
#[derive(Debug, Error)]
pub enum SyncError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Frame was valid JSON but not a known event
    #[error("unknown realtime event: {0}")]
    UnknownEvent(String),

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),
}
