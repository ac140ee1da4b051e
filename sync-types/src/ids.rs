//! Identity and ordering types for trailsync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable identifier for one installation of the app.
///
/// Generated once on the client (UUID v4) and never changed afterwards.
/// Stored as an opaque string so identifiers written by older clients in
/// another format are kept as-is rather than regenerated.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new random DeviceId.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier. Returns `None` for blank input.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.0.chars().take(8).collect();
        write!(f, "DeviceId({})", short)
    }
}

/// Identifier of a pre-login (anonymous) chat session.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnonymousId(String);

impl AnonymousId {
    /// Create an AnonymousId from a string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnonymousId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for AnonymousId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnonymousId({})", self.0)
    }
}

/// Server-assigned `lastSyncAt` timestamp, in milliseconds since the Unix epoch.
///
/// Assigned by the server, never by clients. A replica only ever moves its
/// cursor forward.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct SyncCursor(u64);

impl SyncCursor {
    /// Create a new SyncCursor from milliseconds since the epoch.
    pub fn from_millis(value: u64) -> Self {
        Self(value)
    }

    /// Get the value in milliseconds since the epoch.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Cursor representing "never synced".
    pub fn zero() -> Self {
        Self(0)
    }

    /// Whether this cursor is the "never synced" value.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncCursor({})", self.0)
    }
}
