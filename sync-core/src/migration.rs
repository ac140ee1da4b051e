//! Pending anonymous-session migration markers.
//!
//! Before login a visitor may chat anonymously. That conversation can be
//! transferred to their account once, at login time. The client remembers
//! it with one [`PendingMigration`] marker:
//!
//! - `chatReturn`: the visitor explicitly asked to continue the chat after
//!   signing in. Takes precedence.
//! - `anonymousSession`: a generic anonymous interaction.
//!
//! Markers expire 24 hours after creation. An expired marker is discarded
//! without ever reaching the network.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use trailsync_types::AnonymousId;

/// Lifetime of an anonymous session marker.
pub const ANONYMOUS_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Which flow created the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MigrationKind {
    /// Explicit "return to chat after login"
    ChatReturn,
    /// Generic anonymous session
    AnonymousSession,
}

/// A migration waiting for the next login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMigration {
    /// Which flow created the marker
    #[serde(rename = "type")]
    pub kind: MigrationKind,
    /// The anonymous session to transfer
    pub anonymous_id: AnonymousId,
    /// Creation time, ms since the Unix epoch
    pub created_at: u64,
    /// Expiry time, ms since the Unix epoch
    pub expires_at: u64,
    /// Conversation to reopen after login, for `chatReturn`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

impl PendingMigration {
    /// Create a marker at `now_ms` that lives for `ttl`.
    pub fn new(
        kind: MigrationKind,
        anonymous_id: AnonymousId,
        now_ms: u64,
        ttl: Duration,
    ) -> Self {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        Self {
            kind,
            anonymous_id,
            created_at: now_ms,
            expires_at: now_ms.saturating_add(ttl_ms),
            chat_id: None,
        }
    }

    /// Attach the conversation id to reopen after login.
    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    /// Whether the marker is past its TTL at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }
}

/// Whether `candidate` should overwrite the stored marker.
///
/// A live `chatReturn` marker is never replaced by an `anonymousSession`
/// marker; anything else is replaced by the newer marker.
pub fn should_replace(
    existing: Option<&PendingMigration>,
    candidate: &PendingMigration,
    now_ms: u64,
) -> bool {
    match existing {
        None => true,
        Some(current) if current.is_expired(now_ms) => true,
        Some(current) => !(current.kind == MigrationKind::ChatReturn
            && candidate.kind == MigrationKind::AnonymousSession),
    }
}

/// What to do with a marker at login time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationDecision {
    /// Submit the marker to the server.
    Submit(PendingMigration),
    /// Marker is past its TTL; discard without a network call.
    Expired(PendingMigration),
    /// Nothing pending.
    Nothing,
}

/// Decide what to do with the marker found at login.
pub fn decide(pending: Option<PendingMigration>, now_ms: u64) -> MigrationDecision {
    match pending {
        None => MigrationDecision::Nothing,
        Some(marker) if marker.is_expired(now_ms) => MigrationDecision::Expired(marker),
        Some(marker) => MigrationDecision::Submit(marker),
    }
}
