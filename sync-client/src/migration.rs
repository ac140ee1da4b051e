//! Anonymous-to-account session migration.
//!
//! Before login, the app records one pending marker. At login the bridge
//! consumes it exactly once: all markers are cleared first, an expired
//! marker is dropped without a network call, and a live one is posted to
//! `POST /auth/migrate-chat` with the fresh token. Nothing here can fail
//! the login; every problem ends up in [`MigrationOutcome`].
//!
//! Older clients stored the same information under two separate keys,
//! `returnToChat` and `anonymousSession`, as plain JSON. Those are still
//! read when no `pendingMigration` marker exists.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use trailsync_core::{
    decide, should_replace, MigrationDecision, MigrationKind, PendingMigration,
    ANONYMOUS_SESSION_TTL,
};
use trailsync_types::{AnonymousId, MigrateChatRequest};

use crate::api::PreferencesApi;
use crate::clock::{Clock, SystemClock};
use crate::storage::{KeyValueStore, StorageError, StorageKey, TypedStore};

/// What happened at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The server took over the anonymous session.
    Migrated {
        /// Trip created from the conversation, if any
        trip_id: Option<String>,
        /// Conversation to reopen, for chat-return markers
        chat_id: Option<String>,
    },
    /// A marker existed but was past its TTL.
    Expired,
    /// No marker.
    NothingPending,
    /// The server call failed or was declined. The marker is gone anyway.
    Failed {
        /// Error or server message
        reason: String,
    },
}

/// `returnToChat` as written by older clients.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyChatReturn {
    anonymous_id: AnonymousId,
    #[serde(default)]
    chat_id: Option<String>,
    #[serde(default, alias = "timestamp")]
    created_at: Option<u64>,
}

/// `anonymousSession` as written by older clients.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyAnonymousSession {
    #[serde(alias = "id")]
    anonymous_id: AnonymousId,
    #[serde(default, alias = "timestamp")]
    created_at: Option<u64>,
}

/// Records anonymous sessions and migrates them at login.
pub struct SessionMigrationBridge {
    storage: Arc<dyn KeyValueStore>,
    api: Arc<dyn PreferencesApi>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SessionMigrationBridge {
    /// Create a bridge with the 24 hour TTL and the system clock.
    pub fn new(storage: Arc<dyn KeyValueStore>, api: Arc<dyn PreferencesApi>) -> Self {
        Self {
            storage,
            api,
            clock: Arc::new(SystemClock),
            ttl: ANONYMOUS_SESSION_TTL,
        }
    }

    /// Use `clock` for marker timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Lifetime of new markers.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The visitor asked to continue `anonymous_id` after signing in.
    ///
    /// Returns whether the marker was stored.
    pub fn record_chat_return(
        &self,
        anonymous_id: AnonymousId,
        chat_id: Option<&str>,
    ) -> Result<bool, StorageError> {
        let mut marker = PendingMigration::new(
            MigrationKind::ChatReturn,
            anonymous_id,
            self.clock.now_millis(),
            self.ttl,
        );
        if let Some(chat_id) = chat_id {
            marker = marker.with_chat_id(chat_id);
        }
        self.record(marker)
    }

    /// A visitor interacted anonymously.
    ///
    /// Does not overwrite a live chat-return marker. Returns whether the
    /// marker was stored.
    pub fn record_anonymous_session(&self, anonymous_id: AnonymousId) -> Result<bool, StorageError> {
        let marker = PendingMigration::new(
            MigrationKind::AnonymousSession,
            anonymous_id,
            self.clock.now_millis(),
            self.ttl,
        );
        self.record(marker)
    }

    /// The marker the next login would consume.
    pub fn pending(&self) -> Option<PendingMigration> {
        self.storage
            .get::<PendingMigration>(StorageKey::PendingMigration)
            .or_else(|| self.legacy_marker())
    }

    /// Consume the pending marker for the login that produced `token`.
    pub async fn on_login(&self, token: &str) -> MigrationOutcome {
        let now = self.clock.now_millis();
        let pending = self.pending();
        self.clear_markers();

        match decide(pending, now) {
            MigrationDecision::Nothing => {
                debug!("no anonymous session to migrate");
                MigrationOutcome::NothingPending
            }
            MigrationDecision::Expired(marker) => {
                info!(
                    anonymous_id = %marker.anonymous_id,
                    "anonymous session expired, not migrating"
                );
                MigrationOutcome::Expired
            }
            MigrationDecision::Submit(marker) => self.submit(token, marker).await,
        }
    }

    async fn submit(&self, token: &str, marker: PendingMigration) -> MigrationOutcome {
        let request = MigrateChatRequest {
            anonymous_id: marker.anonymous_id.clone(),
        };
        match self.api.migrate_chat(token, &request).await {
            Ok(response) if response.success => {
                info!(
                    anonymous_id = %marker.anonymous_id,
                    trip_id = response.trip_id.as_deref(),
                    "anonymous session migrated"
                );
                MigrationOutcome::Migrated {
                    trip_id: response.trip_id,
                    chat_id: marker.chat_id,
                }
            }
            Ok(response) => {
                let reason = response
                    .message
                    .unwrap_or_else(|| "migration declined".to_string());
                warn!(%reason, "chat migration declined");
                MigrationOutcome::Failed { reason }
            }
            Err(e) => {
                warn!(error = %e, "chat migration failed");
                MigrationOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn record(&self, marker: PendingMigration) -> Result<bool, StorageError> {
        let existing = self.pending();
        if !should_replace(existing.as_ref(), &marker, self.clock.now_millis()) {
            debug!("keeping pending chat return");
            return Ok(false);
        }
        self.storage.set(StorageKey::PendingMigration, &marker)?;
        // The tagged marker supersedes anything older clients left behind
        self.storage.delete(StorageKey::ReturnToChat)?;
        self.storage.delete(StorageKey::AnonymousSession)?;
        debug!(kind = ?marker.kind, "pending migration recorded");
        Ok(true)
    }

    fn legacy_marker(&self) -> Option<PendingMigration> {
        if let Some(legacy) = self
            .storage
            .get_unversioned::<LegacyChatReturn>(StorageKey::ReturnToChat)
        {
            let marker = self.marker_from_legacy(
                MigrationKind::ChatReturn,
                legacy.anonymous_id,
                legacy.created_at,
            );
            return Some(match legacy.chat_id {
                Some(chat_id) => marker.with_chat_id(chat_id),
                None => marker,
            });
        }
        self.storage
            .get_unversioned::<LegacyAnonymousSession>(StorageKey::AnonymousSession)
            .map(|legacy| {
                self.marker_from_legacy(
                    MigrationKind::AnonymousSession,
                    legacy.anonymous_id,
                    legacy.created_at,
                )
            })
    }

    /// A legacy entry without a timestamp cannot prove its age; it counts as expired.
    fn marker_from_legacy(
        &self,
        kind: MigrationKind,
        anonymous_id: AnonymousId,
        created_at: Option<u64>,
    ) -> PendingMigration {
        match created_at {
            Some(created_at) => PendingMigration::new(kind, anonymous_id, created_at, self.ttl),
            None => PendingMigration::new(kind, anonymous_id, 0, Duration::ZERO),
        }
    }

    fn clear_markers(&self) {
        for key in [
            StorageKey::PendingMigration,
            StorageKey::ReturnToChat,
            StorageKey::AnonymousSession,
        ] {
            if let Err(e) = self.storage.delete(key) {
                warn!(key = %key, error = %e, "failed to clear migration marker");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockApi, MockFailure};
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;

    const NOW: u64 = 1_700_000_000_000;
    const HOUR_MS: u64 = 60 * 60 * 1000;

    struct Fixture {
        bridge: SessionMigrationBridge,
        api: MockApi,
        storage: MemoryStore,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let api = MockApi::new();
        let storage = MemoryStore::new();
        let clock = ManualClock::new(NOW);
        let bridge = SessionMigrationBridge::new(Arc::new(storage.clone()), Arc::new(api.clone()))
            .with_clock(Arc::new(clock.clone()));
        Fixture {
            bridge,
            api,
            storage,
            clock,
        }
    }

    fn id(value: &str) -> AnonymousId {
        AnonymousId::new(value)
    }

    // ===========================================================================
    // Recording
    // ===========================================================================

    #[test]
    fn chat_return_is_not_replaced_by_anonymous_session() {
        let f = fixture();
        assert!(f
            .bridge
            .record_chat_return(id("chat-anon"), Some("chat-9"))
            .unwrap());
        assert!(!f.bridge.record_anonymous_session(id("other")).unwrap());

        let pending = f.bridge.pending().unwrap();
        assert_eq!(pending.kind, MigrationKind::ChatReturn);
        assert_eq!(pending.anonymous_id, id("chat-anon"));
        assert_eq!(pending.chat_id.as_deref(), Some("chat-9"));
    }

    #[test]
    fn expired_chat_return_can_be_replaced() {
        let f = fixture();
        f.bridge.record_chat_return(id("old"), None).unwrap();
        f.clock.advance(25 * HOUR_MS);

        assert!(f.bridge.record_anonymous_session(id("new")).unwrap());
        assert_eq!(f.bridge.pending().unwrap().anonymous_id, id("new"));
    }

    #[test]
    fn newer_anonymous_session_replaces_older() {
        let f = fixture();
        f.bridge.record_anonymous_session(id("first")).unwrap();
        f.bridge.record_anonymous_session(id("second")).unwrap();
        assert_eq!(f.bridge.pending().unwrap().anonymous_id, id("second"));
    }

    // ===========================================================================
    // Login
    // ===========================================================================

    #[tokio::test]
    async fn login_within_ttl_migrates_once() {
        let f = fixture();
        f.bridge.record_anonymous_session(id("abc123")).unwrap();
        f.clock.advance(23 * HOUR_MS);

        let outcome = f.bridge.on_login("fresh-token").await;

        assert_eq!(
            outcome,
            MigrationOutcome::Migrated {
                trip_id: Some("trip-abc123".into()),
                chat_id: None,
            }
        );
        let calls = f.api.migrations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].anonymous_id, id("abc123"));
        assert_eq!(calls[0].token, "fresh-token");
        assert!(f.bridge.pending().is_none());

        assert_eq!(
            f.bridge.on_login("fresh-token").await,
            MigrationOutcome::NothingPending
        );
        assert_eq!(f.api.migrations().len(), 1);
    }

    #[tokio::test]
    async fn expired_session_is_never_submitted() {
        let f = fixture();
        f.bridge.record_anonymous_session(id("abc123")).unwrap();
        f.clock.advance(24 * HOUR_MS + 1);

        assert_eq!(f.bridge.on_login("tok").await, MigrationOutcome::Expired);
        assert!(f.api.requests().is_empty());
        assert!(f.storage.is_empty());
    }

    #[tokio::test]
    async fn failed_migration_still_clears_marker() {
        let f = fixture();
        f.bridge
            .record_chat_return(id("abc123"), Some("chat-1"))
            .unwrap();
        f.api
            .fail_next("POST /auth/migrate-chat", MockFailure::Status(500));

        let outcome = f.bridge.on_login("tok").await;

        assert!(matches!(outcome, MigrationOutcome::Failed { .. }));
        assert!(f.bridge.pending().is_none());
        assert_eq!(f.bridge.on_login("tok").await, MigrationOutcome::NothingPending);
    }

    #[tokio::test]
    async fn nothing_pending_makes_no_request() {
        let f = fixture();
        assert_eq!(
            f.bridge.on_login("tok").await,
            MigrationOutcome::NothingPending
        );
        assert!(f.api.requests().is_empty());
    }

    #[tokio::test]
    async fn corrupt_marker_counts_as_nothing() {
        let f = fixture();
        f.storage
            .set_raw("pendingMigration", "{not json".into())
            .unwrap();

        assert_eq!(
            f.bridge.on_login("tok").await,
            MigrationOutcome::NothingPending
        );
    }

    // ===========================================================================
    // Legacy keys
    // ===========================================================================

    #[tokio::test]
    async fn legacy_return_to_chat_is_consumed() {
        let f = fixture();
        f.storage
            .set_raw(
                "returnToChat",
                format!(
                    r#"{{"anonymousId":"legacy-1","chatId":"c-7","timestamp":{}}}"#,
                    NOW - HOUR_MS
                ),
            )
            .unwrap();

        let outcome = f.bridge.on_login("tok").await;

        assert_eq!(
            outcome,
            MigrationOutcome::Migrated {
                trip_id: Some("trip-legacy-1".into()),
                chat_id: Some("c-7".into()),
            }
        );
        assert!(f.storage.get_raw("returnToChat").is_none());
    }

    #[tokio::test]
    async fn legacy_session_without_timestamp_is_expired() {
        let f = fixture();
        f.storage
            .set_raw("anonymousSession", r#"{"id":"legacy-2"}"#.into())
            .unwrap();

        assert_eq!(f.bridge.on_login("tok").await, MigrationOutcome::Expired);
        assert!(f.api.migrations().is_empty());
        assert!(f.storage.get_raw("anonymousSession").is_none());
    }

    #[test]
    fn recording_replaces_legacy_keys() {
        let f = fixture();
        f.storage
            .set_raw(
                "anonymousSession",
                format!(r#"{{"id":"legacy-3","createdAt":{}}}"#, NOW),
            )
            .unwrap();

        f.bridge.record_chat_return(id("fresh"), None).unwrap();

        assert!(f.storage.get_raw("anonymousSession").is_none());
        assert_eq!(f.bridge.pending().unwrap().anonymous_id, id("fresh"));
    }
}
