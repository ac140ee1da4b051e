//! Client replica of the user's preference document.
//!
//! [`PreferenceStore`] wraps the pure [`PreferenceReplica`] and
//! [`CursorTracker`] with the REST collaborator and durable storage:
//!
//! - `load()` and `sync()` adopt the whole server document and move the
//!   cursor.
//! - Domain writes adopt only their own domain from the response. The
//!   cursor stays put, so the next `sync()` still pulls what other devices
//!   wrote meanwhile.
//! - Realtime deltas merge field by field and never move the cursor.
//!
//! Every request captures the auth generation when it starts; a response
//! that resolves after a login or logout is dropped with
//! [`ClientError::AuthChanged`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};
use trailsync_core::{ChangedFields, CursorTracker, PreferenceReplica};
use trailsync_types::{
    DeviceRecord, MapState, NavigationState, PreferenceDelta, PreferenceDomain, PreferencePatch,
    PreferenceSet, SyncCursor, SyncRequest, Theme,
};

use crate::api::PreferencesApi;
use crate::auth::AuthProvider;
use crate::clock::{Clock, SystemClock};
use crate::device::{DeviceIdentityManager, RuntimeEnvironment};
use crate::error::ClientError;
use crate::storage::{KeyValueStore, StorageKey, TypedStore};

/// Default lifetime of the cached map view.
pub const DEFAULT_MAP_VIEW_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Result of [`PreferenceStore::sync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Server said `needsSync: false`.
    UpToDate,
    /// The server document was adopted.
    Updated(ChangedFields),
    /// The server document was older than the replica and was dropped.
    Stale,
}

#[derive(Debug, Default)]
struct ReplicaState {
    replica: PreferenceReplica,
    cursor: CursorTracker,
}

/// Preference replica backed by the REST API and local storage.
pub struct PreferenceStore {
    api: Arc<dyn PreferencesApi>,
    storage: Arc<dyn KeyValueStore>,
    auth: Arc<dyn AuthProvider>,
    identity: Arc<DeviceIdentityManager>,
    environment: RuntimeEnvironment,
    clock: Arc<dyn Clock>,
    map_view_ttl: Duration,
    state: Mutex<ReplicaState>,
}

impl PreferenceStore {
    /// Create an empty store. Call [`restore`](Self::restore) to pick up the
    /// cached document from a previous run.
    pub fn new(
        api: Arc<dyn PreferencesApi>,
        storage: Arc<dyn KeyValueStore>,
        auth: Arc<dyn AuthProvider>,
        identity: Arc<DeviceIdentityManager>,
    ) -> Self {
        Self {
            api,
            storage,
            auth,
            identity,
            environment: RuntimeEnvironment::detect(),
            clock: Arc::new(SystemClock),
            map_view_ttl: DEFAULT_MAP_VIEW_TTL,
            state: Mutex::new(ReplicaState::default()),
        }
    }

    /// Describe this device with `environment` instead of the detected one.
    pub fn with_environment(mut self, environment: RuntimeEnvironment) -> Self {
        self.environment = environment;
        self
    }

    /// Use `clock` for cache expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Keep the cached map view for `ttl`.
    pub fn with_map_view_ttl(mut self, ttl: Duration) -> Self {
        self.map_view_ttl = ttl;
        self
    }

    /// Seed the replica from the document cached by a previous run.
    ///
    /// Returns true if a cached document was found.
    pub fn restore(&self) -> bool {
        let Some(document) = self.storage.get::<PreferenceSet>(StorageKey::Preferences) else {
            return false;
        };
        let cursor = self
            .storage
            .get::<SyncCursor>(StorageKey::LastSyncAt)
            .unwrap_or_default();
        let mut state = self.lock();
        state.replica.replace(document);
        state.cursor.advance(cursor);
        debug!(cursor = %cursor, "restored cached preferences");
        true
    }

    /// Fetch the full document and register this device.
    ///
    /// On failure the replica is left as it was and the error is returned.
    /// A failed device registration is logged and does not fail the load.
    pub async fn load(&self) -> Result<PreferenceSet, ClientError> {
        let generation = self.begin()?;
        let incoming = self.api.get_preferences().await?;
        self.ensure_generation(generation)?;

        let stamp = incoming.last_sync_at;
        let document = self.commit(|state| {
            state.cursor.advance(stamp);
            state.replica.replace(incoming)
        })?;
        info!(cursor = %stamp, "preferences loaded");

        let device = self.device_info();
        if let Err(e) = self.api.register_device(&device).await {
            warn!(error = %e, "device registration failed");
        }
        Ok(document)
    }

    /// Write general preferences (`PUT /preferences`).
    pub async fn update_general(&self, patch: &PreferencePatch) -> Result<PreferenceSet, ClientError> {
        let generation = self.begin()?;
        let response = self.api.update_preferences(patch).await?;
        self.ensure_generation(generation)?;
        self.commit(|state| {
            state
                .replica
                .apply_domain(PreferenceDomain::General, &response)
        })
    }

    /// Write the map view (`PUT /preferences/map-state`).
    pub async fn update_map_state(&self, map_state: &MapState) -> Result<PreferenceSet, ClientError> {
        let generation = self.begin()?;
        let response = self.api.update_map_state(map_state).await?;
        self.ensure_generation(generation)?;
        self.commit(|state| {
            state
                .replica
                .apply_domain(PreferenceDomain::MapState, &response)
        })
    }

    /// Write navigation state (`PUT /preferences/navigation`).
    pub async fn update_navigation(
        &self,
        navigation: &NavigationState,
    ) -> Result<PreferenceSet, ClientError> {
        let generation = self.begin()?;
        let response = self.api.update_navigation(navigation).await?;
        self.ensure_generation(generation)?;
        self.commit(|state| {
            state
                .replica
                .apply_domain(PreferenceDomain::Navigation, &response)
        })
    }

    /// Pull changes newer than the local cursor.
    ///
    /// Calling this twice with no server change in between is a no-op the
    /// second time.
    pub async fn sync(&self) -> Result<SyncOutcome, ClientError> {
        let generation = self.begin()?;
        let request = SyncRequest::new(self.last_sync_at(), self.device_info());
        let response = self.api.sync(&request).await?;
        self.ensure_generation(generation)?;

        if !response.needs_sync {
            debug!(cursor = %self.last_sync_at(), "preferences up to date");
            return Ok(SyncOutcome::UpToDate);
        }
        let incoming = response.preferences.ok_or_else(|| {
            ClientError::Protocol("needsSync without preferences".to_string())
        })?;
        let server_cursor = response.last_sync_at.unwrap_or(incoming.last_sync_at);

        let changed = {
            let mut state = self.lock();
            state.cursor.advance(server_cursor);
            state.replica.replace(incoming)
        };
        self.persist();
        match changed {
            Some(changed) => {
                info!(cursor = %server_cursor, fields = changed.len(), "preferences synced");
                Ok(SyncOutcome::Updated(changed))
            }
            None => {
                debug!(cursor = %server_cursor, "sync response older than replica, dropped");
                Ok(SyncOutcome::Stale)
            }
        }
    }

    /// Merge a realtime delta. Returns the fields whose value changed.
    pub fn apply_remote(&self, delta: &PreferenceDelta) -> ChangedFields {
        let changed = self.lock().replica.merge_delta(delta);
        if changed.is_empty() {
            debug!("realtime update changed nothing");
        } else {
            debug!(fields = changed.len(), "realtime update merged");
            self.persist();
        }
        changed
    }

    /// Devices registered for this user.
    pub async fn list_devices(&self) -> Result<Vec<DeviceRecord>, ClientError> {
        self.begin()?;
        self.api.list_devices().await
    }

    /// Snapshot of this device.
    pub fn device_info(&self) -> DeviceRecord {
        self.identity.device_info(&self.environment)
    }

    /// Current document, if loaded.
    pub fn preferences(&self) -> Option<PreferenceSet> {
        self.lock().replica.document().cloned()
    }

    /// Current theme: the replica's, else the cached one.
    pub fn theme(&self) -> Option<Theme> {
        let loaded = self.lock().replica.document().map(|d| d.theme);
        loaded.or_else(|| self.cached_theme())
    }

    /// Theme cached by a previous run.
    pub fn cached_theme(&self) -> Option<Theme> {
        self.storage.get(StorageKey::Theme)
    }

    /// Map view cached within its TTL.
    pub fn cached_map_view(&self) -> Option<MapState> {
        self.storage
            .get_at(StorageKey::MapView, self.clock.now_millis())
    }

    /// Highest server cursor adopted by load or sync.
    pub fn last_sync_at(&self) -> SyncCursor {
        self.lock().cursor.last_cursor()
    }

    /// Whether a document is held.
    pub fn is_loaded(&self) -> bool {
        self.lock().replica.is_loaded()
    }

    /// Forget the replica, the cursor and the cached document.
    ///
    /// The cached theme survives so the signed-out UI keeps its look.
    pub fn clear(&self) {
        {
            let mut state = self.lock();
            state.replica.clear();
            state.cursor.reset();
        }
        for key in [
            StorageKey::Preferences,
            StorageKey::LastSyncAt,
            StorageKey::MapView,
        ] {
            if let Err(e) = self.storage.delete(key) {
                warn!(key = %key, error = %e, "failed to clear cached preferences");
            }
        }
        debug!("preference replica cleared");
    }

    fn begin(&self) -> Result<u64, ClientError> {
        if !self.auth.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }
        Ok(self.auth.generation())
    }

    fn ensure_generation(&self, started: u64) -> Result<(), ClientError> {
        if self.auth.generation() != started || !self.auth.is_authenticated() {
            debug!("auth changed while request was in flight, dropping response");
            return Err(ClientError::AuthChanged);
        }
        Ok(())
    }

    /// Apply a server response and persist the result.
    fn commit<F>(&self, apply: F) -> Result<PreferenceSet, ClientError>
    where
        F: FnOnce(&mut ReplicaState) -> Option<ChangedFields>,
    {
        let (changed, document) = {
            let mut state = self.lock();
            let changed = apply(&mut state);
            (changed, state.replica.document().cloned())
        };
        match &changed {
            Some(fields) if fields.is_empty() => debug!("response matched local state"),
            Some(fields) => debug!(fields = fields.len(), "response applied"),
            None => debug!("response older than replica, dropped"),
        }
        if changed.is_some() {
            self.persist();
        }
        document.ok_or_else(|| ClientError::Protocol("no preferences after apply".to_string()))
    }

    /// Write the replica to storage. Failures only cost the cold-start cache.
    fn persist(&self) {
        let (document, cursor) = {
            let state = self.lock();
            (state.replica.document().cloned(), state.cursor.last_cursor())
        };
        let Some(document) = document else {
            return;
        };

        let mut result = self
            .storage
            .set(StorageKey::Preferences, &document)
            .and_then(|()| self.storage.set(StorageKey::LastSyncAt, &cursor))
            .and_then(|()| self.storage.set(StorageKey::Theme, &document.theme));
        if let Some(map_state) = &document.map_state {
            result = result.and_then(|()| {
                self.storage.set_with_ttl(
                    StorageKey::MapView,
                    map_state,
                    self.map_view_ttl,
                    self.clock.now_millis(),
                )
            });
        }
        if let Err(e) = result {
            warn!(error = %e, "failed to cache preferences");
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReplicaState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
