//! In-memory preferences server for tests and offline demos.
//!
//! Holds one user's authoritative document, stamps every write with a
//! strictly increasing `lastSyncAt`, and fans each write out as a
//! `preferencesUpdated` frame to attached realtime mocks. Clones share
//! state, so several simulated devices can talk to one server.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use trailsync_types::{
    AnonymousId, AuthUser, DeviceRecord, MapState, MigrateChatRequest, MigrateChatResponse,
    NavigationState, PreferenceDelta, PreferencePatch, PreferenceSet, RealtimeFrame, SyncCursor,
    SyncRequest, SyncResponse, PREFERENCES_TOPIC,
};

use super::PreferencesApi;
use crate::clock::unix_millis;
use crate::error::ClientError;
use crate::realtime::MockRealtimeTransport;

/// A failure to inject into the next call of one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Connectivity lost
    Network,
    /// Server answered with this status
    Status(u16),
}

impl MockFailure {
    fn into_error(self) -> ClientError {
        match self {
            MockFailure::Network => ClientError::Network("connection reset (mock)".into()),
            MockFailure::Status(401) => ClientError::Unauthorized,
            MockFailure::Status(status) => ClientError::Http {
                status,
                message: "mock failure".into(),
            },
        }
    }
}

/// One `POST /auth/migrate-chat` the server received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationCall {
    /// Bearer token the call carried
    pub token: String,
    /// Session being migrated
    pub anonymous_id: AnonymousId,
}

/// Shared in-memory server.
#[derive(Debug, Clone, Default)]
pub struct MockApi {
    inner: Arc<Mutex<MockServerState>>,
}

#[derive(Debug)]
struct MockServerState {
    preferences: PreferenceSet,
    user: AuthUser,
    devices: Vec<DeviceRecord>,
    migrations: Vec<MigrationCall>,
    requests: Vec<String>,
    failures: HashMap<String, VecDeque<MockFailure>>,
    listeners: Vec<MockRealtimeTransport>,
}

impl Default for MockServerState {
    fn default() -> Self {
        Self {
            preferences: PreferenceSet {
                last_sync_at: SyncCursor::from_millis(unix_millis()),
                ..PreferenceSet::default()
            },
            user: AuthUser {
                id: "user-1".into(),
                email: Some("hiker@example.com".into()),
                name: Some("Demo Hiker".into()),
            },
            devices: Vec::new(),
            migrations: Vec::new(),
            requests: Vec::new(),
            failures: HashMap::new(),
            listeners: Vec::new(),
        }
    }
}

impl MockServerState {
    /// Next write stamp: wall clock, but always past the previous one.
    fn stamp(&mut self) -> SyncCursor {
        let next = unix_millis().max(self.preferences.last_sync_at.as_millis() + 1);
        let cursor = SyncCursor::from_millis(next);
        self.preferences.last_sync_at = cursor;
        cursor
    }

    fn broadcast(&self, delta: PreferenceDelta) {
        let frame = RealtimeFrame::PreferencesUpdated(delta);
        for listener in &self.listeners {
            if listener.is_subscribed(PREFERENCES_TOPIC) {
                listener.push_frame(&frame);
            }
        }
    }
}

impl MockApi {
    /// Create a server holding a default document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a server holding `preferences` (its `lastSyncAt` is kept if non-zero).
    pub fn with_preferences(preferences: PreferenceSet) -> Self {
        let api = Self::new();
        api.lock().preferences = PreferenceSet {
            last_sync_at: if preferences.last_sync_at.is_zero() {
                SyncCursor::from_millis(unix_millis())
            } else {
                preferences.last_sync_at
            },
            ..preferences
        };
        api
    }

    /// Current authoritative document.
    pub fn server_preferences(&self) -> PreferenceSet {
        self.lock().preferences.clone()
    }

    /// Simulate a write made elsewhere (another device with no realtime).
    pub fn set_server_preferences(&self, preferences: PreferenceSet) {
        let mut state = self.lock();
        state.preferences = preferences;
        state.stamp();
    }

    /// User returned by `GET /auth/me`.
    pub fn set_user(&self, user: AuthUser) {
        self.lock().user = user;
    }

    /// Registered devices.
    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.lock().devices.clone()
    }

    /// Every migration call received, in order.
    pub fn migrations(&self) -> Vec<MigrationCall> {
        self.lock().migrations.clone()
    }

    /// Every request received, as "METHOD /path".
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    /// Number of requests received for one route.
    pub fn request_count(&self, route: &str) -> usize {
        self.lock().requests.iter().filter(|r| *r == route).count()
    }

    /// Make the next call to `route` (e.g. `"GET /preferences"`) fail.
    ///
    /// Calling this repeatedly queues several failures.
    pub fn fail_next(&self, route: &str, failure: MockFailure) {
        self.lock()
            .failures
            .entry(route.to_string())
            .or_default()
            .push_back(failure);
    }

    /// Deliver every future write to `transport` while it is subscribed.
    pub fn attach_realtime(&self, transport: &MockRealtimeTransport) {
        self.lock().listeners.push(transport.clone());
    }

    /// Clear all state.
    pub fn reset(&self) {
        *self.lock() = MockServerState::default();
    }

    fn lock(&self) -> MutexGuard<'_, MockServerState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Log the request and pop any injected failure.
    fn begin(&self, route: &str) -> Result<MutexGuard<'_, MockServerState>, ClientError> {
        let mut state = self.lock();
        state.requests.push(route.to_string());
        if let Some(failure) = state.failures.get_mut(route).and_then(VecDeque::pop_front) {
            return Err(failure.into_error());
        }
        Ok(state)
    }
}

#[async_trait]
impl PreferencesApi for MockApi {
    async fn get_preferences(&self) -> Result<PreferenceSet, ClientError> {
        let state = self.begin("GET /preferences")?;
        Ok(state.preferences.clone())
    }

    async fn update_preferences(
        &self,
        patch: &PreferencePatch,
    ) -> Result<PreferenceSet, ClientError> {
        let mut state = self.begin("PUT /preferences")?;
        if let Some(theme) = patch.theme {
            state.preferences.theme = theme;
        }
        if let Some(language) = &patch.language {
            state.preferences.language = Some(language.clone());
        }
        if let Some(unit) = patch.distance_unit {
            state.preferences.distance_unit = unit;
        }
        let stamp = state.stamp();
        state.broadcast(PreferenceDelta {
            theme: patch.theme,
            language: patch.language.clone(),
            distance_unit: patch.distance_unit,
            last_sync_at: Some(stamp),
            ..PreferenceDelta::default()
        });
        Ok(state.preferences.clone())
    }

    async fn update_map_state(&self, map_state: &MapState) -> Result<PreferenceSet, ClientError> {
        let mut state = self.begin("PUT /preferences/map-state")?;
        state.preferences.map_state = Some(map_state.clone());
        let stamp = state.stamp();
        state.broadcast(PreferenceDelta {
            map_state: Some(map_state.clone()),
            last_sync_at: Some(stamp),
            ..PreferenceDelta::default()
        });
        Ok(state.preferences.clone())
    }

    async fn update_navigation(
        &self,
        navigation: &NavigationState,
    ) -> Result<PreferenceSet, ClientError> {
        let mut state = self.begin("PUT /preferences/navigation")?;
        state.preferences.navigation = Some(navigation.clone());
        let stamp = state.stamp();
        state.broadcast(PreferenceDelta {
            navigation: Some(navigation.clone()),
            last_sync_at: Some(stamp),
            ..PreferenceDelta::default()
        });
        Ok(state.preferences.clone())
    }

    async fn list_devices(&self) -> Result<Vec<DeviceRecord>, ClientError> {
        let state = self.begin("GET /preferences/devices")?;
        Ok(state.devices.clone())
    }

    async fn register_device(&self, device: &DeviceRecord) -> Result<(), ClientError> {
        let mut state = self.begin("POST /preferences/devices")?;
        upsert_device(&mut state.devices, device);
        Ok(())
    }

    async fn sync(&self, request: &SyncRequest) -> Result<SyncResponse, ClientError> {
        let mut state = self.begin("POST /preferences/sync")?;
        upsert_device(&mut state.devices, &request.device_info);
        let server_cursor = state.preferences.last_sync_at;
        let needs_sync = request
            .last_sync_at
            .map_or(true, |client| client < server_cursor);
        if !needs_sync {
            return Ok(SyncResponse::up_to_date());
        }
        Ok(SyncResponse {
            needs_sync: true,
            preferences: Some(state.preferences.clone()),
            last_sync_at: Some(server_cursor),
        })
    }

    async fn migrate_chat(
        &self,
        token: &str,
        request: &MigrateChatRequest,
    ) -> Result<MigrateChatResponse, ClientError> {
        let mut state = self.begin("POST /auth/migrate-chat")?;
        state.migrations.push(MigrationCall {
            token: token.to_string(),
            anonymous_id: request.anonymous_id.clone(),
        });
        Ok(MigrateChatResponse {
            success: true,
            trip_id: Some(format!("trip-{}", request.anonymous_id)),
            message: None,
        })
    }

    async fn current_user(&self) -> Result<AuthUser, ClientError> {
        let state = self.begin("GET /auth/me")?;
        Ok(state.user.clone())
    }
}

fn upsert_device(devices: &mut Vec<DeviceRecord>, device: &DeviceRecord) {
    match devices.iter_mut().find(|d| d.device_id == device.device_id) {
        Some(existing) => *existing = device.clone(),
        None => devices.push(device.clone()),
    }
}
