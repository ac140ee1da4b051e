//! REST collaborator for the preferences server.
//!
//! | Method | Path                         | Body                     |
//! |--------|------------------------------|--------------------------|
//! | GET    | `/preferences`               |                          |
//! | PUT    | `/preferences`               | `PreferencePatch`        |
//! | PUT    | `/preferences/map-state`     | `MapState`               |
//! | PUT    | `/preferences/navigation`    | `NavigationState`        |
//! | GET    | `/preferences/devices`       |                          |
//! | POST   | `/preferences/devices`       | `DeviceRecord`           |
//! | POST   | `/preferences/sync`          | `SyncRequest`            |
//! | POST   | `/auth/migrate-chat`         | `MigrateChatRequest`     |
//! | GET    | `/auth/me`                   |                          |
//!
//! Every write answers with the full authoritative `PreferenceSet`.

mod http;
mod mock;

pub use http::HttpApi;
pub use mock::{MigrationCall, MockApi, MockFailure};

use async_trait::async_trait;
use trailsync_types::{
    AuthUser, DeviceRecord, MapState, MigrateChatRequest, MigrateChatResponse, NavigationState,
    PreferencePatch, PreferenceSet, SyncRequest, SyncResponse,
};

use crate::error::ClientError;

/// Calls the engine makes against the server.
#[async_trait]
pub trait PreferencesApi: Send + Sync {
    /// `GET /preferences`
    async fn get_preferences(&self) -> Result<PreferenceSet, ClientError>;

    /// `PUT /preferences` (general domain only)
    async fn update_preferences(
        &self,
        patch: &PreferencePatch,
    ) -> Result<PreferenceSet, ClientError>;

    /// `PUT /preferences/map-state`
    async fn update_map_state(&self, map_state: &MapState) -> Result<PreferenceSet, ClientError>;

    /// `PUT /preferences/navigation`
    async fn update_navigation(
        &self,
        navigation: &NavigationState,
    ) -> Result<PreferenceSet, ClientError>;

    /// `GET /preferences/devices`
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>, ClientError>;

    /// `POST /preferences/devices`
    async fn register_device(&self, device: &DeviceRecord) -> Result<(), ClientError>;

    /// `POST /preferences/sync`
    async fn sync(&self, request: &SyncRequest) -> Result<SyncResponse, ClientError>;

    /// `POST /auth/migrate-chat`, authorized with the token from this login.
    async fn migrate_chat(
        &self,
        token: &str,
        request: &MigrateChatRequest,
    ) -> Result<MigrateChatResponse, ClientError>;

    /// `GET /auth/me`
    async fn current_user(&self) -> Result<AuthUser, ClientError>;
}
