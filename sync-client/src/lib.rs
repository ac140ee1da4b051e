//! # sync-client
//!
//! Client library for trailsync cross-device preference sync.
//!
//! This is the I/O half of the engine; the rules live in `trailsync-core`.
//!
//! ## Features
//!
//! - **Device identity**: stable per-installation id and metadata snapshot
//! - **Preference replica**: server-authoritative, last-write-wins per domain
//! - **Realtime push**: WebSocket channel with reconnect and resubscribe
//! - **Session migration**: anonymous chat moved into the account at login
//! - **Idle refresh**: user queries invalidated when the user comes back
//! - **Pluggable collaborators**: REST API, realtime transport, storage and
//!   auth are traits with in-memory mocks
//!
//! ## Example
//!
//! ```ignore
//! use trailsync_client::*;
//!
//! let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(path)?);
//! let auth = Arc::new(AuthSession::new(storage.clone()));
//! let api = Arc::new(HttpApi::new(&config.api.base_url, auth.clone()));
//! let identity = Arc::new(DeviceIdentityManager::new(storage.clone()));
//! let store = Arc::new(PreferenceStore::new(api, storage, auth.clone(), identity));
//! let channel = Arc::new(RealtimeChannel::new(
//!     Arc::new(WebSocketTransport::default()),
//!     auth.clone(),
//!     config.realtime.clone(),
//! ));
//! let coordinator = SyncCoordinator::new(store, channel, theme, auth);
//!
//! coordinator.init().await?;
//! coordinator.set_theme(Theme::Dark).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod idle;
pub mod migration;
pub mod preferences;
pub mod realtime;
pub mod storage;
pub mod theme;

#[cfg(test)]
mod testing;

pub use api::{HttpApi, MigrationCall, MockApi, MockFailure, PreferencesApi};
pub use auth::{AuthProvider, AuthSession};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, ConfigError};
pub use coordinator::{retry_with_backoff, SyncCoordinator, DEFAULT_RETRY_DELAY};
pub use device::{device_name, DeviceIdentityManager, RuntimeEnvironment};
pub use error::ClientError;
pub use idle::{IdleActivityMonitor, QueryCache, QueryKey};
pub use migration::{MigrationOutcome, SessionMigrationBridge};
pub use preferences::{PreferenceStore, SyncOutcome};
pub use realtime::{
    ChannelNotice, HandlerId, MockRealtimeTransport, NoticeKind, RealtimeChannel,
    RealtimeTransport, TransportError, WebSocketTransport,
};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError, StorageKey, TypedStore};
pub use theme::{
    FixedAppearance, ResolvedTheme, SystemAppearance, ThemeController, ThemeSink, ThemeSnapshot,
};

pub use trailsync_core::{
    ActivityKind, ChangedFields, ChannelEvent, ConnectionStatus, MigrationKind, PendingMigration,
    PreferenceField,
};
pub use trailsync_types::{
    AnonymousId, AuthUser, DeviceId, DeviceRecord, DeviceType, DistanceUnit, LatLng, MapState,
    NavigationState, PreferenceDelta, PreferencePatch, PreferenceSet, SyncCursor, Theme,
};
