//! Durable local key-value storage.
//!
//! The raw [`KeyValueStore`] trait moves strings. [`TypedStore`] sits on top
//! of any store and wraps every value in a versioned envelope:
//!
//! ```json
//! {"v": 1, "data": {...}, "expiresAt": 1700000000000}
//! ```
//!
//! Reads never fail. An entry that is malformed, has the wrong version or is
//! past `expiresAt` is removed and reported as absent.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::clock::unix_millis;

/// Envelope version written by this build.
pub const STORAGE_VERSION: u32 = 1;

/// Storage errors. Only writes surface these.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to read or write the backing file.
    #[error("storage I/O error at {path}: {source}")]
    Io {
        /// Backing file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Value could not be encoded.
    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Every durable key the engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Stable per-installation device id
    DeviceId,
    /// Bearer token
    Token,
    /// Cached authenticated user
    User,
    /// Last applied theme
    Theme,
    /// Tagged anonymous-session migration marker
    PendingMigration,
    /// Legacy "return to chat after login" marker
    ReturnToChat,
    /// Legacy anonymous session marker
    AnonymousSession,
    /// Last known preference document
    Preferences,
    /// Last server sync cursor
    LastSyncAt,
    /// Last map view, TTL-bounded
    MapView,
}

impl StorageKey {
    /// The key string used in the backing store.
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKey::DeviceId => "deviceId",
            StorageKey::Token => "token",
            StorageKey::User => "user",
            StorageKey::Theme => "theme",
            StorageKey::PendingMigration => "pendingMigration",
            StorageKey::ReturnToChat => "returnToChat",
            StorageKey::AnonymousSession => "anonymousSession",
            StorageKey::Preferences => "preferences",
            StorageKey::LastSyncAt => "lastSyncAt",
            StorageKey::MapView => "mapView",
        }
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw string storage.
///
/// Implementations synchronize internally; all methods take `&self`.
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value for `key`.
    fn get_raw(&self, key: &str) -> Option<String>;

    /// Write the raw value for `key`.
    fn set_raw(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Serialize)]
struct EnvelopeOut<'a, T> {
    v: u32,
    data: &'a T,
    #[serde(rename = "expiresAt", skip_serializing_if = "Option::is_none")]
    expires_at: Option<u64>,
}

#[derive(Deserialize)]
struct EnvelopeIn<T> {
    v: u32,
    data: T,
    #[serde(rename = "expiresAt", default)]
    expires_at: Option<u64>,
}

/// Typed, versioned access on top of any [`KeyValueStore`].
pub trait TypedStore: KeyValueStore {
    /// Read and decode `key`, treating any damage as absence.
    fn get<T: DeserializeOwned>(&self, key: StorageKey) -> Option<T> {
        self.get_at(key, unix_millis())
    }

    /// Like [`TypedStore::get`] with an explicit "now" for TTL checks.
    fn get_at<T: DeserializeOwned>(&self, key: StorageKey, now_ms: u64) -> Option<T> {
        let raw = self.get_raw(key.as_str())?;
        let reason = match serde_json::from_str::<EnvelopeIn<T>>(&raw) {
            Ok(envelope) if envelope.v != STORAGE_VERSION => {
                format!("unsupported version {}", envelope.v)
            }
            Ok(envelope) => match envelope.expires_at {
                Some(expires_at) if now_ms >= expires_at => {
                    // Expiry is normal; not worth a warning.
                    self.discard(key);
                    return None;
                }
                _ => return Some(envelope.data),
            },
            Err(e) => e.to_string(),
        };
        warn!(key = %key, %reason, "discarding unreadable storage entry");
        self.discard(key);
        None
    }

    /// Read a value written without an envelope by an older client.
    fn get_unversioned<T: DeserializeOwned>(&self, key: StorageKey) -> Option<T> {
        let raw = self.get_raw(key.as_str())?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "discarding unreadable legacy entry");
                self.discard(key);
                None
            }
        }
    }

    /// Encode and write `value` under `key`.
    fn set<T: Serialize>(&self, key: StorageKey, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(&EnvelopeOut {
            v: STORAGE_VERSION,
            data: value,
            expires_at: None,
        })?;
        self.set_raw(key.as_str(), raw)
    }

    /// Encode and write `value`, expiring `ttl` after `now_ms`.
    fn set_with_ttl<T: Serialize>(
        &self,
        key: StorageKey,
        value: &T,
        ttl: Duration,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let raw = serde_json::to_string(&EnvelopeOut {
            v: STORAGE_VERSION,
            data: value,
            expires_at: Some(now_ms.saturating_add(ttl_ms)),
        })?;
        self.set_raw(key.as_str(), raw)
    }

    /// Remove `key`.
    fn delete(&self, key: StorageKey) -> Result<(), StorageError> {
        self.remove(key.as_str())
    }

    #[doc(hidden)]
    fn discard(&self, key: StorageKey) {
        if let Err(e) = self.remove(key.as_str()) {
            warn!(key = %key, error = %e, "failed to remove storage entry");
        }
    }
}

impl<S: KeyValueStore + ?Sized> TypedStore for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use trailsync_types::{LatLng, MapState, Theme};

    const NOW: u64 = 1_700_000_000_000;

    #[test]
    fn set_then_get() {
        let store = MemoryStore::new();
        store.set(StorageKey::Theme, &Theme::Dark).unwrap();
        assert_eq!(store.get::<Theme>(StorageKey::Theme), Some(Theme::Dark));
    }

    #[test]
    fn values_are_wrapped_in_versioned_envelope() {
        let store = MemoryStore::new();
        store.set(StorageKey::Theme, &Theme::Light).unwrap();
        let raw = store.get_raw("theme").unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["v"], 1);
        assert_eq!(json["data"], "light");
        assert!(json.get("expiresAt").is_none());
    }

    #[test]
    fn malformed_entry_is_discarded() {
        let store = MemoryStore::new();
        store.set_raw("theme", "{not json".into()).unwrap();

        assert_eq!(store.get::<Theme>(StorageKey::Theme), None);
        assert_eq!(store.get_raw("theme"), None);
    }

    #[test]
    fn wrong_shape_is_discarded() {
        let store = MemoryStore::new();
        store
            .set_raw("theme", r#"{"v":1,"data":"purple"}"#.into())
            .unwrap();
        assert_eq!(store.get::<Theme>(StorageKey::Theme), None);
        assert_eq!(store.get_raw("theme"), None);
    }

    #[test]
    fn unknown_version_is_discarded() {
        let store = MemoryStore::new();
        store
            .set_raw("theme", r#"{"v":2,"data":"dark"}"#.into())
            .unwrap();
        assert_eq!(store.get::<Theme>(StorageKey::Theme), None);
        assert_eq!(store.get_raw("theme"), None);
    }

    #[test]
    fn ttl_entry_expires() {
        let store = MemoryStore::new();
        let view = MapState {
            center: LatLng {
                lat: 36.1,
                lng: -112.1,
            },
            zoom: 9.0,
            style: "outdoors".into(),
        };
        store
            .set_with_ttl(StorageKey::MapView, &view, Duration::from_secs(60), NOW)
            .unwrap();

        assert_eq!(
            store.get_at::<MapState>(StorageKey::MapView, NOW + 59_999),
            Some(view)
        );
        assert_eq!(
            store.get_at::<MapState>(StorageKey::MapView, NOW + 60_000),
            None
        );
        assert_eq!(store.get_raw("mapView"), None);
    }

    #[test]
    fn unversioned_legacy_value() {
        let store = MemoryStore::new();
        store.set_raw("anonymousSession", r#""abc123""#.into()).unwrap();
        assert_eq!(
            store.get_unversioned::<String>(StorageKey::AnonymousSession),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn delete_removes_entry() {
        let store = MemoryStore::new();
        store.set(StorageKey::Token, &"t").unwrap();
        store.delete(StorageKey::Token).unwrap();
        assert_eq!(store.get::<String>(StorageKey::Token), None);
        // Deleting twice is fine
        store.delete(StorageKey::Token).unwrap();
    }

    #[test]
    fn typed_access_through_trait_object() {
        let store: std::sync::Arc<dyn KeyValueStore> = std::sync::Arc::new(MemoryStore::new());
        store.set(StorageKey::LastSyncAt, &42u64).unwrap();
        assert_eq!(store.get::<u64>(StorageKey::LastSyncAt), Some(42));
    }

    #[test]
    fn key_names() {
        assert_eq!(StorageKey::DeviceId.as_str(), "deviceId");
        assert_eq!(StorageKey::PendingMigration.to_string(), "pendingMigration");
        assert_eq!(StorageKey::MapView.as_str(), "mapView");
    }
}
