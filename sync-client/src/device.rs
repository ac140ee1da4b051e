//! Per-installation device identity.
//!
//! The device id is generated once, persisted under `deviceId`, and cached
//! for the life of the process. If persisting fails the generated id is
//! still used, so callers always get the same answer within one run.

use std::sync::{Arc, OnceLock};
use tracing::{info, warn};
use trailsync_types::{DeviceId, DeviceRecord, DeviceType};

use crate::storage::{KeyValueStore, StorageKey, TypedStore};

/// What the host tells us about the running client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEnvironment {
    /// Raw user agent string.
    pub user_agent: String,
    /// "WIDTHxHEIGHT", or "unknown".
    pub screen_resolution: String,
    /// IANA timezone name.
    pub timezone: String,
    /// BCP 47 language tag.
    pub language: String,
}

impl RuntimeEnvironment {
    /// Describe a native host from the process environment.
    ///
    /// Reads `TZ` and `LANG`; falls back to `UTC` and `en-US`.
    pub fn detect() -> Self {
        let timezone = std::env::var("TZ")
            .ok()
            .filter(|tz| !tz.trim().is_empty())
            .unwrap_or_else(|| "UTC".to_string());
        let language = std::env::var("LANG")
            .ok()
            .and_then(|lang| posix_locale_to_tag(&lang))
            .unwrap_or_else(|| "en-US".to_string());
        Self {
            user_agent: format!(
                "trailsync/{} ({})",
                env!("CARGO_PKG_VERSION"),
                native_os_name()
            ),
            screen_resolution: "unknown".to_string(),
            timezone,
            language,
        }
    }
}

/// Owner of this installation's device id.
pub struct DeviceIdentityManager {
    store: Arc<dyn KeyValueStore>,
    cached: OnceLock<DeviceId>,
}

impl DeviceIdentityManager {
    /// Create a manager reading from and writing to `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            cached: OnceLock::new(),
        }
    }

    /// The stable device id, generated and persisted on first use.
    pub fn device_id(&self) -> DeviceId {
        self.cached.get_or_init(|| self.load_or_create()).clone()
    }

    /// Snapshot of this device for registration and sync.
    pub fn device_info(&self, env: &RuntimeEnvironment) -> DeviceRecord {
        DeviceRecord {
            device_id: self.device_id(),
            device_name: device_name(&env.user_agent),
            device_type: DeviceType::from_user_agent(&env.user_agent),
            user_agent: env.user_agent.clone(),
            screen_resolution: env.screen_resolution.clone(),
            timezone: env.timezone.clone(),
            language: env.language.clone(),
        }
    }

    fn load_or_create(&self) -> DeviceId {
        let stored = self
            .store
            .get::<String>(StorageKey::DeviceId)
            .and_then(|raw| DeviceId::parse(&raw));
        if let Some(id) = stored {
            return id;
        }

        let id = DeviceId::random();
        match self.store.set(StorageKey::DeviceId, &id.as_str()) {
            Ok(()) => info!(device = ?id, "generated device id"),
            Err(e) => warn!(device = ?id, error = %e, "device id not persisted, using it for this session only"),
        }
        id
    }
}

/// Human-readable name like "Firefox on Linux".
pub fn device_name(user_agent: &str) -> String {
    format!("{} on {}", browser_name(user_agent), os_name(user_agent))
}

fn browser_name(ua: &str) -> &'static str {
    // Order matters: Edge and Opera also claim Chrome, Chrome claims Safari.
    if ua.contains("Edg/") || ua.contains("Edge/") {
        "Edge"
    } else if ua.contains("OPR/") || ua.contains("Opera") {
        "Opera"
    } else if ua.contains("Firefox/") {
        "Firefox"
    } else if ua.contains("Chrome/") || ua.contains("CriOS/") {
        "Chrome"
    } else if ua.contains("Safari/") {
        "Safari"
    } else if ua.starts_with("trailsync/") {
        "trailsync"
    } else {
        "Unknown Browser"
    }
}

fn os_name(ua: &str) -> &'static str {
    if ua.contains("Windows") || ua.contains("windows") {
        "Windows"
    } else if ua.contains("iPhone") || ua.contains("iPad") {
        "iOS"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("Mac OS X") || ua.contains("Macintosh") || ua.contains("macos") {
        "macOS"
    } else if ua.contains("Linux") || ua.contains("linux") {
        "Linux"
    } else {
        "Unknown OS"
    }
}

fn native_os_name() -> &'static str {
    std::env::consts::OS
}

/// "en_US.UTF-8" -> "en-US". Returns `None` for "C" / "POSIX".
fn posix_locale_to_tag(locale: &str) -> Option<String> {
    let base = locale.split(['.', '@']).next()?.trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, StorageError};

    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
    const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";

    fn env(user_agent: &str) -> RuntimeEnvironment {
        RuntimeEnvironment {
            user_agent: user_agent.to_string(),
            screen_resolution: "1920x1080".into(),
            timezone: "America/Denver".into(),
            language: "en-US".into(),
        }
    }

    /// Store whose writes always fail.
    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get_raw(&self, _key: &str) -> Option<String> {
            None
        }
        fn set_raw(&self, _key: &str, _value: String) -> Result<(), StorageError> {
            Err(StorageError::Io {
                path: "readonly".into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }
        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn first_call_generates_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let manager = DeviceIdentityManager::new(store.clone());

        let id = manager.device_id();
        assert_eq!(
            store.get::<String>(StorageKey::DeviceId).as_deref(),
            Some(id.as_str())
        );
    }

    #[test]
    fn id_is_stable_across_calls_and_instances() {
        let store = Arc::new(MemoryStore::new());
        let first = DeviceIdentityManager::new(store.clone()).device_id();
        let manager = DeviceIdentityManager::new(store);
        assert_eq!(manager.device_id(), first);
        assert_eq!(manager.device_id(), first);
    }

    #[test]
    fn existing_id_is_kept() {
        let store = Arc::new(MemoryStore::new());
        store.set(StorageKey::DeviceId, &"legacy-device-42").unwrap();
        let manager = DeviceIdentityManager::new(store);
        assert_eq!(manager.device_id().as_str(), "legacy-device-42");
    }

    #[test]
    fn persistence_failure_still_returns_stable_id() {
        let manager = DeviceIdentityManager::new(Arc::new(ReadOnlyStore));
        let a = manager.device_id();
        let b = manager.device_id();
        assert_eq!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn corrupt_stored_id_is_replaced() {
        let store = Arc::new(MemoryStore::new());
        store.set_raw("deviceId", "garbage{".into()).unwrap();
        let manager = DeviceIdentityManager::new(store.clone());
        let id = manager.device_id();
        assert_eq!(
            store.get::<String>(StorageKey::DeviceId).as_deref(),
            Some(id.as_str())
        );
    }

    #[test]
    fn device_info_snapshot() {
        let manager = DeviceIdentityManager::new(Arc::new(MemoryStore::new()));
        let info = manager.device_info(&env(SAFARI_IPHONE));
        assert_eq!(info.device_id, manager.device_id());
        assert_eq!(info.device_type, DeviceType::Mobile);
        assert_eq!(info.device_name, "Safari on iOS");
        assert_eq!(info.screen_resolution, "1920x1080");
        assert_eq!(info.timezone, "America/Denver");
    }

    #[test]
    fn device_names() {
        assert_eq!(device_name(FIREFOX_LINUX), "Firefox on Linux");
        assert_eq!(device_name(EDGE_WINDOWS), "Edge on Windows");
        assert_eq!(device_name("curl/8.0"), "Unknown Browser on Unknown OS");
    }

    #[test]
    fn detected_environment_names_itself() {
        let env = RuntimeEnvironment::detect();
        assert!(env.user_agent.starts_with("trailsync/"));
        assert!(device_name(&env.user_agent).starts_with("trailsync on "));
    }

    #[test]
    fn locale_conversion() {
        assert_eq!(posix_locale_to_tag("en_US.UTF-8").as_deref(), Some("en-US"));
        assert_eq!(posix_locale_to_tag("de_DE@euro").as_deref(), Some("de-DE"));
        assert_eq!(posix_locale_to_tag("C"), None);
    }
}
