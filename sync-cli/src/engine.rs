//! Wires the sync engine for one CLI invocation.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use trailsync_client::{
    retry_with_backoff, AuthProvider, AuthSession, ClientConfig, ClientError,
    DeviceIdentityManager, FileStore, HttpApi, KeyValueStore, MockApi, MockRealtimeTransport,
    PreferenceSet, PreferenceStore, PreferencesApi, RealtimeChannel, RealtimeTransport,
    SessionMigrationBridge, WebSocketTransport, DEFAULT_RETRY_DELAY,
};

use crate::config::STATE_FILE;

/// Everything a command needs.
pub struct Engine {
    pub config: ClientConfig,
    pub storage: Arc<dyn KeyValueStore>,
    pub auth: Arc<AuthSession>,
    pub api: Arc<dyn PreferencesApi>,
    pub identity: Arc<DeviceIdentityManager>,
    pub store: Arc<PreferenceStore>,
    /// In-process server when running with `--mock`.
    pub mock: Option<MockApi>,
}

impl Engine {
    /// Open the state file in `data_dir` and build the collaborators.
    pub fn open(data_dir: &Path, config: ClientConfig, mock: bool) -> Result<Self> {
        let path = data_dir.join(STATE_FILE);
        let storage: Arc<dyn KeyValueStore> = Arc::new(
            FileStore::open(&path)
                .with_context(|| format!("Failed to open state file {}", path.display()))?,
        );
        let auth = Arc::new(AuthSession::new(Arc::clone(&storage)));

        let mock = mock.then(MockApi::new);
        let api: Arc<dyn PreferencesApi> = match &mock {
            Some(server) => Arc::new(server.clone()),
            None => Arc::new(HttpApi::new(
                config.api.base_url.clone(),
                auth.clone() as Arc<dyn AuthProvider>,
            )),
        };

        let identity = Arc::new(DeviceIdentityManager::new(Arc::clone(&storage)));
        let store = Arc::new(
            PreferenceStore::new(
                Arc::clone(&api),
                Arc::clone(&storage),
                auth.clone(),
                Arc::clone(&identity),
            )
            .with_map_view_ttl(config.cache.map_view_ttl()),
        );
        store.restore();

        Ok(Self {
            config,
            storage,
            auth,
            api,
            identity,
            store,
            mock,
        })
    }

    /// Fail with a hint when nobody is logged in.
    pub fn require_login(&self) -> Result<()> {
        if !self.auth.is_authenticated() {
            anyhow::bail!("Not logged in. Run 'trailsync login <token>' first.");
        }
        Ok(())
    }

    /// Load preferences, retrying transient failures `api.load_retries` times.
    pub async fn load_preferences(&self) -> Result<PreferenceSet, ClientError> {
        retry_with_backoff(
            "load",
            self.config.api.load_retries,
            DEFAULT_RETRY_DELAY,
            || self.store.load(),
        )
        .await
    }

    /// Realtime channel over the configured transport.
    ///
    /// With `--mock` the transport is attached to the in-process server.
    pub fn channel(&self) -> Arc<RealtimeChannel> {
        let transport: Arc<dyn RealtimeTransport> = match &self.mock {
            Some(server) => {
                let transport = MockRealtimeTransport::new();
                server.attach_realtime(&transport);
                Arc::new(transport)
            }
            None => Arc::new(WebSocketTransport::new(
                self.config.realtime.connect_timeout(),
            )),
        };
        Arc::new(RealtimeChannel::new(
            transport,
            self.auth.clone(),
            self.config.realtime.clone(),
        ))
    }

    /// Migration bridge using the configured TTL.
    pub fn migration_bridge(&self) -> SessionMigrationBridge {
        SessionMigrationBridge::new(Arc::clone(&self.storage), Arc::clone(&self.api))
            .with_ttl(self.config.migration.session_ttl())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// Mock engine in a fresh temp dir. Keep the dir alive for the test.
    pub fn mock_engine() -> (Engine, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(dir.path(), ClientConfig::default(), true).unwrap();
        (engine, dir)
    }

    /// Mock engine with a logged-in session.
    pub fn logged_in_engine() -> (Engine, TempDir) {
        let (engine, dir) = mock_engine();
        engine.auth.login("tok-cli", None).unwrap();
        (engine, dir)
    }
}
