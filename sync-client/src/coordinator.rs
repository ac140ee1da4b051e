//! Sync coordinator: ties the preference store, realtime channel and theme
//! together for one signed-in session.
//!
//! The application root constructs one coordinator and binds
//! [`init`](SyncCoordinator::init) to login and
//! [`teardown`](SyncCoordinator::teardown) to logout. There is no timer
//! polling: the replica is pulled on init and whenever the app becomes
//! visible again, and realtime pushes fill the gaps in between.
//!
//! Conflicts resolve last-write-wins per domain. The server's response to a
//! write always becomes local state, even if a newer local edit happened
//! while it was in flight.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use trailsync_core::{ConnectionStatus, PreferenceField};
use trailsync_types::{MapState, NavigationState, PreferencePatch, PreferenceSet, Theme};

use crate::auth::AuthProvider;
use crate::error::ClientError;
use crate::preferences::{PreferenceStore, SyncOutcome};
use crate::realtime::{ChannelNotice, HandlerId, NoticeKind, RealtimeChannel};
use crate::theme::ThemeSink;

/// Default number of retries after a failed load or sync.
pub const DEFAULT_LOAD_RETRIES: u32 = 2;

/// Default pause before the first retry; later retries wait longer.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Run `op`, retrying transient failures up to `retries` times.
///
/// The n-th retry waits `delay * n`. Errors that are not
/// [retryable](ClientError::is_retryable), such as a 401, return at once.
pub async fn retry_with_backoff<T, F, Fut>(
    what: &str,
    retries: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                warn!(error = %e, attempt, "{} failed, retrying", what);
                tokio::time::sleep(delay * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Orchestrates pull sync, domain writes and realtime merges.
pub struct SyncCoordinator {
    store: Arc<PreferenceStore>,
    channel: Arc<RealtimeChannel>,
    theme: Arc<dyn ThemeSink>,
    auth: Arc<dyn AuthProvider>,
    load_retries: u32,
    retry_delay: Duration,
    handlers: Mutex<Vec<HandlerId>>,
}

impl SyncCoordinator {
    /// Wire the coordinator. Nothing happens until [`init`](Self::init).
    pub fn new(
        store: Arc<PreferenceStore>,
        channel: Arc<RealtimeChannel>,
        theme: Arc<dyn ThemeSink>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            store,
            channel,
            theme,
            auth,
            load_retries: DEFAULT_LOAD_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Retry a failed load or sync up to `retries` times.
    pub fn with_load_retries(mut self, retries: u32) -> Self {
        self.load_retries = retries;
        self
    }

    /// Base pause between retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Start syncing for the signed-in user.
    ///
    /// Loads the document (with bounded retry), hands its theme to the theme
    /// sink, and joins the `preferences` realtime topic. Returns `Ok(false)`
    /// without touching the network when nobody is signed in. Calling it
    /// again reloads but does not register a second handler.
    pub async fn init(&self) -> Result<bool, ClientError> {
        if !self.auth.is_authenticated() {
            debug!("not signed in, sync coordinator idle");
            return Ok(false);
        }

        let document = self.retrying("load", || self.store.load()).await?;
        self.theme.adopt_theme(document.theme);

        self.attach_handler();
        self.channel.subscribe_to_preferences().await?;
        if self.channel.start() {
            debug!("realtime channel started");
        }
        info!(cursor = %document.last_sync_at, "sync coordinator initialised");
        Ok(true)
    }

    /// Pull changes after the app became visible again.
    ///
    /// Returns `None` when signed out.
    pub async fn on_visibility_regained(&self) -> Result<Option<SyncOutcome>, ClientError> {
        if !self.auth.is_authenticated() {
            return Ok(None);
        }
        let outcome = self.retrying("sync", || self.store.sync()).await?;
        if let SyncOutcome::Updated(changed) = &outcome {
            if changed.contains(PreferenceField::Theme) {
                self.adopt_replica_theme();
            }
        }
        Ok(Some(outcome))
    }

    /// Change the theme.
    ///
    /// The sink switches immediately; the server's answer then becomes the
    /// theme. If the write fails the sink goes back to the replica's theme.
    pub async fn set_theme(&self, theme: Theme) -> Result<PreferenceSet, ClientError> {
        self.theme.adopt_theme(theme);
        match self.store.update_general(&PreferencePatch::theme(theme)).await {
            Ok(document) => {
                self.theme.adopt_theme(document.theme);
                Ok(document)
            }
            Err(e) => {
                warn!(error = %e, "theme change not saved");
                self.adopt_replica_theme();
                Err(e)
            }
        }
    }

    /// Write general preferences.
    pub async fn update_preferences(
        &self,
        patch: &PreferencePatch,
    ) -> Result<PreferenceSet, ClientError> {
        let document = self.store.update_general(patch).await?;
        self.theme.adopt_theme(document.theme);
        Ok(document)
    }

    /// Write the map view.
    pub async fn update_map_state(&self, map_state: &MapState) -> Result<PreferenceSet, ClientError> {
        self.store.update_map_state(map_state).await
    }

    /// Write navigation state.
    pub async fn update_navigation(
        &self,
        navigation: &NavigationState,
    ) -> Result<PreferenceSet, ClientError> {
        self.store.update_navigation(navigation).await
    }

    /// The replica.
    pub fn store(&self) -> &Arc<PreferenceStore> {
        &self.store
    }

    /// Realtime connection snapshot.
    pub fn connection_status(&self) -> ConnectionStatus {
        self.channel.status()
    }

    /// Stop syncing: detach handlers, close the channel, drop the replica.
    pub async fn teardown(&self) {
        let handlers: Vec<HandlerId> = self.lock_handlers().drain(..).collect();
        for id in handlers {
            self.channel.off(id);
        }
        self.channel.teardown().await;
        self.store.clear();
        info!("sync coordinator torn down");
    }

    fn attach_handler(&self) {
        let mut handlers = self.lock_handlers();
        if !handlers.is_empty() {
            return;
        }
        let store = Arc::clone(&self.store);
        let theme = Arc::clone(&self.theme);
        let id = self
            .channel
            .on(NoticeKind::PreferencesUpdated, move |notice| {
                let ChannelNotice::PreferencesUpdated(delta) = notice else {
                    return;
                };
                let changed = store.apply_remote(delta);
                if changed.contains(PreferenceField::Theme) {
                    if let Some(current) = store.theme() {
                        theme.adopt_theme(current);
                    }
                }
            });
        handlers.push(id);
    }

    fn adopt_replica_theme(&self) {
        if let Some(theme) = self.store.theme() {
            self.theme.adopt_theme(theme);
        }
    }

    async fn retrying<T, F, Fut>(&self, what: &str, op: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        retry_with_backoff(what, self.load_retries, self.retry_delay, op).await
    }

    fn lock_handlers(&self) -> std::sync::MutexGuard<'_, Vec<HandlerId>> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
