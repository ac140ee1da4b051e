//! Realtime channel: connection lifecycle, topic subscriptions, handler fan-out.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trailsync_core::{Action, ChannelEvent, ConnectionState, ConnectionStatus, Event};
use trailsync_types::{PreferenceDelta, RealtimeFrame, SyncError, PREFERENCES_TOPIC};

use super::{RealtimeTransport, TransportError};
use crate::auth::AuthProvider;
use crate::config::RealtimeConfig;
use crate::error::ClientError;

/// Identifies one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// What a handler can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    /// Socket connected and greeted
    Connected,
    /// First connect or handshake failed
    ConnectionFailed,
    /// Connection lost or closed
    Disconnected,
    /// A reconnect attempt failed
    ReconnectFailed,
    /// `preferencesUpdated` frame
    PreferencesUpdated,
    /// `error` frame
    ServerError,
}

/// Delivered to handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelNotice {
    /// Connection lifecycle change
    Lifecycle(ChannelEvent),
    /// Another device or tab changed preferences
    PreferencesUpdated(PreferenceDelta),
    /// Server reported an error
    ServerError(String),
}

impl ChannelNotice {
    /// Which handlers receive this notice.
    pub fn kind(&self) -> NoticeKind {
        match self {
            ChannelNotice::Lifecycle(ChannelEvent::Connected { .. }) => NoticeKind::Connected,
            ChannelNotice::Lifecycle(ChannelEvent::ConnectionFailed { .. }) => {
                NoticeKind::ConnectionFailed
            }
            ChannelNotice::Lifecycle(ChannelEvent::Disconnected { .. }) => NoticeKind::Disconnected,
            ChannelNotice::Lifecycle(ChannelEvent::ReconnectFailed { .. }) => {
                NoticeKind::ReconnectFailed
            }
            ChannelNotice::PreferencesUpdated(_) => NoticeKind::PreferencesUpdated,
            ChannelNotice::ServerError(_) => NoticeKind::ServerError,
        }
    }
}

type Handler = Arc<dyn Fn(&ChannelNotice) + Send + Sync>;

#[derive(Default)]
struct ChannelInner {
    state: ConnectionState,
    handlers: Vec<(HandlerId, NoticeKind, Handler)>,
    next_handler: u64,
    /// Topics the application asked for
    topics: BTreeSet<String>,
    /// Topics already subscribed on the current connection
    sent_topics: HashSet<String>,
}

/// Push channel over a [`RealtimeTransport`].
///
/// Constructed once at bootstrap and shared behind an `Arc`. Handlers and
/// subscriptions can be registered before the connection exists; topics are
/// (re)sent every time a connection completes its handshake.
pub struct RealtimeChannel {
    transport: Arc<dyn RealtimeTransport>,
    auth: Arc<dyn AuthProvider>,
    config: RealtimeConfig,
    inner: Mutex<ChannelInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeChannel {
    /// Create a channel. Nothing connects until [`start`](Self::start) or [`run`](Self::run).
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        auth: Arc<dyn AuthProvider>,
        config: RealtimeConfig,
    ) -> Self {
        Self {
            transport,
            auth,
            config,
            inner: Mutex::new(ChannelInner::default()),
            task: Mutex::new(None),
        }
    }

    /// Register `handler` for notices of `kind`.
    pub fn on<F>(&self, kind: NoticeKind, handler: F) -> HandlerId
    where
        F: Fn(&ChannelNotice) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        inner.next_handler += 1;
        let id = HandlerId(inner.next_handler);
        inner.handlers.push((id, kind, Arc::new(handler)));
        id
    }

    /// Remove one handler. Returns false if it was not registered.
    pub fn off(&self, id: HandlerId) -> bool {
        let mut inner = self.lock();
        let before = inner.handlers.len();
        inner.handlers.retain(|(handler_id, _, _)| *handler_id != id);
        inner.handlers.len() != before
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.lock().handlers.len()
    }

    /// Connection snapshot for UI indicators.
    pub fn status(&self) -> ConnectionStatus {
        self.lock().state.status()
    }

    /// Topics the channel keeps subscribed.
    pub fn topics(&self) -> Vec<String> {
        self.lock().topics.iter().cloned().collect()
    }

    /// Join the `preferences` topic. Idempotent.
    pub async fn subscribe_to_preferences(&self) -> Result<(), ClientError> {
        self.subscribe(PREFERENCES_TOPIC).await
    }

    /// Join `topic`.
    ///
    /// At most one `subscribe` frame is sent per topic per connection. When
    /// offline the topic is remembered and sent after the next handshake.
    pub async fn subscribe(&self, topic: &str) -> Result<(), ClientError> {
        let send_now = {
            let mut inner = self.lock();
            inner.topics.insert(topic.to_string());
            inner.state.is_connected() && inner.sent_topics.insert(topic.to_string())
        };
        if !send_now {
            debug!(topic, "subscription recorded");
            return Ok(());
        }
        let frame = RealtimeFrame::Subscribe {
            topic: topic.to_string(),
        };
        if let Err(e) = self.send_frame(&frame).await {
            self.lock().sent_topics.remove(topic);
            return Err(e);
        }
        Ok(())
    }

    /// Leave `topic`.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), ClientError> {
        let was_sent = {
            let mut inner = self.lock();
            inner.topics.remove(topic);
            inner.sent_topics.remove(topic) && inner.state.is_connected()
        };
        if was_sent {
            let frame = RealtimeFrame::Unsubscribe {
                topic: topic.to_string(),
            };
            self.send_frame(&frame).await?;
        }
        Ok(())
    }

    /// Spawn [`run`](Self::run) on the current runtime. Returns false if already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return false;
        }
        let this = Arc::clone(self);
        *task = Some(tokio::spawn(async move { this.run().await }));
        true
    }

    /// Whether a spawned run loop is alive.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Connect and process frames until torn down or out of reconnect attempts.
    pub async fn run(self: Arc<Self>) {
        let mut actions: VecDeque<Action> = self.transition(Event::ConnectRequested).into();
        loop {
            while let Some(action) = actions.pop_front() {
                if let Some(event) = self.execute(action).await {
                    actions.extend(self.transition(event));
                }
            }

            let connected = self.lock().state.is_connected();
            if !connected {
                break;
            }
            match self.transport.recv().await {
                Ok(text) => self.handle_text(&text),
                Err(e) => {
                    warn!(error = %e, "realtime connection lost");
                    actions.extend(self.transition(Event::Disconnected {
                        reason: e.to_string(),
                    }));
                }
            }
        }
        info!("realtime channel stopped");
    }

    /// Stop the run loop, drop every handler and subscription, close the socket.
    pub async fn teardown(&self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
        {
            let mut inner = self.lock();
            inner.state = ConnectionState::Disconnected;
            inner.handlers.clear();
            inner.topics.clear();
            inner.sent_topics.clear();
        }
        if let Err(e) = self.transport.close().await {
            debug!(error = %e, "close during teardown failed");
        }
        info!("realtime channel torn down");
    }

    fn lock(&self) -> MutexGuard<'_, ChannelInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, event: Event) -> Vec<Action> {
        let mut inner = self.lock();
        debug!(?event, state = ?inner.state, "realtime event");
        let (next, actions) = std::mem::take(&mut inner.state).on_event(event);
        inner.state = next;
        actions
    }

    async fn execute(&self, action: Action) -> Option<Event> {
        match action {
            Action::Connect => {
                self.lock().sent_topics.clear();
                let Some(token) = self.auth.token() else {
                    info!("not logged in, realtime channel stays offline");
                    return Some(Event::DisconnectRequested);
                };
                let attempt = tokio::time::timeout(
                    self.config.connect_timeout(),
                    self.transport.connect(&self.config.url, &token),
                )
                .await;
                match attempt {
                    Ok(Ok(())) => Some(Event::ConnectSucceeded),
                    Ok(Err(e)) => Some(Event::ConnectFailed {
                        error: e.to_string(),
                    }),
                    Err(_) => Some(Event::ConnectFailed {
                        error: TransportError::Timeout.to_string(),
                    }),
                }
            }
            Action::AwaitGreeting => {
                let greeting =
                    tokio::time::timeout(self.config.connect_timeout(), self.transport.recv())
                        .await;
                let error = match greeting {
                    Ok(Ok(text)) => match RealtimeFrame::from_text(&text) {
                        Ok(RealtimeFrame::Connected { socket_id }) => {
                            info!(%socket_id, "realtime channel connected");
                            return Some(Event::HandshakeCompleted { socket_id });
                        }
                        Ok(other) => format!("expected connected, got {}", other.event_name()),
                        Err(e) => e.to_string(),
                    },
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => "timed out waiting for greeting".to_string(),
                };
                warn!(%error, "realtime handshake failed");
                Some(Event::HandshakeFailed { error })
            }
            Action::ResubscribeTopics => {
                self.resubscribe().await;
                None
            }
            Action::StartReconnectTimer { delay } => {
                let attempt = self.lock().state.reconnect_attempts();
                if attempt > self.config.max_reconnect_attempts {
                    warn!(attempt, "giving up on realtime reconnect");
                    return Some(Event::DisconnectRequested);
                }
                info!(attempt, ?delay, "realtime reconnect scheduled");
                tokio::time::sleep(delay).await;
                Some(Event::ReconnectTimer)
            }
            Action::CancelReconnect => None,
            Action::Disconnect => {
                if let Err(e) = self.transport.close().await {
                    debug!(error = %e, "close failed");
                }
                None
            }
            Action::EmitEvent(event) => {
                self.dispatch(&ChannelNotice::Lifecycle(event));
                None
            }
        }
    }

    async fn resubscribe(&self) {
        let pending: Vec<String> = {
            let mut inner = self.lock();
            let topics: Vec<String> = inner.topics.iter().cloned().collect();
            let mut pending = Vec::new();
            for topic in topics {
                if inner.sent_topics.insert(topic.clone()) {
                    pending.push(topic);
                }
            }
            pending
        };
        for topic in pending {
            let frame = RealtimeFrame::Subscribe {
                topic: topic.clone(),
            };
            if let Err(e) = self.send_frame(&frame).await {
                warn!(%topic, error = %e, "resubscribe failed");
                self.lock().sent_topics.remove(&topic);
            }
        }
    }

    async fn send_frame(&self, frame: &RealtimeFrame) -> Result<(), ClientError> {
        let text = frame
            .to_text()
            .map_err(|e| ClientError::Serialization(e.to_string()))?;
        self.transport.send(&text).await?;
        debug!(event = frame.event_name(), "sent frame");
        Ok(())
    }

    fn handle_text(&self, text: &str) {
        match RealtimeFrame::from_text(text) {
            Ok(RealtimeFrame::PreferencesUpdated(delta)) => {
                debug!("preferences updated remotely");
                self.dispatch(&ChannelNotice::PreferencesUpdated(delta));
            }
            Ok(RealtimeFrame::Subscribed { topic }) => debug!(%topic, "subscription confirmed"),
            Ok(RealtimeFrame::Error { message }) => {
                warn!(%message, "realtime server error");
                self.dispatch(&ChannelNotice::ServerError(message));
            }
            Ok(other) => debug!(event = other.event_name(), "ignoring frame"),
            Err(SyncError::UnknownEvent(name)) => debug!(event = %name, "ignoring unknown event"),
            Err(e) => warn!(error = %e, "dropping malformed frame"),
        }
    }

    fn dispatch(&self, notice: &ChannelNotice) {
        let kind = notice.kind();
        let handlers: Vec<Handler> = self
            .lock()
            .handlers
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthSession;
    use crate::realtime::MockRealtimeTransport;
    use crate::storage::MemoryStore;
    use crate::testing::{logged_in, wait_until};
    use trailsync_types::Theme;

    fn config() -> RealtimeConfig {
        RealtimeConfig {
            url: "ws://test/ws".into(),
            connect_timeout_secs: 1,
            max_reconnect_attempts: 3,
        }
    }

    fn channel(mock: &MockRealtimeTransport) -> Arc<RealtimeChannel> {
        Arc::new(RealtimeChannel::new(
            Arc::new(mock.clone()),
            logged_in(&MemoryStore::new()),
            config(),
        ))
    }

    fn recorder(
        channel: &RealtimeChannel,
        kind: NoticeKind,
    ) -> (HandlerId, Arc<Mutex<Vec<ChannelNotice>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = channel.on(kind, move |notice| sink.lock().unwrap().push(notice.clone()));
        (id, seen)
    }

    fn theme_delta(theme: Theme) -> RealtimeFrame {
        RealtimeFrame::PreferencesUpdated(PreferenceDelta {
            theme: Some(theme),
            ..PreferenceDelta::default()
        })
    }

    // ===========================================================================
    // Connection
    // ===========================================================================

    #[tokio::test(start_paused = true)]
    async fn connects_with_bearer_token() {
        let mock = MockRealtimeTransport::new();
        let channel = channel(&mock);
        assert!(channel.start());
        assert!(!channel.start());

        wait_until(|| channel.status().is_connected).await;
        let status = channel.status();
        assert_eq!(status.socket_id.as_deref(), Some("mock-socket-1"));
        assert_eq!(status.reconnect_attempts, 0);
        assert_eq!(mock.last_token().as_deref(), Some("tok-1"));
        assert_eq!(mock.last_url().as_deref(), Some("ws://test/ws"));
    }

    #[tokio::test(start_paused = true)]
    async fn stays_offline_without_token() {
        let mock = MockRealtimeTransport::new();
        let channel = Arc::new(RealtimeChannel::new(
            Arc::new(mock.clone()),
            Arc::new(AuthSession::new(Arc::new(MemoryStore::new()))),
            config(),
        ));
        channel.start();
        wait_until(|| !channel.is_running()).await;
        assert_eq!(mock.connect_count(), 0);
        assert!(!channel.status().is_connected);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_and_resubscribes_after_drop() {
        let mock = MockRealtimeTransport::new();
        let channel = channel(&mock);
        let (_, lifecycle) = recorder(&channel, NoticeKind::Disconnected);
        channel.subscribe_to_preferences().await.unwrap();
        channel.start();
        wait_until(|| mock.is_subscribed(PREFERENCES_TOPIC)).await;

        mock.drop_connection();
        wait_until(|| mock.connect_count() == 2 && mock.is_subscribed(PREFERENCES_TOPIC)).await;

        assert_eq!(mock.subscribe_count(PREFERENCES_TOPIC), 2);
        assert_eq!(lifecycle.lock().unwrap().len(), 1);
        assert_eq!(
            channel.status().socket_id.as_deref(),
            Some("mock-socket-2")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let mock = MockRealtimeTransport::new();
        mock.fail_next_connects(100);
        let channel = channel(&mock);
        let (_, failures) = recorder(&channel, NoticeKind::ReconnectFailed);
        let (_, first) = recorder(&channel, NoticeKind::ConnectionFailed);

        channel.start();
        wait_until(|| !channel.is_running()).await;

        assert_eq!(first.lock().unwrap().len(), 1);
        // attempts 2..=4 fail; the fourth exceeds the limit of 3
        assert_eq!(failures.lock().unwrap().len(), 3);
        assert!(!channel.status().is_connected);
        assert_eq!(mock.connect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_greeting_retries() {
        let mock = MockRealtimeTransport::new();
        mock.skip_greeting(true);
        let channel = channel(&mock);
        let (_, failed) = recorder(&channel, NoticeKind::ConnectionFailed);

        channel.start();
        wait_until(|| !failed.lock().unwrap().is_empty()).await;
        mock.skip_greeting(false);
        wait_until(|| channel.status().is_connected).await;
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_counts_toward_reconnect_limit() {
        let mock = MockRealtimeTransport::new();
        mock.skip_greeting(true);
        let channel = channel(&mock);
        let (_, failures) = recorder(&channel, NoticeKind::ReconnectFailed);
        let (_, first) = recorder(&channel, NoticeKind::ConnectionFailed);

        channel.start();
        wait_until(|| !channel.is_running()).await;

        assert_eq!(first.lock().unwrap().len(), 1);
        assert_eq!(failures.lock().unwrap().len(), 3);
        // the first connect plus three reconnects, each accepted but never greeted
        assert_eq!(mock.connect_count(), 4);
        assert!(!channel.status().is_connected);
    }

    // ===========================================================================
    // Subscriptions
    // ===========================================================================

    #[tokio::test(start_paused = true)]
    async fn subscribe_is_idempotent_per_connection() {
        let mock = MockRealtimeTransport::new();
        let channel = channel(&mock);
        channel.subscribe_to_preferences().await.unwrap();
        channel.subscribe_to_preferences().await.unwrap();
        channel.start();
        wait_until(|| mock.is_subscribed(PREFERENCES_TOPIC)).await;

        channel.subscribe_to_preferences().await.unwrap();
        channel.subscribe_to_preferences().await.unwrap();
        assert_eq!(mock.subscribe_count(PREFERENCES_TOPIC), 1);
        assert_eq!(channel.topics(), vec![PREFERENCES_TOPIC.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_while_connected_sends_immediately() {
        let mock = MockRealtimeTransport::new();
        let channel = channel(&mock);
        channel.start();
        wait_until(|| channel.status().is_connected).await;

        channel.subscribe("parks").await.unwrap();
        assert!(mock.is_subscribed("parks"));

        channel.unsubscribe("parks").await.unwrap();
        assert!(!mock.is_subscribed("parks"));
        assert!(channel.topics().is_empty());
    }

    // ===========================================================================
    // Handlers
    // ===========================================================================

    #[tokio::test(start_paused = true)]
    async fn updates_fan_out_to_every_handler() {
        let mock = MockRealtimeTransport::new();
        let channel = channel(&mock);
        let (first_id, first) = recorder(&channel, NoticeKind::PreferencesUpdated);
        let (_, second) = recorder(&channel, NoticeKind::PreferencesUpdated);
        channel.start();
        wait_until(|| channel.status().is_connected).await;

        mock.push_frame(&theme_delta(Theme::Dark));
        wait_until(|| second.lock().unwrap().len() == 1).await;
        assert_eq!(first.lock().unwrap().len(), 1);

        assert!(channel.off(first_id));
        assert!(!channel.off(first_id));
        mock.push_frame(&theme_delta(Theme::Light));
        wait_until(|| second.lock().unwrap().len() == 2).await;
        assert_eq!(first.lock().unwrap().len(), 1);
        assert_eq!(
            second.lock().unwrap()[1],
            ChannelNotice::PreferencesUpdated(PreferenceDelta {
                theme: Some(Theme::Light),
                ..PreferenceDelta::default()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_and_malformed_frames_are_skipped() {
        let mock = MockRealtimeTransport::new();
        let channel = channel(&mock);
        let (_, updates) = recorder(&channel, NoticeKind::PreferencesUpdated);
        let (_, errors) = recorder(&channel, NoticeKind::ServerError);
        channel.start();
        wait_until(|| channel.status().is_connected).await;

        mock.push_text(r#"{"event":"tripShared","data":{}}"#);
        mock.push_text("not json at all");
        mock.push_frame(&RealtimeFrame::Error {
            message: "rate limited".into(),
        });
        mock.push_frame(&theme_delta(Theme::Dark));

        wait_until(|| updates.lock().unwrap().len() == 1).await;
        assert_eq!(
            errors.lock().unwrap().as_slice(),
            &[ChannelNotice::ServerError("rate limited".into())]
        );
        assert!(channel.status().is_connected);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_clears_everything() {
        let mock = MockRealtimeTransport::new();
        let channel = channel(&mock);
        recorder(&channel, NoticeKind::PreferencesUpdated);
        channel.subscribe_to_preferences().await.unwrap();
        channel.start();
        wait_until(|| channel.status().is_connected).await;

        channel.teardown().await;

        assert_eq!(channel.handler_count(), 0);
        assert!(channel.topics().is_empty());
        assert!(!channel.is_running());
        assert!(!channel.status().is_connected);
        assert!(!mock.is_connected());
    }
}
