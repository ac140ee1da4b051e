//! Mock realtime transport for testing.
//!
//! Behaves like a small server: every successful `connect()` queues a
//! `connected` greeting, a `subscribe` frame is acknowledged with
//! `subscribed`, and tests push frames or drop the socket at will.

use super::{RealtimeTransport, TransportError};
use async_trait::async_trait;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use trailsync_types::RealtimeFrame;

/// Mock realtime transport.
///
/// Clones share state, so a test can keep a handle while the channel owns
/// another.
#[derive(Debug, Default, Clone)]
pub struct MockRealtimeTransport {
    inner: Arc<Mutex<MockSocket>>,
    notify: Arc<Notify>,
}

#[derive(Debug, Default)]
struct MockSocket {
    connected: bool,
    dropped: bool,
    connect_count: u32,
    last_url: Option<String>,
    last_token: Option<String>,
    topics: BTreeSet<String>,
    sent: Vec<String>,
    inbound: VecDeque<String>,
    fail_connects: u32,
    skip_greeting: bool,
}

impl MockRealtimeTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame for the next `recv()`.
    pub fn push_frame(&self, frame: &RealtimeFrame) {
        if let Ok(text) = frame.to_text() {
            self.push_text(text);
        }
    }

    /// Queue raw text for the next `recv()`.
    pub fn push_text(&self, text: impl Into<String>) {
        self.lock().inbound.push_back(text.into());
        self.notify.notify_one();
    }

    /// Simulate the server dropping the socket.
    pub fn drop_connection(&self) {
        {
            let mut socket = self.lock();
            socket.dropped = true;
            socket.inbound.clear();
        }
        self.notify.notify_one();
    }

    /// Make the next `n` connects fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().fail_connects = n;
    }

    /// Do not send the `connected` greeting on the next connects.
    pub fn skip_greeting(&self, skip: bool) {
        self.lock().skip_greeting = skip;
    }

    /// Every text frame the client sent, across connections.
    pub fn sent_frames(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    /// Number of `subscribe` frames sent for `topic`.
    pub fn subscribe_count(&self, topic: &str) -> usize {
        self.lock()
            .sent
            .iter()
            .filter_map(|text| RealtimeFrame::from_text(text).ok())
            .filter(|frame| matches!(frame, RealtimeFrame::Subscribe { topic: t } if t == topic))
            .count()
    }

    /// Whether the current connection is subscribed to `topic`.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        let socket = self.lock();
        socket.connected && socket.topics.contains(topic)
    }

    /// Successful connects so far.
    pub fn connect_count(&self) -> u32 {
        self.lock().connect_count
    }

    /// Token presented on the last connect.
    pub fn last_token(&self) -> Option<String> {
        self.lock().last_token.clone()
    }

    /// URL of the last connect.
    pub fn last_url(&self) -> Option<String> {
        self.lock().last_url.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockSocket> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RealtimeTransport for MockRealtimeTransport {
    async fn connect(&self, url: &str, token: &str) -> Result<(), TransportError> {
        let mut socket = self.lock();

        // Check for forced failure
        if socket.fail_connects > 0 {
            socket.fail_connects -= 1;
            return Err(TransportError::ConnectionFailed("refused (mock)".into()));
        }

        socket.connect_count += 1;
        socket.connected = true;
        socket.dropped = false;
        socket.topics.clear();
        socket.inbound.clear();
        socket.last_url = Some(url.to_string());
        socket.last_token = Some(token.to_string());
        if !socket.skip_greeting {
            let greeting = RealtimeFrame::Connected {
                socket_id: format!("mock-socket-{}", socket.connect_count),
            };
            if let Ok(text) = greeting.to_text() {
                socket.inbound.push_back(text);
            }
        }
        drop(socket);
        self.notify.notify_one();
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<(), TransportError> {
        let mut socket = self.lock();

        if !socket.connected || socket.dropped {
            return Err(TransportError::NotConnected);
        }

        socket.sent.push(text.to_string());
        let reply = match RealtimeFrame::from_text(text) {
            Ok(RealtimeFrame::Subscribe { topic }) => {
                socket.topics.insert(topic.clone());
                Some(RealtimeFrame::Subscribed { topic })
            }
            Ok(RealtimeFrame::Unsubscribe { topic }) => {
                socket.topics.remove(&topic);
                None
            }
            _ => None,
        };
        if let Some(text) = reply.and_then(|frame| frame.to_text().ok()) {
            socket.inbound.push_back(text);
            drop(socket);
            self.notify.notify_one();
        }
        Ok(())
    }

    async fn recv(&self) -> Result<String, TransportError> {
        loop {
            {
                let mut socket = self.lock();
                if socket.dropped {
                    socket.connected = false;
                    socket.dropped = false;
                    socket.topics.clear();
                    return Err(TransportError::ConnectionClosed);
                }
                if !socket.connected {
                    return Err(TransportError::NotConnected);
                }
                if let Some(text) = socket.inbound.pop_front() {
                    return Ok(text);
                }
            }
            self.notify.notified().await;
        }
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        {
            let mut socket = self.lock();
            socket.connected = false;
            socket.topics.clear();
            socket.inbound.clear();
        }
        self.notify.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trailsync_types::PreferenceDelta;

    // ===========================================================================
    // Connection
    // ===========================================================================

    #[tokio::test]
    async fn connect_queues_greeting() {
        let mock = MockRealtimeTransport::new();
        mock.connect("ws://test", "tok").await.unwrap();

        assert!(mock.is_connected());
        assert_eq!(mock.last_token().as_deref(), Some("tok"));
        let greeting = RealtimeFrame::from_text(&mock.recv().await.unwrap()).unwrap();
        assert_eq!(
            greeting,
            RealtimeFrame::Connected {
                socket_id: "mock-socket-1".into()
            }
        );
    }

    #[tokio::test]
    async fn forced_connect_failures() {
        let mock = MockRealtimeTransport::new();
        mock.fail_next_connects(2);
        assert!(mock.connect("ws://test", "tok").await.is_err());
        assert!(mock.connect("ws://test", "tok").await.is_err());
        assert!(mock.connect("ws://test", "tok").await.is_ok());
        assert_eq!(mock.connect_count(), 1);
    }

    #[tokio::test]
    async fn send_without_connect_fails() {
        let mock = MockRealtimeTransport::new();
        assert!(matches!(
            mock.send("{}").await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn dropped_connection_ends_recv() {
        let mock = MockRealtimeTransport::new();
        mock.skip_greeting(true);
        mock.connect("ws://test", "tok").await.unwrap();

        let waiter = {
            let mock = mock.clone();
            tokio::spawn(async move { mock.recv().await })
        };
        tokio::task::yield_now().await;
        mock.drop_connection();

        assert!(matches!(
            waiter.await.unwrap(),
            Err(TransportError::ConnectionClosed)
        ));
        assert!(!mock.is_connected());
    }

    // ===========================================================================
    // Frames
    // ===========================================================================

    #[tokio::test]
    async fn subscribe_is_acknowledged() {
        let mock = MockRealtimeTransport::new();
        mock.skip_greeting(true);
        mock.connect("ws://test", "tok").await.unwrap();

        let subscribe = RealtimeFrame::Subscribe {
            topic: "preferences".into(),
        };
        mock.send(&subscribe.to_text().unwrap()).await.unwrap();

        assert!(mock.is_subscribed("preferences"));
        assert_eq!(mock.subscribe_count("preferences"), 1);
        let ack = RealtimeFrame::from_text(&mock.recv().await.unwrap()).unwrap();
        assert_eq!(
            ack,
            RealtimeFrame::Subscribed {
                topic: "preferences".into()
            }
        );
    }

    #[tokio::test]
    async fn pushed_frames_arrive_in_order() {
        let mock = MockRealtimeTransport::new();
        mock.skip_greeting(true);
        mock.connect("ws://test", "tok").await.unwrap();

        mock.push_frame(&RealtimeFrame::PreferencesUpdated(PreferenceDelta::default()));
        mock.push_text("raw");

        assert!(mock.recv().await.unwrap().contains("preferencesUpdated"));
        assert_eq!(mock.recv().await.unwrap(), "raw");
    }

    #[tokio::test]
    async fn reconnect_forgets_topics() {
        let mock = MockRealtimeTransport::new();
        mock.connect("ws://test", "tok").await.unwrap();
        let subscribe = RealtimeFrame::Subscribe {
            topic: "preferences".into(),
        };
        mock.send(&subscribe.to_text().unwrap()).await.unwrap();
        mock.close().await.unwrap();
        mock.connect("ws://test", "tok").await.unwrap();
        assert!(!mock.is_subscribed("preferences"));
    }
}
