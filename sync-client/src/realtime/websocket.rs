//! WebSocket transport built on tokio-tungstenite.
//!
//! The socket is split so the receive loop and senders never contend:
//! `recv()` owns the read half, `send()` the write half.

use super::{RealtimeTransport, TransportError};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Realtime transport over a WebSocket (`ws://` or `wss://`).
pub struct WebSocketTransport {
    connect_timeout: Duration,
    writer: Mutex<Option<SplitSink<Socket, Message>>>,
    reader: Mutex<Option<SplitStream<Socket>>>,
    connected: AtomicBool,
}

impl WebSocketTransport {
    /// Create a transport with the given connect timeout.
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl RealtimeTransport for WebSocketTransport {
    async fn connect(&self, url: &str, token: &str) -> Result<(), TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (socket, _response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (writer, reader) = socket.split();
        *self.writer.lock().await = Some(writer);
        *self.reader.lock().await = Some(reader);
        self.connected.store(true, Ordering::SeqCst);
        info!(url, "websocket connected");
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;
        writer
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&self) -> Result<String, TransportError> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(TransportError::NotConnected)?;
        loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(bytes))) => {
                    return String::from_utf8(bytes.to_vec())
                        .map_err(|e| TransportError::ReceiveFailed(e.to_string()));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "server closed websocket");
                    self.connected.store(false, Ordering::SeqCst);
                    *guard = None;
                    return Err(TransportError::ConnectionClosed);
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.connected.store(false, Ordering::SeqCst);
                    *guard = None;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    self.connected.store(false, Ordering::SeqCst);
                    *guard = None;
                    return Err(TransportError::ConnectionClosed);
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(mut writer) = self.writer.lock().await.take() {
            // Best effort; the peer may already be gone.
            let _ = writer.send(Message::Close(None)).await;
            let _ = writer.close().await;
        }
        // A receive loop may still hold the reader; it sees the close frame.
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        Ok(())
    }
}
