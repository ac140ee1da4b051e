//! Realtime push channel.
//!
//! Transport is pluggable like the REST layer:
//! - `connect()` opens an authenticated socket
//! - `send()` / `recv()` move JSON text frames
//! - `close()` tears the socket down
//!
//! [`RealtimeChannel`] drives a transport with the pure
//! [`ConnectionState`](trailsync_core::ConnectionState) machine and fans
//! frames out to registered handlers.
//!
//! # Example
//!
//! ```ignore
//! let channel = Arc::new(RealtimeChannel::new(transport, auth, config));
//! channel.on(NoticeKind::PreferencesUpdated, |notice| println!("{notice:?}"));
//! channel.subscribe_to_preferences().await?;
//! channel.start();
//! ```

mod channel;
mod mock;
mod websocket;

pub use channel::{ChannelNotice, HandlerId, NoticeKind, RealtimeChannel};
pub use mock::MockRealtimeTransport;
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,
}

/// Socket carrying realtime text frames.
///
/// `send` and `recv` may be called concurrently from different tasks.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Open a socket to `url`, authenticated with `token`.
    async fn connect(&self, url: &str, token: &str) -> Result<(), TransportError>;

    /// Send one text frame.
    async fn send(&self, text: &str) -> Result<(), TransportError>;

    /// Receive the next text frame.
    ///
    /// Waits until a frame arrives or the connection closes.
    async fn recv(&self) -> Result<String, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}
