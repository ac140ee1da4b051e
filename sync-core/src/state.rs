//! Realtime connection state machine for trailsync.
//!
//! This module provides a pure, side-effect-free state machine for the
//! realtime channel's connection lifecycle. The state machine takes events
//! as input and produces a new state plus a list of actions to execute.
//!
//! The actual I/O (opening the socket, sending frames) is performed by
//! sync-client, not by this module.

use serde::Serialize;
use std::time::Duration;

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,
    /// Socket connect in progress.
    Connecting,
    /// Socket open, waiting for the server's `connected` greeting.
    Handshaking {
        /// Reconnect attempt this handshake belongs to, `None` on first connect.
        attempt: Option<u32>,
    },
    /// Fully connected and authenticated.
    Connected {
        /// Server-assigned socket id.
        socket_id: String,
    },
    /// Disconnected, waiting to reconnect.
    Reconnecting {
        /// Number of reconnection attempts so far.
        attempt: u32,
    },
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Disconnected
            (Self::Disconnected, Event::ConnectRequested) => {
                (Self::Connecting, vec![Action::Connect])
            }

            // From Connecting
            (Self::Connecting, Event::ConnectSucceeded) => (
                Self::Handshaking { attempt: None },
                vec![Action::AwaitGreeting],
            ),
            (Self::Connecting, Event::ConnectFailed { error }) => (
                Self::Reconnecting { attempt: 1 },
                vec![
                    Action::EmitEvent(ChannelEvent::ConnectionFailed { error }),
                    Action::StartReconnectTimer {
                        delay: calculate_backoff(1),
                    },
                ],
            ),

            // From Handshaking
            (Self::Handshaking { .. }, Event::HandshakeCompleted { socket_id }) => (
                Self::Connected {
                    socket_id: socket_id.clone(),
                },
                vec![
                    Action::ResubscribeTopics,
                    Action::EmitEvent(ChannelEvent::Connected { socket_id }),
                ],
            ),
            // A socket that opens but never greets still counts as a failed attempt
            (Self::Handshaking { attempt }, Event::HandshakeFailed { error }) => {
                let next_attempt = attempt.map_or(1, |a| a.saturating_add(1));
                let event = match attempt {
                    None => ChannelEvent::ConnectionFailed { error },
                    Some(_) => ChannelEvent::ReconnectFailed {
                        attempt: next_attempt,
                        error,
                    },
                };
                (
                    Self::Reconnecting {
                        attempt: next_attempt,
                    },
                    vec![
                        Action::Disconnect,
                        Action::EmitEvent(event),
                        Action::StartReconnectTimer {
                            delay: calculate_backoff(next_attempt),
                        },
                    ],
                )
            }

            // From Connected
            (Self::Connected { .. }, Event::Disconnected { reason }) => (
                Self::Reconnecting { attempt: 1 },
                vec![
                    Action::EmitEvent(ChannelEvent::Disconnected { reason }),
                    Action::StartReconnectTimer {
                        delay: calculate_backoff(1),
                    },
                ],
            ),
            (Self::Connected { .. }, Event::DisconnectRequested) => (
                Self::Disconnected,
                vec![
                    Action::Disconnect,
                    Action::EmitEvent(ChannelEvent::Disconnected {
                        reason: "client requested".into(),
                    }),
                ],
            ),

            // From Reconnecting
            // The attempt count survives the retry so the caller can cap it
            (Self::Reconnecting { attempt }, Event::ReconnectTimer) => {
                (Self::Reconnecting { attempt }, vec![Action::Connect])
            }
            (Self::Reconnecting { attempt }, Event::ConnectSucceeded) => (
                Self::Handshaking {
                    attempt: Some(attempt),
                },
                vec![Action::AwaitGreeting],
            ),
            (Self::Reconnecting { attempt }, Event::ConnectFailed { error }) => {
                let next_attempt = attempt.saturating_add(1);
                (
                    Self::Reconnecting {
                        attempt: next_attempt,
                    },
                    vec![
                        Action::EmitEvent(ChannelEvent::ReconnectFailed {
                            attempt: next_attempt,
                            error,
                        }),
                        Action::StartReconnectTimer {
                            delay: calculate_backoff(next_attempt),
                        },
                    ],
                )
            }
            (Self::Reconnecting { .. }, Event::DisconnectRequested) => {
                (Self::Disconnected, vec![Action::CancelReconnect])
            }

            // Teardown can arrive mid-connect
            (Self::Connecting, Event::DisconnectRequested)
            | (Self::Handshaking { .. }, Event::DisconnectRequested) => {
                (Self::Disconnected, vec![Action::Disconnect])
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Check if currently trying to connect.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Handshaking { .. } | Self::Reconnecting { .. }
        )
    }

    /// Number of reconnection attempts in the current outage (0 when not reconnecting).
    pub fn reconnect_attempts(&self) -> u32 {
        match self {
            Self::Reconnecting { attempt }
            | Self::Handshaking {
                attempt: Some(attempt),
            } => *attempt,
            _ => 0,
        }
    }

    /// Snapshot for UI indicators.
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            is_connected: self.is_connected(),
            reconnect_attempts: self.reconnect_attempts(),
            socket_id: match self {
                Self::Connected { socket_id } => Some(socket_id.clone()),
                _ => None,
            },
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Observable connection status.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Whether the socket is connected and greeted
    pub is_connected: bool,
    /// Attempts made in the current outage
    pub reconnect_attempts: u32,
    /// Server-assigned socket id while connected
    pub socket_id: Option<String>,
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Caller requested connection.
    ConnectRequested,
    /// Socket opened.
    ConnectSucceeded,
    /// Socket failed to open.
    ConnectFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Server greeting received.
    HandshakeCompleted {
        /// Server-assigned socket id.
        socket_id: String,
    },
    /// Greeting missing or malformed.
    HandshakeFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Connection was lost.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// Caller requested disconnect (logout, unmount).
    DisconnectRequested,
    /// Reconnect timer fired.
    ReconnectTimer,
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open the socket.
    Connect,
    /// Close the socket.
    Disconnect,
    /// Wait for the server's `connected` frame.
    AwaitGreeting,
    /// Re-send subscriptions for every topic the caller joined.
    ResubscribeTopics,
    /// Start a timer for reconnection.
    StartReconnectTimer {
        /// Delay before attempting reconnection.
        delay: Duration,
    },
    /// Cancel any pending reconnect timer.
    CancelReconnect,
    /// Emit an event to the application.
    EmitEvent(ChannelEvent),
}

/// Lifecycle events emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Successfully connected.
    Connected {
        /// Server-assigned socket id.
        socket_id: String,
    },
    /// Connection failed.
    ConnectionFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Disconnected.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// Reconnection attempt failed.
    ReconnectFailed {
        /// Which reconnection attempt this was.
        attempt: u32,
        /// Error message describing the failure.
        error: String,
    },
}

/// Calculate reconnection backoff with jitter.
///
/// Exponential backoff with random jitter so that every client of a
/// restarted server does not reconnect in the same instant.
///
/// Formula: min(30s, 2^attempt seconds) + random(0..5000ms)
pub fn calculate_backoff(attempt: u32) -> Duration {
    let base_secs = 2u64.pow(attempt.min(5)).min(30);
    Duration::from_secs(base_secs) + Duration::from_millis(random_jitter_ms())
}

/// Random jitter between 0 and 5000 milliseconds (0 if the OS RNG is unavailable).
fn random_jitter_ms() -> u64 {
    let mut bytes = [0u8; 8];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => u64::from_le_bytes(bytes) % 5001,
        Err(_) => 0,
    }
}
