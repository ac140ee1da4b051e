//! REST bodies and realtime frames exchanged with the preferences server.

use serde::{Deserialize, Serialize};

use crate::{AnonymousId, DeviceRecord, PreferenceDelta, PreferenceSet, SyncCursor, SyncError};

/// Realtime topic carrying preference changes for the authenticated user.
pub const PREFERENCES_TOPIC: &str = "preferences";

/// Body of `POST /preferences/sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Client's cursor, `None` if this client never synced
    pub last_sync_at: Option<SyncCursor>,
    /// The calling device
    pub device_info: DeviceRecord,
}

impl SyncRequest {
    /// Build a request from a cursor; the zero cursor is sent as `null`.
    pub fn new(cursor: SyncCursor, device_info: DeviceRecord) -> Self {
        Self {
            last_sync_at: if cursor.is_zero() { None } else { Some(cursor) },
            device_info,
        }
    }
}

/// Response of `POST /preferences/sync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Whether the client's cursor was stale
    pub needs_sync: bool,
    /// Authoritative document, present when `needs_sync`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<PreferenceSet>,
    /// Server cursor, present when `needs_sync`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<SyncCursor>,
}

impl SyncResponse {
    /// Response for a client that is already current.
    pub fn up_to_date() -> Self {
        Self {
            needs_sync: false,
            preferences: None,
            last_sync_at: None,
        }
    }
}

/// Body of `POST /auth/migrate-chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateChatRequest {
    /// The anonymous session to transfer
    pub anonymous_id: AnonymousId,
}

/// Response of `POST /auth/migrate-chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateChatResponse {
    /// Whether ownership was transferred
    #[serde(default = "default_true")]
    pub success: bool,
    /// Trip created from the migrated conversation, for redirect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    /// Server message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_true() -> bool {
    true
}

/// The authenticated user, as returned by `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    /// Server-side user id
    pub id: String,
    /// Account email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Frames on the realtime WebSocket, JSON text encoded as
/// `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RealtimeFrame {
    /// Client asks to join a topic
    Subscribe {
        /// Topic name
        topic: String,
    },
    /// Client leaves a topic
    Unsubscribe {
        /// Topic name
        topic: String,
    },
    /// Server greeting after the socket is authenticated
    Connected {
        /// Server-assigned socket id
        #[serde(rename = "socketId")]
        socket_id: String,
    },
    /// Server confirms a subscription
    Subscribed {
        /// Topic name
        topic: String,
    },
    /// Another device or tab changed preferences
    PreferencesUpdated(PreferenceDelta),
    /// Server-side error report
    Error {
        /// Error text
        message: String,
    },
}

impl RealtimeFrame {
    /// Event name as it appears on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            RealtimeFrame::Subscribe { .. } => "subscribe",
            RealtimeFrame::Unsubscribe { .. } => "unsubscribe",
            RealtimeFrame::Connected { .. } => "connected",
            RealtimeFrame::Subscribed { .. } => "subscribed",
            RealtimeFrame::PreferencesUpdated(_) => "preferencesUpdated",
            RealtimeFrame::Error { .. } => "error",
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_text(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(SyncError::Serialization)
    }

    /// Decode a JSON text frame.
    ///
    /// Well-formed frames with an event this client does not know return
    /// [`SyncError::UnknownEvent`] so callers can skip them quietly.
    pub fn from_text(text: &str) -> Result<Self, SyncError> {
        match serde_json::from_str(text) {
            Ok(frame) => Ok(frame),
            Err(err) => {
                let value: serde_json::Value =
                    serde_json::from_str(text).map_err(SyncError::Deserialization)?;
                match value.get("event").and_then(|e| e.as_str()) {
                    Some(name) if !KNOWN_EVENTS.contains(&name) => {
                        Err(SyncError::UnknownEvent(name.to_string()))
                    }
                    _ => Err(SyncError::Deserialization(err)),
                }
            }
        }
    }
}

const KNOWN_EVENTS: [&str; 6] = [
    "subscribe",
    "unsubscribe",
    "connected",
    "subscribed",
    "preferencesUpdated",
    "error",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeviceId, DeviceType, Theme};

    fn device() -> DeviceRecord {
        DeviceRecord {
            device_id: DeviceId::parse("dev-a").unwrap(),
            device_name: "Safari on macOS".into(),
            device_type: DeviceType::Desktop,
            user_agent: "ua".into(),
            screen_resolution: "1440x900".into(),
            timezone: "America/Denver".into(),
            language: "en-US".into(),
        }
    }

    #[test]
    fn sync_request_sends_null_for_first_sync() {
        let req = SyncRequest::new(SyncCursor::zero(), device());
        let json = serde_json::to_value(&req).unwrap();
        assert!(json["lastSyncAt"].is_null());
        assert_eq!(json["deviceInfo"]["deviceId"], "dev-a");
    }

    #[test]
    fn sync_response_up_to_date_has_no_payload() {
        let json = serde_json::to_string(&SyncResponse::up_to_date()).unwrap();
        assert_eq!(json, r#"{"needsSync":false}"#);
    }

    #[test]
    fn migrate_response_defaults_success() {
        let resp: MigrateChatResponse = serde_json::from_str(r#"{"tripId":"trip-9"}"#).unwrap();
        assert!(resp.success);
        assert_eq!(resp.trip_id.as_deref(), Some("trip-9"));
    }

    #[test]
    fn preferences_updated_frame_shape() {
        let frame = RealtimeFrame::from_text(
            r#"{"event":"preferencesUpdated","data":{"theme":"dark","lastSyncAt":42}}"#,
        )
        .unwrap();
        match frame {
            RealtimeFrame::PreferencesUpdated(delta) => {
                assert_eq!(delta.theme, Some(Theme::Dark));
                assert_eq!(delta.last_sync_at, Some(SyncCursor::from_millis(42)));
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn connected_frame_uses_socket_id_key() {
        let frame = RealtimeFrame::Connected {
            socket_id: "s-1".into(),
        };
        assert_eq!(
            frame.to_text().unwrap(),
            r#"{"event":"connected","data":{"socketId":"s-1"}}"#
        );
    }

    #[test]
    fn unknown_event_is_reported_by_name() {
        let err = RealtimeFrame::from_text(r#"{"event":"tripUpdated","data":{}}"#).unwrap_err();
        assert!(matches!(err, SyncError::UnknownEvent(name) if name == "tripUpdated"));
    }

    #[test]
    fn garbage_is_a_deserialization_error() {
        let err = RealtimeFrame::from_text("not json").unwrap_err();
        assert!(matches!(err, SyncError::Deserialization(_)));
    }

    #[test]
    fn event_name_matches_wire_tag() {
        let frame = RealtimeFrame::Subscribe {
            topic: PREFERENCES_TOPIC.into(),
        };
        let json: serde_json::Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();
        assert_eq!(json["event"], frame.event_name());
    }
}
