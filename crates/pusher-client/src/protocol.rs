//! Pusher wire protocol: event names, the frame envelope, and frame builders.
//!
//! Every frame in either direction is a JSON text message of the shape
//! `{"event": <name>, "data": <payload>}`. Inbound payloads are kept as raw
//! JSON text and decoded lazily by whoever consumes the event.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

use crate::error::{PusherError, PusherResult};

// ── Event names ──────────────────────────────────────────────

/// Reserved protocol event names.
pub mod event {
    /// Liveness request (bidirectional).
    pub const PING: &str = "pusher:ping";
    /// Liveness reply (bidirectional).
    pub const PONG: &str = "pusher:pong";
    /// Server-reported error.
    pub const ERROR: &str = "pusher:error";
    /// First frame of every session.
    pub const CONNECTION_ESTABLISHED: &str = "pusher:connection_established";
    /// Channel subscription request (send only).
    pub const SUBSCRIBE: &str = "pusher:subscribe";
    /// Channel unsubscription request (send only).
    pub const UNSUBSCRIBE: &str = "pusher:unsubscribe";
}

// ── Constants ────────────────────────────────────────────────

/// Protocol version sent in the connection URL.
pub const PROTOCOL_VERSION: &str = "7";

/// Host of the standard hosted endpoint.
pub const DEFAULT_HOST: &str = "ws.pusherapp.com:443";

/// Scheme of the standard hosted endpoint.
pub const DEFAULT_SCHEME: &str = "wss";

/// Server messages are capped at 10KB by protocol convention.
pub const MAX_MESSAGE_BYTES: usize = 10_240;

/// Heartbeat frame sent by the client.
pub const PING_FRAME: &str = r#"{"event":"pusher:ping","data":"{}"}"#;

/// Reply to a server ping.
pub const PONG_FRAME: &str = r#"{"event":"pusher:pong","data":"{}"}"#;

// ── Inbound ──────────────────────────────────────────────────

/// A decoded inbound frame.
///
/// `data` holds the payload as raw JSON text: a JSON string payload is
/// stored verbatim, any other JSON value is re-serialised, and a missing or
/// null payload is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event name.
    pub event: String,
    /// Raw payload.
    #[serde(default, deserialize_with = "raw_payload")]
    pub data: String,
    /// Channel the event was published on, when the server names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl Event {
    /// Create an event with no channel.
    #[must_use]
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            channel: None,
        }
    }

    /// Set the channel.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Decode the payload into a concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`PusherError::Json`] if the payload is not valid JSON for `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> PusherResult<T> {
        Ok(serde_json::from_str(&self.data)?)
    }

    /// Returns `true` for protocol housekeeping events that are never
    /// routed to application binders.
    #[must_use]
    pub fn is_housekeeping(&self) -> bool {
        matches!(self.event.as_str(), event::PING | event::PONG | event::ERROR)
    }
}

fn raw_payload<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(text)) => text,
        Some(other) => other.to_string(),
    })
}

/// Payload of `pusher:error`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProtocolErrorData {
    /// Error code; the server may send `null`.
    #[serde(default)]
    pub code: Option<i64>,
    /// Error message.
    #[serde(default)]
    pub message: String,
}

impl From<ProtocolErrorData> for PusherError {
    fn from(data: ProtocolErrorData) -> Self {
        Self::Protocol {
            code: data.code,
            message: data.message,
        }
    }
}

/// Payload of `pusher:connection_established`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectionEstablished {
    /// Identifier the server assigned to this connection.
    #[serde(default)]
    pub socket_id: Option<String>,
    /// Seconds of inactivity after which the server expects a ping.
    #[serde(default)]
    pub activity_timeout: Option<u64>,
}

/// Decode a text frame into an [`Event`].
///
/// # Errors
///
/// Returns [`PusherError::Json`] if the frame is not a valid envelope.
pub fn decode_frame(text: &str) -> PusherResult<Event> {
    Ok(serde_json::from_str(text)?)
}

// ── Outbound ─────────────────────────────────────────────────

#[derive(Serialize)]
struct Frame<'a, D> {
    event: &'a str,
    data: D,
}

#[derive(Serialize)]
struct ChannelData<'a> {
    channel: &'a str,
}

/// Build a `pusher:subscribe` frame.
///
/// # Errors
///
/// Returns [`PusherError::Json`] if serialization fails.
pub fn build_subscribe(channel: &str) -> PusherResult<String> {
    channel_frame(event::SUBSCRIBE, channel)
}

/// Build a `pusher:unsubscribe` frame.
///
/// # Errors
///
/// Returns [`PusherError::Json`] if serialization fails.
pub fn build_unsubscribe(channel: &str) -> PusherResult<String> {
    channel_frame(event::UNSUBSCRIBE, channel)
}

fn channel_frame(name: &str, channel: &str) -> PusherResult<String> {
    let frame = Frame {
        event: name,
        data: ChannelData { channel },
    };
    Ok(serde_json::to_string(&frame)?)
}

/// Render the connection URL `<scheme>://<host>/app/<app_key>?protocol=<version>`.
#[must_use]
pub fn connection_url(scheme: &str, host: &str, app_key: &str, protocol_version: &str) -> String {
    format!("{scheme}://{host}/app/{app_key}?protocol={protocol_version}")
}
