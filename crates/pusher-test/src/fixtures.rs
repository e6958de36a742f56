//! Frame fixtures.

use serde_json::json;

/// The minimal handshake frame.
#[must_use]
pub fn connection_established_frame() -> String {
    r#"{"event":"pusher:connection_established","data":"{}"}"#.to_string()
}

/// A handshake frame carrying a socket id and activity timeout.
#[must_use]
pub fn connection_established_with(socket_id: &str, activity_timeout: u64) -> String {
    let data = json!({ "socket_id": socket_id, "activity_timeout": activity_timeout });
    json!({ "event": "pusher:connection_established", "data": data.to_string() }).to_string()
}

/// A `pusher:error` frame.
#[must_use]
pub fn error_frame(code: i64, message: &str) -> String {
    let data = json!({ "code": code, "message": message });
    json!({ "event": "pusher:error", "data": data.to_string() }).to_string()
}

/// An application event whose payload is sent as a JSON string.
#[must_use]
pub fn event_frame(event: &str, data: &str) -> String {
    json!({ "event": event, "data": data }).to_string()
}

/// An application event published on `channel`.
#[must_use]
pub fn channel_event_frame(event: &str, channel: &str, data: &str) -> String {
    json!({ "event": event, "channel": channel, "data": data }).to_string()
}

/// A server ping.
#[must_use]
pub fn ping_frame() -> String {
    pusher_client::protocol::PING_FRAME.to_string()
}

/// A server pong.
#[must_use]
pub fn pong_frame() -> String {
    pusher_client::protocol::PONG_FRAME.to_string()
}
