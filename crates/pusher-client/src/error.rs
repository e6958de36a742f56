//! Error types for the Pusher client.

use crate::config::ConfigError;

/// Errors produced by the Pusher client.
#[derive(Debug, thiserror::Error)]
pub enum PusherError {
    /// I/O failure on the transport. Terminal for the session.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The first frame of the session was not a connection-established
    /// signal, or could not be read or decoded.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Error reported by the server in a `pusher:error` frame.
    #[error("Pusher error (code {}): {message}", display_code(.code))]
    Protocol {
        /// Numeric error code, if the server supplied one.
        code: Option<i64>,
        /// Human-readable message.
        message: String,
    },

    /// `subscribe` was called for a channel that is already tracked.
    #[error("Channel {0} already subscribed")]
    AlreadySubscribed(String),

    /// `unsubscribe` was called for a channel that is not tracked.
    #[error("Channel {0} is not subscribed")]
    NotSubscribed(String),

    /// `bind` was called for an event name that already has a queue.
    #[error("Event {0} already bound")]
    AlreadyBound(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid client configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The client was closed by the caller.
    #[error("Client closed")]
    Closed,

    /// The initial connection kept failing until the retry policy gave up.
    #[error("Gave up connecting after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The error from the final attempt.
        last: Box<PusherError>,
    },
}

impl PusherError {
    /// Returns `true` for transport failures, the only class of error that
    /// a retry of the initial connection can fix.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for PusherError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[allow(clippy::ref_option)]
fn display_code(code: &Option<i64>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Result type for Pusher client operations.
pub type PusherResult<T> = Result<T, PusherError>;
