//! Transport contract.
//!
//! The client needs a message-oriented, full-duplex connection that carries
//! UTF-8 text frames. The two directions are split so the receive half can
//! be owned by the listen task while the send half sits behind the client's
//! send-mutex.

use async_trait::async_trait;

use crate::error::PusherResult;

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`PusherError::Transport`](crate::PusherError::Transport) on
    /// I/O failure. Any failure is terminal for the connection.
    async fn send(&mut self, text: String) -> PusherResult<()>;

    /// Send a close frame and flush.
    ///
    /// # Errors
    ///
    /// Returns [`PusherError::Transport`](crate::PusherError::Transport) if
    /// the close frame could not be written.
    async fn close(&mut self) -> PusherResult<()>;
}

/// Read half of a connection.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Receive the next text frame.
    ///
    /// # Errors
    ///
    /// Returns [`PusherError::Transport`](crate::PusherError::Transport) on
    /// I/O failure, a close frame, or end of stream.
    async fn recv(&mut self) -> PusherResult<String>;
}

/// Boxed write half.
pub type BoxSink = Box<dyn FrameSink>;

/// Boxed read half.
pub type BoxSource = Box<dyn FrameSource>;

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url` and return its split halves.
    ///
    /// # Errors
    ///
    /// Returns [`PusherError::Transport`](crate::PusherError::Transport) if
    /// the connection cannot be established.
    async fn connect(&self, url: &str) -> PusherResult<(BoxSink, BoxSource)>;
}
