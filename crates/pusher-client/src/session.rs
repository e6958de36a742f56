//! Shared session state: liveness flag, lifecycle state, and the send path.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, trace};

use crate::error::PusherResult;
use crate::transport::BoxSink;

/// Lifecycle of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Opening the transport and waiting for the handshake.
    Connecting,
    /// Handshake complete; both background tasks are running.
    Established,
    /// A heartbeat could not be sent. The listen task is still alive and
    /// will either observe the failure or the next heartbeat will succeed.
    Degraded,
    /// Terminal. Entered on a transport error or an explicit close.
    Closed,
}

impl ConnectionState {
    /// Returns `true` for [`ConnectionState::Closed`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Established => "established",
            Self::Degraded => "degraded",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// State shared by the client, the heartbeat task, and the listen task.
///
/// All writes to the transport go through [`Session::send`], which holds
/// the send-mutex for the duration of one frame.
pub(crate) struct Session {
    running: AtomicBool,
    state: watch::Sender<ConnectionState>,
    sink: Mutex<BoxSink>,
}

impl Session {
    pub(crate) fn new(sink: BoxSink) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            running: AtomicBool::new(true),
            state,
            sink: Mutex::new(sink),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Write one frame under the send-mutex.
    pub(crate) async fn send(&self, text: String) -> PusherResult<()> {
        trace!(frame = %text, "sending frame");
        self.sink.lock().await.send(text).await
    }

    /// Send a close frame under the send-mutex.
    pub(crate) async fn close_transport(&self) -> PusherResult<()> {
        self.sink.lock().await.close().await
    }

    /// Move `Connecting -> Established`.
    pub(crate) fn mark_established(&self) {
        self.transition(ConnectionState::Connecting, ConnectionState::Established);
    }

    /// Move `Established -> Degraded`.
    pub(crate) fn mark_degraded(&self) {
        self.transition(ConnectionState::Established, ConnectionState::Degraded);
    }

    /// Move `Degraded -> Established`.
    pub(crate) fn mark_healthy(&self) {
        self.transition(ConnectionState::Degraded, ConnectionState::Established);
    }

    /// Clear the liveness flag and enter `Closed`.
    ///
    /// Returns `true` only for the call that actually stopped the session.
    pub(crate) fn shutdown(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        self.state.send_if_modified(|state| {
            if state.is_closed() {
                return false;
            }
            *state = ConnectionState::Closed;
            true
        });
        if was_running {
            info!("session closed");
        }
        was_running
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) {
        let changed = self.state.send_if_modified(|state| {
            if *state != from {
                return false;
            }
            *state = to;
            true
        });
        if changed {
            debug!(from = %from, to = %to, "connection state changed");
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::error::{PusherError, PusherResult};
    use crate::transport::{FrameSink, FrameSource};

    /// Sink that forwards frames to a channel, or fails when `failing`.
    pub(crate) struct ChannelSink {
        pub(crate) frames: mpsc::UnboundedSender<String>,
        pub(crate) failing: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait]
    impl FrameSink for ChannelSink {
        async fn send(&mut self, text: String) -> PusherResult<()> {
            if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(PusherError::Transport("broken pipe".into()));
            }
            self.frames
                .send(text)
                .map_err(|_| PusherError::Transport("peer gone".into()))
        }

        async fn close(&mut self) -> PusherResult<()> {
            Ok(())
        }
    }

    /// Source fed from a channel; a closed channel is end of stream.
    pub(crate) struct ChannelSource {
        pub(crate) frames: mpsc::UnboundedReceiver<PusherResult<String>>,
    }

    #[async_trait]
    impl FrameSource for ChannelSource {
        async fn recv(&mut self) -> PusherResult<String> {
            match self.frames.recv().await {
                Some(frame) => frame,
                None => Err(PusherError::Transport("connection closed".into())),
            }
        }
    }

    /// A sink plus the receiving end of everything written to it.
    pub(crate) fn sink() -> (
        ChannelSink,
        mpsc::UnboundedReceiver<String>,
        Arc<std::sync::atomic::AtomicBool>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let failing = Arc::new(std::sync::atomic::AtomicBool::new(false));
        (
            ChannelSink {
                frames: tx,
                failing: Arc::clone(&failing),
            },
            rx,
            failing,
        )
    }

    /// A source plus the handle used to feed it.
    pub(crate) fn source() -> (ChannelSource, mpsc::UnboundedSender<PusherResult<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSource { frames: rx }, tx)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::sink;
    use super::*;

    fn session() -> Session {
        let (sink, _rx, _failing) = sink();
        Session::new(Box::new(sink))
    }

    #[test]
    fn starts_connecting_and_running() {
        let session = session();
        assert!(session.is_running());
        assert_eq!(session.state(), ConnectionState::Connecting);
    }

    #[test]
    fn degraded_only_from_established() {
        let session = session();
        session.mark_degraded();
        assert_eq!(session.state(), ConnectionState::Connecting);

        session.mark_established();
        session.mark_degraded();
        assert_eq!(session.state(), ConnectionState::Degraded);

        session.mark_healthy();
        assert_eq!(session.state(), ConnectionState::Established);
    }

    #[test]
    fn closed_is_absorbing() {
        let session = session();
        session.mark_established();
        assert!(session.shutdown());
        assert!(!session.is_running());
        assert_eq!(session.state(), ConnectionState::Closed);

        session.mark_established();
        session.mark_healthy();
        assert_eq!(session.state(), ConnectionState::Closed);
    }

    #[test]
    fn shutdown_reports_first_caller_only() {
        let session = session();
        assert!(session.shutdown());
        assert!(!session.shutdown());
    }

    #[test]
    fn state_changes_are_observable() {
        let session = session();
        let mut rx = session.state_changes();
        session.mark_established();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Established);
    }

    #[tokio::test]
    async fn send_goes_through_sink() {
        let (sink, mut rx, _failing) = sink();
        let session = Session::new(Box::new(sink));
        session.send("hello".into()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn display_names() {
        assert_eq!(ConnectionState::Degraded.to_string(), "degraded");
        assert!(ConnectionState::Closed.is_closed());
        assert!(!ConnectionState::Established.is_closed());
    }
}
