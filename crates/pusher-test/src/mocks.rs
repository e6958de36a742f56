//! Scripted in-memory transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use pusher_client::{
    BoxSink, BoxSource, Connector, FrameSink, FrameSource, PusherError, PusherResult,
};

/// How long [`MockServer::expect_sent`] waits for a frame.
pub const SENT_TIMEOUT: Duration = Duration::from_secs(5);

enum Script {
    Accept(MockTransport),
    Refuse(String),
}

/// Mock implementation of the [`Connector`] trait.
///
/// Each call to `connect` consumes the next scripted outcome in order.
/// Uses `std::sync::Mutex` so scripting works without a runtime.
#[derive(Default)]
pub struct MockConnector {
    /// Outcomes for upcoming connection attempts.
    script: Mutex<VecDeque<Script>>,
    /// URLs of every attempt made.
    urls: Mutex<Vec<String>>,
}

impl MockConnector {
    /// Create a connector with nothing scripted. Unscripted attempts fail
    /// with a transport error.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful connection whose first inbound frame is
    /// `handshake`. Returns the server end.
    pub fn accept(&self, handshake: impl Into<String>) -> MockServer {
        let (transport, server) = MockTransport::pair();
        server.push(handshake);
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Script::Accept(transport));
        }
        server
    }

    /// Script a connection that opens but never sends a first frame.
    pub fn accept_silent(&self) -> MockServer {
        let (transport, server) = MockTransport::pair();
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Script::Accept(transport));
        }
        server
    }

    /// Script a failed connection attempt.
    pub fn refuse(&self, message: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Script::Refuse(message.into()));
        }
    }

    /// URLs of every connection attempt so far.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Number of connection attempts so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.urls.lock().map(|g| g.len()).unwrap_or_default()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> PusherResult<(BoxSink, BoxSource)> {
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(url.to_owned());
        }
        let next = self.script.lock().ok().and_then(|mut g| g.pop_front());
        match next {
            Some(Script::Accept(transport)) => Ok(transport.split()),
            Some(Script::Refuse(message)) => Err(PusherError::Transport(message)),
            None => Err(PusherError::Transport("connection refused".into())),
        }
    }
}

/// Client end of an in-memory connection.
pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<PusherResult<String>>,
    outbound: mpsc::UnboundedSender<String>,
    fail_sends: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a connected transport/server pair.
    #[must_use]
    pub fn pair() -> (Self, MockServer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let fail_sends = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            inbound: inbound_rx,
            outbound: outbound_tx,
            fail_sends: Arc::clone(&fail_sends),
            closed: Arc::clone(&closed),
        };
        let server = MockServer {
            inbound: Some(inbound_tx),
            sent: outbound_rx,
            fail_sends,
            closed,
        };
        (transport, server)
    }

    /// Split into boxed halves, as a [`Connector`] returns them.
    #[must_use]
    pub fn split(self) -> (BoxSink, BoxSource) {
        let sink = MockSink {
            outbound: self.outbound,
            fail_sends: self.fail_sends,
            closed: self.closed,
        };
        let source = MockSource {
            inbound: self.inbound,
        };
        (Box::new(sink), Box::new(source))
    }
}

struct MockSink {
    outbound: mpsc::UnboundedSender<String>,
    fail_sends: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, text: String) -> PusherResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst) {
            return Err(PusherError::Transport("broken pipe".into()));
        }
        self.outbound
            .send(text)
            .map_err(|_| PusherError::Transport("peer gone".into()))
    }

    async fn close(&mut self) -> PusherResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockSource {
    inbound: mpsc::UnboundedReceiver<PusherResult<String>>,
}

#[async_trait]
impl FrameSource for MockSource {
    async fn recv(&mut self) -> PusherResult<String> {
        match self.inbound.recv().await {
            Some(frame) => frame,
            None => Err(PusherError::Transport("connection closed".into())),
        }
    }
}

/// Server end of an in-memory connection.
pub struct MockServer {
    inbound: Option<mpsc::UnboundedSender<PusherResult<String>>>,
    sent: mpsc::UnboundedReceiver<String>,
    fail_sends: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MockServer {
    /// Deliver a frame to the client. Returns `false` once the client has
    /// stopped reading.
    pub fn push(&self, frame: impl Into<String>) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(frame.into())).is_ok())
    }

    /// Make the client's next read fail with a transport error.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Err(PusherError::Transport(message.into()))).is_ok())
    }

    /// End the stream; the client's next read fails.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Make every client write fail from now on.
    pub fn break_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Let client writes succeed again.
    pub fn restore_sends(&self) {
        self.fail_sends.store(false, Ordering::SeqCst);
    }

    /// Returns `true` once the client sent a close frame.
    #[must_use]
    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait for the next frame the client writes.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives within [`SENT_TIMEOUT`] or the client end
    /// is gone.
    pub async fn expect_sent(&mut self) -> String {
        tokio::time::timeout(SENT_TIMEOUT, self.sent.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client transport dropped")
    }

    /// The next frame the client wrote, if one is already waiting.
    pub fn try_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    /// Every frame the client has written so far and not yet read.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.sent.try_recv() {
            frames.push(frame);
        }
        frames
    }
}
