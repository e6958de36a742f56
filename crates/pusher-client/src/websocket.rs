//! `WebSocket` transport built on `tokio-tungstenite`.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use crate::error::{PusherError, PusherResult};
use crate::transport::{BoxSink, BoxSource, Connector, FrameSink, FrameSource};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `ws://` and `wss://` connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a connector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> PusherResult<(BoxSink, BoxSource)> {
        // Fails harmlessly when a provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let (ws, response) = connect_async(url).await?;
        debug!(status = %response.status(), "WebSocket upgraded");
        let (writer, reader) = ws.split();
        Ok((
            Box::new(WebSocketSink { writer }),
            Box::new(WebSocketSource { reader }),
        ))
    }
}

/// Write half of a `WebSocket` connection.
struct WebSocketSink {
    writer: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send(&mut self, text: String) -> PusherResult<()> {
        self.writer.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> PusherResult<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "closing".into(),
        };
        self.writer.send(Message::Close(Some(frame))).await?;
        Ok(())
    }
}

/// Read half of a `WebSocket` connection.
struct WebSocketSource {
    reader: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WebSocketSource {
    async fn recv(&mut self) -> PusherResult<String> {
        loop {
            let Some(message) = self.reader.next().await else {
                return Err(PusherError::Transport("connection closed".into()));
            };
            if let Some(frame) = frame_text(message?) {
                return frame;
            }
        }
    }
}

/// Extract the text of a data frame. Returns `None` for control frames that
/// carry nothing for the client.
fn frame_text(message: Message) -> Option<PusherResult<String>> {
    match message {
        Message::Text(text) => Some(Ok(text.as_str().to_owned())),
        Message::Binary(data) => Some(
            String::from_utf8(data.to_vec())
                .map_err(|e| PusherError::Transport(format!("non-UTF-8 binary frame: {e}"))),
        ),
        Message::Close(frame) => {
            let code = frame.as_ref().map_or(1000, |f| u16::from(f.code));
            Some(Err(PusherError::Transport(format!(
                "connection closed by server (code {code})"
            ))))
        },
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
            // Control frames are answered by tungstenite.
            trace!("skipping control frame");
            None
        },
    }
}
