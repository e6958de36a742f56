//! The connection manager.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::{ExponentialBackoff, RetryPolicy};
use crate::binders::BinderRegistry;
use crate::config::ClientConfig;
use crate::error::{PusherError, PusherResult};
use crate::heartbeat;
use crate::listener::Listener;
use crate::protocol::{self, ConnectionEstablished, Event, ProtocolErrorData, event};
use crate::session::{ConnectionState, Session};
use crate::subscriptions::SubscriptionRegistry;
use crate::transport::{BoxSink, BoxSource, Connector};
use crate::websocket::WebSocketConnector;

/// A live connection to a Pusher endpoint.
///
/// Created by a successful handshake. Two background tasks run for the life
/// of the client: a heartbeat that pings the server at a fixed interval, and
/// a listener that answers server pings and routes inbound events to the
/// queues returned by [`Client::bind`].
///
/// A client is never reconnected. Once the connection fails (see
/// [`Client::take_connection_error`]) or [`Client::close`] is called, it is
/// permanently closed and a new one must be created.
pub struct Client {
    config: ClientConfig,
    session: Arc<Session>,
    established: ConnectionEstablished,
    subscriptions: Mutex<SubscriptionRegistry>,
    binders: Arc<RwLock<BinderRegistry>>,
    protocol_errors: Option<mpsc::Receiver<Event>>,
    connection_error: Option<oneshot::Receiver<PusherError>>,
    heartbeat: JoinHandle<()>,
    listener: JoinHandle<()>,
}

impl Client {
    /// Connect to the standard hosted endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`PusherError::Transport`] if the socket cannot be opened,
    /// [`PusherError::Protocol`] if the server answers with an error frame,
    /// or [`PusherError::Handshake`] for any other unexpected first frame.
    pub async fn connect(app_key: &str) -> PusherResult<Self> {
        Self::connect_with_config(ClientConfig::new(app_key)).await
    }

    /// Connect to a custom deployment.
    ///
    /// # Errors
    ///
    /// See [`Client::connect`].
    pub async fn connect_custom(app_key: &str, host: &str, scheme: &str) -> PusherResult<Self> {
        Self::connect_with_config(ClientConfig::custom(app_key, host, scheme)).await
    }

    /// Connect over `WebSocket` using `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PusherError::Config`] for an invalid configuration, and
    /// otherwise the errors of [`Client::connect`].
    pub async fn connect_with_config(config: ClientConfig) -> PusherResult<Self> {
        Self::connect_with(config, &WebSocketConnector::new()).await
    }

    /// Connect through `connector` using `config`.
    ///
    /// # Errors
    ///
    /// See [`Client::connect_with_config`].
    pub async fn connect_with(config: ClientConfig, connector: &dyn Connector) -> PusherResult<Self> {
        config.validate()?;
        let (sink, source, established) = handshake(&config, connector).await?;
        Ok(Self::start(config, sink, source, established))
    }

    /// Connect, retrying transport failures with exponential backoff built
    /// from `config.retry`.
    ///
    /// # Errors
    ///
    /// Returns [`PusherError::RetriesExhausted`] once the attempt limit is
    /// reached, or the first non-transport error immediately.
    pub async fn connect_with_retry(
        config: ClientConfig,
        connector: &dyn Connector,
    ) -> PusherResult<Self> {
        let mut policy = ExponentialBackoff::from_config(&config.retry);
        Self::connect_with_policy(config, connector, &mut policy).await
    }

    /// Connect, consulting `policy` after each transport failure.
    ///
    /// Only the initial handshake is retried. Protocol and handshake errors
    /// are returned at once.
    ///
    /// # Errors
    ///
    /// See [`Client::connect_with_retry`].
    pub async fn connect_with_policy(
        config: ClientConfig,
        connector: &dyn Connector,
        policy: &mut dyn RetryPolicy,
    ) -> PusherResult<Self> {
        config.validate()?;
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            match handshake(&config, connector).await {
                Ok((sink, source, established)) => {
                    policy.reset();
                    return Ok(Self::start(config, sink, source, established));
                },
                Err(e) if e.is_transport() => {
                    let Some(delay) = policy.next_delay() else {
                        warn!(attempts, error = %e, "Giving up connecting");
                        return Err(PusherError::RetriesExhausted {
                            attempts,
                            last: Box::new(e),
                        });
                    };
                    warn!(
                        attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Connection failed; retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn start(
        config: ClientConfig,
        sink: BoxSink,
        source: BoxSource,
        established: ConnectionEstablished,
    ) -> Self {
        let session = Arc::new(Session::new(sink));
        session.mark_established();

        let binders = Arc::new(RwLock::new(BinderRegistry::new()));
        let (errors_tx, errors_rx) = mpsc::channel(config.error_buffer_size);
        let (conn_tx, conn_rx) = oneshot::channel();

        let heartbeat = tokio::spawn(heartbeat::run_heartbeat(
            Arc::clone(&session),
            config.heartbeat_interval(),
        ));
        let listener = tokio::spawn(
            Listener {
                session: Arc::clone(&session),
                source,
                binders: Arc::clone(&binders),
                protocol_errors: errors_tx,
                connection_error: conn_tx,
                overflow: config.overflow_policy,
            }
            .run(),
        );

        info!(
            socket_id = established.socket_id.as_deref().unwrap_or("-"),
            "Connection established"
        );

        Self {
            config,
            session,
            established,
            subscriptions: Mutex::new(SubscriptionRegistry::new()),
            binders,
            protocol_errors: Some(errors_rx),
            connection_error: Some(conn_rx),
            heartbeat,
            listener,
        }
    }

    /// Subscribe to `channel`.
    ///
    /// The channel is recorded only after the subscribe frame is written.
    ///
    /// # Errors
    ///
    /// Returns [`PusherError::AlreadySubscribed`] without sending anything
    /// if the channel is tracked, or the transport error if the send fails.
    pub async fn subscribe(&self, channel: &str) -> PusherResult<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.contains(channel) {
            return Err(PusherError::AlreadySubscribed(channel.to_owned()));
        }
        self.session
            .send(protocol::build_subscribe(channel)?)
            .await?;
        subscriptions.add(channel)?;
        info!(channel = %channel, "Subscribed");
        Ok(())
    }

    /// Unsubscribe from `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`PusherError::NotSubscribed`] without sending anything if the
    /// channel is not tracked, or the transport error if the send fails.
    pub async fn unsubscribe(&self, channel: &str) -> PusherResult<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        if !subscriptions.contains(channel) {
            return Err(PusherError::NotSubscribed(channel.to_owned()));
        }
        self.session
            .send(protocol::build_unsubscribe(channel)?)
            .await?;
        subscriptions.remove(channel)?;
        info!(channel = %channel, "Unsubscribed");
        Ok(())
    }

    /// Channels currently subscribed, in name order.
    pub async fn subscribed_channels(&self) -> Vec<String> {
        self.subscriptions.lock().await.channels()
    }

    /// Bind a queue to `event_name` and return its receiving end.
    ///
    /// The queue holds `event_buffer_size` events. `pusher:ping`,
    /// `pusher:pong` and `pusher:error` may be bound but never receive
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns [`PusherError::AlreadyBound`] if a queue already exists for
    /// `event_name`.
    pub async fn bind(&self, event_name: &str) -> PusherResult<mpsc::Receiver<Event>> {
        let (tx, rx) = mpsc::channel(self.config.event_buffer_size);
        self.binders.write().await.insert(event_name, tx)?;
        if matches!(event_name, event::PING | event::PONG | event::ERROR) {
            warn!(event = %event_name, "Housekeeping events are never delivered to binders");
        } else {
            debug!(event = %event_name, "Bound");
        }
        Ok(rx)
    }

    /// Remove the queue bound to `event_name`, if any.
    ///
    /// Events already queued stay readable; the receiver then sees the end
    /// of the stream.
    pub async fn unbind(&self, event_name: &str) {
        if self.binders.write().await.delete(event_name) {
            debug!(event = %event_name, "Unbound");
        }
    }

    /// Take the queue of `pusher:error` events received during the session.
    ///
    /// Returns `None` after the first call. Under
    /// [`OverflowPolicy::Block`](crate::OverflowPolicy::Block) an undrained
    /// queue stalls dispatch once full.
    pub fn take_protocol_errors(&mut self) -> Option<mpsc::Receiver<Event>> {
        self.protocol_errors.take()
    }

    /// Take the connection-error signal.
    ///
    /// Resolves with the transport error that ended the session. It fires at
    /// most once and never fires after [`Client::close`]. Returns `None`
    /// after the first call.
    pub fn take_connection_error(&mut self) -> Option<oneshot::Receiver<PusherError>> {
        self.connection_error.take()
    }

    /// Returns `true` until the connection fails or is closed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Watch lifecycle state changes.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.session.state_changes()
    }

    /// Socket id assigned by the server during the handshake.
    #[must_use]
    pub fn socket_id(&self) -> Option<&str> {
        self.established.socket_id.as_deref()
    }

    /// Inactivity timeout announced by the server during the handshake.
    #[must_use]
    pub fn activity_timeout(&self) -> Option<Duration> {
        self.established.activity_timeout.map(Duration::from_secs)
    }

    /// The configuration this client was created with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Close the connection.
    ///
    /// Stops both background tasks and sends a close frame. Closing a
    /// client that is already closed or failed does nothing.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the close frame could not be sent.
    pub async fn close(&self) -> PusherResult<()> {
        if !self.session.shutdown() {
            return Ok(());
        }
        self.heartbeat.abort();
        self.listener.abort();
        self.session.close_transport().await
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.session.shutdown();
        self.heartbeat.abort();
        self.listener.abort();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.config.connection_url())
            .field("state", &self.state())
            .field("socket_id", &self.established.socket_id)
            .finish_non_exhaustive()
    }
}

/// Open the transport and validate the first frame.
async fn handshake(
    config: &ClientConfig,
    connector: &dyn Connector,
) -> PusherResult<(BoxSink, BoxSource, ConnectionEstablished)> {
    let url = config.connection_url();
    info!(url = %url, "Connecting");

    let open = async {
        let (sink, mut source) = connector.connect(&url).await?;
        let frame = source
            .recv()
            .await
            .map_err(|e| PusherError::Handshake(format!("failed to read first frame: {e}")))?;
        Ok::<_, PusherError>((sink, source, frame))
    };

    let (sink, source, frame) = match config.handshake_timeout() {
        Some(limit) => tokio::time::timeout(limit, open).await.map_err(|_| {
            PusherError::Handshake(format!("no response within {limit:?}"))
        })??,
        None => open.await?,
    };

    let established = read_handshake(&frame, config.max_message_bytes)?;
    Ok((sink, source, established))
}

/// Interpret the first frame of a session.
fn read_handshake(frame: &str, max_bytes: usize) -> PusherResult<ConnectionEstablished> {
    if frame.len() > max_bytes {
        return Err(PusherError::Handshake(format!(
            "first frame is {} bytes, limit is {max_bytes}",
            frame.len()
        )));
    }

    let first = protocol::decode_frame(frame)
        .map_err(|e| PusherError::Handshake(format!("undecodable first frame: {e}")))?;

    match first.event.as_str() {
        event::CONNECTION_ESTABLISHED => Ok(parse_established(&first.data)),
        event::ERROR => {
            let data: ProtocolErrorData = first
                .decode()
                .map_err(|e| PusherError::Handshake(format!("undecodable error frame: {e}")))?;
            Err(data.into())
        },
        other => Err(PusherError::Handshake(format!(
            "unexpected first event {other}"
        ))),
    }
}

fn parse_established(data: &str) -> ConnectionEstablished {
    if data.trim().is_empty() {
        return ConnectionEstablished::default();
    }
    serde_json::from_str(data).unwrap_or_else(|e| {
        debug!(error = %e, "Ignoring unreadable connection data");
        ConnectionEstablished::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn established_frame_accepted() {
        let data = read_handshake(
            r#"{"event":"pusher:connection_established","data":"{\"socket_id\":\"1.2\",\"activity_timeout\":120}"}"#,
            protocol::MAX_MESSAGE_BYTES,
        )
        .unwrap();
        assert_eq!(data.socket_id.as_deref(), Some("1.2"));
        assert_eq!(data.activity_timeout, Some(120));
    }

    #[test]
    fn established_with_empty_payload() {
        let data = read_handshake(
            r#"{"event":"pusher:connection_established","data":"{}"}"#,
            protocol::MAX_MESSAGE_BYTES,
        )
        .unwrap();
        assert_eq!(data, ConnectionEstablished::default());

        let data = read_handshake(
            r#"{"event":"pusher:connection_established"}"#,
            protocol::MAX_MESSAGE_BYTES,
        )
        .unwrap();
        assert!(data.socket_id.is_none());
    }

    #[test]
    fn error_frame_becomes_protocol_error() {
        let err = read_handshake(
            r#"{"event":"pusher:error","data":"{\"code\":4001,\"message\":\"App key not found\"}"}"#,
            protocol::MAX_MESSAGE_BYTES,
        )
        .unwrap_err();
        match err {
            PusherError::Protocol { code, message } => {
                assert_eq!(code, Some(4001));
                assert_eq!(message, "App key not found");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wide_error_code_stays_protocol_error() {
        let err = read_handshake(
            r#"{"event":"pusher:error","data":"{\"code\":100000,\"message\":\"over\"}"}"#,
            protocol::MAX_MESSAGE_BYTES,
        )
        .unwrap_err();
        assert!(matches!(err, PusherError::Protocol { code: Some(100_000), .. }));
    }

    #[test]
    fn other_first_event_is_handshake_error() {
        let err = read_handshake(
            r#"{"event":"order.created","data":"{}"}"#,
            protocol::MAX_MESSAGE_BYTES,
        )
        .unwrap_err();
        assert!(matches!(err, PusherError::Handshake(_)));
    }

    #[test]
    fn garbage_is_handshake_error() {
        let err = read_handshake("nope", protocol::MAX_MESSAGE_BYTES).unwrap_err();
        assert!(matches!(err, PusherError::Handshake(_)));
    }

    #[test]
    fn oversized_frame_rejected() {
        let padding = "x".repeat(protocol::MAX_MESSAGE_BYTES);
        let frame = format!(r#"{{"event":"pusher:connection_established","data":"{padding}"}}"#);
        let err = read_handshake(&frame, protocol::MAX_MESSAGE_BYTES).unwrap_err();
        assert!(err.to_string().contains("limit"));
    }
}
