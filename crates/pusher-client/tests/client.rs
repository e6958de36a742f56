//! Client behaviour against the scripted in-memory transport.

use std::time::Duration;

use tokio::time::Instant;

use pusher_client::protocol::{PING_FRAME, PONG_FRAME};
use pusher_client::{Client, ClientConfig, ConnectionState, OverflowPolicy, PusherError};
use pusher_test::{
    MockConnector, MockServer, channel_event_frame, connection_established_frame,
    connection_established_with, error_frame, event_frame, init_test_logging, ping_frame,
    pong_frame, within,
};

/// Connect and consume the heartbeat's opening ping.
async fn connect(config: ClientConfig) -> (Client, MockServer, MockConnector) {
    init_test_logging();
    let connector = MockConnector::new();
    let mut server = connector.accept(connection_established_frame());
    let client = Client::connect_with(config, &connector).await.unwrap();
    assert_eq!(server.expect_sent().await, PING_FRAME);
    (client, server, connector)
}

/// Push a ping and wait for the pong, so every earlier frame has been
/// dispatched.
async fn sync(server: &mut MockServer) {
    assert!(server.push(ping_frame()));
    assert_eq!(server.expect_sent().await, PONG_FRAME);
}

#[tokio::test]
async fn end_to_end_scenario() {
    let (mut client, mut server, connector) = connect(ClientConfig::new("key")).await;
    assert_eq!(
        connector.urls(),
        vec!["wss://ws.pusherapp.com:443/app/key?protocol=7".to_string()]
    );
    assert_eq!(client.state(), ConnectionState::Established);

    client.subscribe("orders").await.unwrap();
    assert_eq!(
        server.expect_sent().await,
        r#"{"event":"pusher:subscribe","data":{"channel":"orders"}}"#
    );

    let err = client.subscribe("orders").await.unwrap_err();
    assert!(matches!(err, PusherError::AlreadySubscribed(ref c) if c == "orders"));
    assert!(server.try_sent().is_none());

    let mut created = client.bind("order.created").await.unwrap();
    let mut errors = client.take_protocol_errors().unwrap();

    server.push(event_frame("order.created", r#"{"id":42}"#));
    let event = within(created.recv()).await.unwrap();
    assert_eq!(event.event, "order.created");
    assert_eq!(event.data, r#"{"id":42}"#);

    server.push(error_frame(4001, "bad"));
    let error = within(errors.recv()).await.unwrap();
    assert_eq!(error.event, "pusher:error");
    let protocol_error: PusherError = error
        .decode::<pusher_client::protocol::ProtocolErrorData>()
        .unwrap()
        .into();
    assert!(protocol_error.to_string().contains("4001"));
    assert!(created.try_recv().is_err());
}

#[tokio::test]
async fn custom_endpoint_url() {
    init_test_logging();
    let connector = MockConnector::new();
    let _server = connector.accept(connection_established_frame());
    let config = ClientConfig::custom("abc", "localhost:6001", "ws");
    let _client = Client::connect_with(config, &connector).await.unwrap();
    assert_eq!(connector.urls(), vec!["ws://localhost:6001/app/abc?protocol=7".to_string()]);
}

#[tokio::test]
async fn handshake_exposes_connection_data() {
    init_test_logging();
    let connector = MockConnector::new();
    let _server = connector.accept(connection_established_with("123.456", 120));
    let client = Client::connect_with(ClientConfig::new("key"), &connector)
        .await
        .unwrap();

    assert_eq!(client.socket_id(), Some("123.456"));
    assert_eq!(client.activity_timeout(), Some(Duration::from_secs(120)));
}

#[tokio::test]
async fn handshake_error_frame_fails_connect() {
    init_test_logging();
    let connector = MockConnector::new();
    let _server = connector.accept(error_frame(4001, "App key not found"));

    let err = Client::connect_with(ClientConfig::new("key"), &connector)
        .await
        .unwrap_err();
    match err {
        PusherError::Protocol { code, message } => {
            assert_eq!(code, Some(4001));
            assert_eq!(message, "App key not found");
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unexpected_first_frame_fails_connect() {
    init_test_logging();
    let connector = MockConnector::new();
    let _server = connector.accept(event_frame("order.created", "{}"));

    let err = Client::connect_with(ClientConfig::new("key"), &connector)
        .await
        .unwrap_err();
    assert!(matches!(err, PusherError::Handshake(_)));
}

#[tokio::test]
async fn unreachable_endpoint_is_transport_error() {
    init_test_logging();
    let connector = MockConnector::new();
    connector.refuse("connection refused");

    let err = Client::connect_with(ClientConfig::new("key"), &connector)
        .await
        .unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn invalid_config_rejected_before_connecting() {
    let connector = MockConnector::new();
    let err = Client::connect_with(ClientConfig::new(""), &connector)
        .await
        .unwrap_err();
    assert!(matches!(err, PusherError::Config(_)));
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn handshake_timeout() {
    let connector = MockConnector::new();
    let _server = connector.accept_silent();
    let config = ClientConfig::new("key").with_handshake_timeout(Duration::from_secs(2));

    let err = Client::connect_with(config, &connector).await.unwrap_err();
    assert!(matches!(err, PusherError::Handshake(ref m) if m.contains("no response")));
}

#[tokio::test]
async fn unsubscribe_requires_subscription() {
    let (client, mut server, _connector) = connect(ClientConfig::new("key")).await;

    let err = client.unsubscribe("orders").await.unwrap_err();
    assert!(matches!(err, PusherError::NotSubscribed(_)));
    assert!(server.try_sent().is_none());

    client.subscribe("orders").await.unwrap();
    server.expect_sent().await;
    client.unsubscribe("orders").await.unwrap();
    assert_eq!(
        server.expect_sent().await,
        r#"{"event":"pusher:unsubscribe","data":{"channel":"orders"}}"#
    );
    assert!(client.subscribed_channels().await.is_empty());

    client.subscribe("orders").await.unwrap();
    assert_eq!(client.subscribed_channels().await, vec!["orders".to_string()]);
}

#[tokio::test]
async fn failed_subscribe_leaves_registry_unchanged() {
    let (client, server, _connector) = connect(ClientConfig::new("key")).await;
    server.break_sends();

    let err = client.subscribe("orders").await.unwrap_err();
    assert!(err.is_transport());
    assert!(client.subscribed_channels().await.is_empty());

    server.restore_sends();
    client.subscribe("orders").await.unwrap();
}

#[tokio::test]
async fn second_bind_keeps_original_queue() {
    let (client, mut server, _connector) = connect(ClientConfig::new("key")).await;
    let mut first = client.bind("order.created").await.unwrap();

    let err = client.bind("order.created").await.unwrap_err();
    assert!(matches!(err, PusherError::AlreadyBound(_)));

    server.push(event_frame("order.created", "{}"));
    sync(&mut server).await;
    assert!(first.try_recv().is_ok());
}

#[tokio::test]
async fn events_route_only_to_their_binder() {
    let (client, mut server, _connector) = connect(ClientConfig::new("key")).await;
    let mut created = client.bind("order.created").await.unwrap();
    let mut deleted = client.bind("order.deleted").await.unwrap();

    server.push(channel_event_frame("order.created", "orders", "1"));
    server.push(event_frame("unbound", "{}"));
    server.push(channel_event_frame("order.created", "orders", "2"));
    sync(&mut server).await;

    let first = created.try_recv().unwrap();
    assert_eq!(first.data, "1");
    assert_eq!(first.channel.as_deref(), Some("orders"));
    assert_eq!(created.try_recv().unwrap().data, "2");
    assert!(created.try_recv().is_err());
    assert!(deleted.try_recv().is_err());
    assert!(client.is_running());
}

#[tokio::test]
async fn housekeeping_events_never_reach_binders() {
    let (mut client, mut server, _connector) = connect(ClientConfig::new("key")).await;
    let mut ping = client.bind("pusher:ping").await.unwrap();
    let mut pong = client.bind("pusher:pong").await.unwrap();
    let mut error = client.bind("pusher:error").await.unwrap();
    let mut errors = client.take_protocol_errors().unwrap();

    server.push(pong_frame());
    server.push(error_frame(4200, "slow down"));
    sync(&mut server).await;

    assert!(ping.try_recv().is_err());
    assert!(pong.try_recv().is_err());
    assert!(error.try_recv().is_err());
    assert_eq!(errors.try_recv().unwrap().event, "pusher:error");
}

#[tokio::test]
async fn each_ping_gets_one_pong() {
    let (_client, mut server, _connector) = connect(ClientConfig::new("key")).await;

    server.push(ping_frame());
    server.push(ping_frame());
    assert_eq!(server.expect_sent().await, PONG_FRAME);
    assert_eq!(server.expect_sent().await, PONG_FRAME);
    assert!(server.try_sent().is_none());
}

#[tokio::test]
async fn unbind_ends_the_stream_after_buffered_events() {
    let (client, mut server, _connector) = connect(ClientConfig::new("key")).await;
    let mut rx = client.bind("a").await.unwrap();

    server.push(event_frame("a", "1"));
    sync(&mut server).await;
    client.unbind("a").await;
    server.push(event_frame("a", "2"));
    sync(&mut server).await;

    assert_eq!(rx.recv().await.unwrap().data, "1");
    assert!(rx.recv().await.is_none());

    // Unbinding twice is fine, and the name can be bound again.
    client.unbind("a").await;
    let mut again = client.bind("a").await.unwrap();
    server.push(event_frame("a", "3"));
    sync(&mut server).await;
    assert_eq!(again.try_recv().unwrap().data, "3");
}

#[tokio::test]
async fn drop_newest_policy_discards_overflow() {
    let config = ClientConfig::new("key")
        .with_event_buffer_size(1)
        .with_overflow_policy(OverflowPolicy::DropNewest);
    let (client, mut server, _connector) = connect(config).await;
    let mut rx = client.bind("busy").await.unwrap();

    for n in 0..3 {
        server.push(event_frame("busy", &n.to_string()));
    }
    sync(&mut server).await;

    assert_eq!(rx.try_recv().unwrap().data, "0");
    assert!(rx.try_recv().is_err());
    assert!(client.is_running());
}

#[tokio::test]
async fn transport_error_fires_connection_error_once() {
    let (mut client, mut server, _connector) = connect(ClientConfig::new("key")).await;
    let connection_error = client.take_connection_error().unwrap();
    assert!(client.take_connection_error().is_none());
    let mut states = client.state_changes();

    server.hang_up();
    let err = within(connection_error).await.unwrap();
    assert!(err.is_transport());

    within(states.wait_for(ConnectionState::is_closed))
        .await
        .unwrap();
    assert!(!client.is_running());

    // A later subscribe still tries to send and fails on its own.
    server.break_sends();
    assert!(client.subscribe("late").await.unwrap_err().is_transport());
    assert!(client.subscribed_channels().await.is_empty());
}

#[tokio::test]
async fn close_stops_the_session_quietly() {
    let (mut client, server, _connector) = connect(ClientConfig::new("key")).await;
    let connection_error = client.take_connection_error().unwrap();

    client.close().await.unwrap();
    assert!(server.was_closed());
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(!client.is_running());

    // The signal never fires for a caller-initiated close.
    assert!(within(connection_error).await.is_err());

    assert!(client.subscribe("orders").await.unwrap_err().is_transport());
    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn first_heartbeat_follows_handshake() {
    init_test_logging();
    let connector = MockConnector::new();
    let mut server = connector.accept(connection_established_frame());
    let started = Instant::now();
    let _client = Client::connect_with(ClientConfig::new("key"), &connector)
        .await
        .unwrap();

    assert_eq!(server.expect_sent().await, PING_FRAME);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(server.try_sent().is_none());
}

#[tokio::test(start_paused = true)]
async fn subsecond_heartbeat_interval() {
    let config = ClientConfig::new("key").with_heartbeat_interval(Duration::from_millis(250));
    let (_client, mut server, _connector) = connect(config).await;
    let started = Instant::now();

    assert_eq!(server.expect_sent().await, PING_FRAME);
    assert_eq!(started.elapsed(), Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn heartbeat_pings_at_interval() {
    let config = ClientConfig::new("key").with_heartbeat_interval(Duration::from_secs(1));
    let (_client, mut server, _connector) = connect(config).await;

    assert_eq!(server.expect_sent().await, PING_FRAME);
    assert_eq!(server.expect_sent().await, PING_FRAME);
}

#[tokio::test(start_paused = true)]
async fn failed_heartbeat_degrades_connection() {
    let config = ClientConfig::new("key").with_heartbeat_interval(Duration::from_secs(1));
    let (client, mut server, _connector) = connect(config).await;
    let mut states = client.state_changes();

    server.break_sends();
    within(states.wait_for(|s| *s == ConnectionState::Degraded))
        .await
        .unwrap();
    assert!(client.is_running());

    server.restore_sends();
    assert_eq!(server.expect_sent().await, PING_FRAME);
    within(states.wait_for(|s| *s == ConnectionState::Established))
        .await
        .unwrap();
}

#[tokio::test]
async fn dropping_client_stops_tasks() {
    let (client, mut server, _connector) = connect(ClientConfig::new("key")).await;
    let states = client.state_changes();
    drop(client);

    assert!(states.borrow().is_closed());
    within(async {
        while server.push(ping_frame()) {
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert!(server.drain_sent().iter().all(|f| f == PONG_FRAME));
}
