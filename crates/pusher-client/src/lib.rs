//! Pusher Client - real-time pub/sub over a persistent `WebSocket`.
//!
//! This crate provides a client for the Pusher channels protocol:
//! - Connection handshake against a hosted or custom endpoint
//! - Periodic heartbeat pings
//! - A background listener that answers server pings and routes events
//! - Channel subscriptions and per-event delivery queues
//! - Connection-error and protocol-error signals
//!
//! # Architecture
//!
//! ```text
//! Client (connection manager)
//! ├── SubscriptionRegistry (channels)
//! ├── BinderRegistry (event name -> queue)
//! └── Session (liveness flag, state, send-mutex)
//!     ├── heartbeat task  ── ping ──────────┐
//!     └── listen task     ── pong / route ──┴─> FrameSink
//!                         <── FrameSource
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use pusher_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("app-key").await?;
//!     client.subscribe("orders").await?;
//!
//!     let mut created = client.bind("order.created").await?;
//!     while let Some(event) = created.recv().await {
//!         println!("{}", event.data);
//!     }
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod backoff;
pub mod binders;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod subscriptions;
pub mod transport;
pub mod websocket;

mod heartbeat;
mod listener;

pub use backoff::{ExponentialBackoff, NoRetry, RetryPolicy};
pub use binders::BinderRegistry;
pub use client::Client;
pub use config::{ClientConfig, ConfigError, OverflowPolicy, RetryConfig};
pub use error::{PusherError, PusherResult};
pub use protocol::{ConnectionEstablished, Event};
pub use session::ConnectionState;
pub use subscriptions::SubscriptionRegistry;
pub use transport::{BoxSink, BoxSource, Connector, FrameSink, FrameSource};
pub use websocket::WebSocketConnector;
