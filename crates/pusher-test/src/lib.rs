//! Pusher Test - Shared test utilities for the Pusher client.
//!
//! This crate provides a scripted in-memory transport and frame fixtures
//! for use as a dev-dependency.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pusher_client::{Client, ClientConfig};
//! use pusher_test::{MockConnector, connection_established_frame};
//!
//! #[tokio::test]
//! async fn subscribes() {
//!     let connector = MockConnector::new();
//!     let mut server = connector.accept(connection_established_frame());
//!
//!     let client = Client::connect_with(ClientConfig::new("key"), &connector)
//!         .await
//!         .unwrap();
//!     client.subscribe("orders").await.unwrap();
//!
//!     assert!(server.expect_sent().await.contains("pusher:subscribe"));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
