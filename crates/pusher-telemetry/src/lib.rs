//! Pusher Telemetry - Logging setup for Pusher client applications.
//!
//! The client library only emits `tracing` events. Applications choose how
//! they are rendered and where they go:
//! - Pretty, compact, JSON or full formats
//! - stdout, stderr, or a rolling log file
//! - An `EnvFilter` level plus per-target directives
//!
//! # Example
//!
//! ```rust,no_run
//! use pusher_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), pusher_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("pusher_client=debug");
//!
//! setup_logging(&config)?;
//! tracing::info!("logging ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{FileRotation, LogConfig, LogFormat, LogTarget, setup_logging};
