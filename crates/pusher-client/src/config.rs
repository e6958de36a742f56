//! Client configuration.
//!
//! A [`ClientConfig`] can be built in code, parsed from TOML, or loaded from a
//! file. Environment variables act as a fallback: they only fill fields that
//! are still at their default value.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::protocol::{self, DEFAULT_HOST, DEFAULT_SCHEME, MAX_MESSAGE_BYTES, PROTOCOL_VERSION};

/// Errors produced while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path of the file.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The TOML could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds an unusable value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// What to do when a delivery queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for the consumer to make room. A slow consumer stalls all
    /// dispatch, including ping replies.
    #[default]
    Block,
    /// Discard the incoming event and keep dispatching.
    DropNewest,
}

/// Retry settings for the initial connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total connection attempts, including the first.
    pub max_attempts: u32,
    /// Base delay for exponential backoff (milliseconds).
    pub initial_delay_ms: u64,
    /// Maximum backoff delay (milliseconds).
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

/// Configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Application key placed in the connection URL.
    pub app_key: String,
    /// Endpoint `host[:port]`.
    pub host: String,
    /// `ws` or `wss`.
    pub scheme: String,
    /// Protocol version sent in the URL query.
    pub protocol_version: String,
    /// Milliseconds between heartbeat pings.
    pub heartbeat_interval_ms: u64,
    /// Capacity of each binder queue.
    pub event_buffer_size: usize,
    /// Capacity of the protocol-error queue.
    pub error_buffer_size: usize,
    /// Policy applied when a queue is full.
    pub overflow_policy: OverflowPolicy,
    /// Largest handshake frame accepted.
    pub max_message_bytes: usize,
    /// Optional bound on opening the socket and reading the first frame
    /// (milliseconds).
    pub handshake_timeout_ms: Option<u64>,
    /// Retry settings used by [`Client::connect_with_retry`](crate::Client::connect_with_retry).
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            host: DEFAULT_HOST.to_string(),
            scheme: DEFAULT_SCHEME.to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            heartbeat_interval_ms: 30_000,
            event_buffer_size: 1000,
            error_buffer_size: 16,
            overflow_policy: OverflowPolicy::Block,
            max_message_bytes: MAX_MESSAGE_BYTES,
            handshake_timeout_ms: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Environment variables consulted by [`ClientConfig::apply_env_fallbacks`].
pub const ENV_APP_KEY: &str = "PUSHER_APP_KEY";
/// Endpoint host fallback.
pub const ENV_HOST: &str = "PUSHER_HOST";
/// Endpoint scheme fallback.
pub const ENV_SCHEME: &str = "PUSHER_SCHEME";
/// Heartbeat interval fallback (seconds).
pub const ENV_HEARTBEAT_SECS: &str = "PUSHER_HEARTBEAT_SECS";

impl ClientConfig {
    /// Configuration for the standard hosted endpoint.
    #[must_use]
    pub fn new(app_key: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            ..Self::default()
        }
    }

    /// Configuration for a custom deployment.
    #[must_use]
    pub fn custom(
        app_key: impl Into<String>,
        host: impl Into<String>,
        scheme: impl Into<String>,
    ) -> Self {
        Self {
            app_key: app_key.into(),
            host: host.into(),
            scheme: scheme.into(),
            ..Self::default()
        }
    }

    /// Set the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = millis(interval);
        self
    }

    /// Set the capacity of each binder queue.
    #[must_use]
    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    /// Set the capacity of the protocol-error queue.
    #[must_use]
    pub fn with_error_buffer_size(mut self, size: usize) -> Self {
        self.error_buffer_size = size;
        self
    }

    /// Set the queue overflow policy.
    #[must_use]
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Bound the initial connect and handshake read.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = Some(millis(timeout));
        self
    }

    /// Set the retry settings for the initial connection.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Heartbeat period.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Handshake timeout, if any.
    #[must_use]
    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_ms.map(Duration::from_millis)
    }

    /// The URL the client connects to.
    #[must_use]
    pub fn connection_url(&self) -> String {
        protocol::connection_url(
            &self.scheme,
            &self.host,
            &self.app_key,
            &self.protocol_version,
        )
    }

    /// Parse configuration from a TOML string. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        debug!(path = %path.display(), "loaded client config");
        Ok(config)
    }

    /// Fill fields still at their default from the process environment.
    ///
    /// Returns the number of variables applied.
    pub fn apply_env(&mut self) -> usize {
        let vars: HashMap<String, String> = std::env::vars().collect();
        self.apply_env_fallbacks(&vars)
    }

    /// Fill fields still at their default from `vars`.
    ///
    /// Returns the number of variables applied. Unparseable values are
    /// skipped.
    pub fn apply_env_fallbacks<S: std::hash::BuildHasher>(
        &mut self,
        vars: &HashMap<String, String, S>,
    ) -> usize {
        let defaults = Self::default();
        let mut applied: usize = 0;

        if self.app_key == defaults.app_key
            && let Some(key) = vars.get(ENV_APP_KEY)
        {
            self.app_key.clone_from(key);
            applied = applied.saturating_add(1);
        }
        if self.host == defaults.host
            && let Some(host) = vars.get(ENV_HOST)
        {
            self.host.clone_from(host);
            applied = applied.saturating_add(1);
        }
        if self.scheme == defaults.scheme
            && let Some(scheme) = vars.get(ENV_SCHEME)
        {
            self.scheme.clone_from(scheme);
            applied = applied.saturating_add(1);
        }
        if self.heartbeat_interval_ms == defaults.heartbeat_interval_ms
            && let Some(secs) = vars
                .get(ENV_HEARTBEAT_SECS)
                .and_then(|v| v.parse::<u64>().ok())
        {
            self.heartbeat_interval_ms = secs.saturating_mul(1000);
            applied = applied.saturating_add(1);
        }

        if applied > 0 {
            debug!(applied, "applied environment fallbacks");
        }
        applied
    }

    /// Check that the configuration can be used to connect.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.app_key.trim().is_empty() {
            return Err(ConfigError::Invalid("app_key must not be empty".into()));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if !matches!(self.scheme.as_str(), "ws" | "wss") {
            return Err(ConfigError::Invalid(format!(
                "scheme must be ws or wss, got {}",
                self.scheme
            )));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_ms must be positive".into(),
            ));
        }
        if self.handshake_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "handshake_timeout_ms must be positive when set".into(),
            ));
        }
        if self.event_buffer_size == 0 || self.error_buffer_size == 0 {
            return Err(ConfigError::Invalid("queue sizes must be positive".into()));
        }
        if self.max_message_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_message_bytes must be positive".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        url::Url::parse(&self.connection_url())
            .map_err(|e| ConfigError::Invalid(format!("connection URL: {e}")))?;
        Ok(())
    }
}

/// Whole milliseconds in `duration`, saturating.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
