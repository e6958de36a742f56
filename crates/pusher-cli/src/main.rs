//! `pusher` - subscribe to Pusher channels from the command line.
//!
//! Connects, subscribes to the given channels, binds the given event names,
//! and prints each delivered event as one JSON line on stdout. Runs until
//! Ctrl-C or until the connection is lost.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use pusher_client::{Client, ClientConfig, Event, WebSocketConnector};
use pusher_telemetry::{LogConfig, LogFormat};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Pusher channels command-line client.
#[derive(Parser, Debug)]
#[command(name = "pusher")]
#[command(author, version, about = "Subscribe to Pusher channels and print events")]
struct Cli {
    /// Application key (falls back to PUSHER_APP_KEY)
    #[arg(short, long)]
    key: Option<String>,

    /// Endpoint host[:port] (falls back to PUSHER_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Endpoint scheme: ws or wss (falls back to PUSHER_SCHEME)
    #[arg(long)]
    scheme: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Channel to subscribe to (repeatable)
    #[arg(short = 'C', long = "channel")]
    channels: Vec<String>,

    /// Event name to bind and print (repeatable)
    #[arg(short, long = "bind")]
    binds: Vec<String>,

    /// Heartbeat interval in seconds
    #[arg(long)]
    heartbeat_secs: Option<u64>,

    /// Retry the initial connection with backoff
    #[arg(long)]
    retry: bool,

    /// Log level filter
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format: pretty, compact, json or full
    #[arg(long, default_value = "compact")]
    log_format: String,
}

impl Cli {
    /// Resolve configuration: file, then flags, then environment fallbacks.
    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ClientConfig::default(),
        };

        if let Some(key) = &self.key {
            config.app_key.clone_from(key);
        }
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(scheme) = &self.scheme {
            config.scheme.clone_from(scheme);
        }
        if let Some(secs) = self.heartbeat_secs {
            config = config.with_heartbeat_interval(Duration::from_secs(secs));
        }
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn log_config(&self) -> Result<LogConfig> {
        let format: LogFormat = self.log_format.parse()?;
        Ok(LogConfig::new(&self.log_level).with_format(format))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = cli.log_config()?;
    if let Err(e) = pusher_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let config = cli.client_config()?;
    let connector = WebSocketConnector::new();
    let mut client = if cli.retry {
        Client::connect_with_retry(config, &connector).await?
    } else {
        Client::connect_with(config, &connector).await?
    };

    let events = bind_all(&client, &cli.binds).await?;
    for channel in &cli.channels {
        client.subscribe(channel).await?;
    }

    let result = run(&mut client, events).await;
    if let Err(e) = client.close().await {
        warn!(error = %e, "Close handshake failed");
    }
    result
}

/// Bind every event name and merge the queues into one.
async fn bind_all(client: &Client, names: &[String]) -> Result<mpsc::Receiver<Event>> {
    if names.is_empty() {
        warn!("No --bind given; only errors will be printed");
    }

    let (tx, rx) = mpsc::channel(client.config().event_buffer_size);
    for name in names {
        let mut queue = client.bind(name).await?;
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = queue.recv().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
    }
    Ok(rx)
}

/// Print events until Ctrl-C or connection loss.
async fn run(client: &mut Client, mut events: mpsc::Receiver<Event>) -> Result<()> {
    let Some(mut protocol_errors) = client.take_protocol_errors() else {
        bail!("protocol error queue already taken");
    };
    let Some(mut connection_error) = client.take_connection_error() else {
        bail!("connection error signal already taken");
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; closing");
                return Ok(());
            }
            err = &mut connection_error => {
                return match err {
                    Ok(e) => Err(anyhow::Error::new(e).context("connection lost")),
                    Err(_) => Ok(()),
                };
            }
            Some(error) = protocol_errors.recv() => {
                eprintln!("{}", serde_json::to_string(&error)?);
            }
            Some(event) = events.recv() => {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
    }
}
