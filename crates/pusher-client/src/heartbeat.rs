//! Heartbeat task.
//!
//! Sends a ping frame as soon as the session starts and then once per
//! interval for as long as the session is running. A failed send marks the connection degraded; it does not end
//! the session, which is the listen task's job.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::protocol::PING_FRAME;
use crate::session::{ConnectionState, Session};

/// Run the heartbeat loop until the session stops.
pub(crate) async fn run_heartbeat(session: Arc<Session>, interval: Duration) {
    let mut state_rx = session.state_changes();
    let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    debug!(interval_ms, "Heartbeat task started");

    while session.is_running() {
        match session.send(PING_FRAME.to_owned()).await {
            Ok(()) => {
                trace!("Heartbeat sent");
                session.mark_healthy();
            },
            Err(e) => {
                warn!(error = %e, "Heartbeat send failed");
                session.mark_degraded();
            },
        }

        tokio::select! {
            biased;
            () = closed(&mut state_rx) => break,
            () = tokio::time::sleep(interval) => {},
        }
    }

    debug!("Heartbeat task stopped");
}

/// Resolves once the state reaches `Closed` or the session is gone.
async fn closed(state_rx: &mut watch::Receiver<ConnectionState>) {
    let _ = state_rx.wait_for(ConnectionState::is_closed).await;
}
