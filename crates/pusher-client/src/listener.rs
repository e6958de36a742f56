//! Listen task: reads inbound frames and routes them.
//!
//! Housekeeping events are handled here: a server ping is answered with a
//! pong before the next frame is read, a pong is ignored, and an error
//! frame goes to the protocol-error queue. Every other event goes to the
//! queue bound to its name, or nowhere.
//!
//! A failed read, an undecodable frame or a failed pong ends the session.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, error, trace, warn};

use crate::binders::BinderRegistry;
use crate::config::OverflowPolicy;
use crate::error::{PusherError, PusherResult};
use crate::protocol::{self, Event, PONG_FRAME, event};
use crate::session::Session;
use crate::transport::BoxSource;

/// Owns the receive half of the transport for the life of the session.
pub(crate) struct Listener {
    pub(crate) session: Arc<Session>,
    pub(crate) source: BoxSource,
    pub(crate) binders: Arc<RwLock<BinderRegistry>>,
    pub(crate) protocol_errors: mpsc::Sender<Event>,
    pub(crate) connection_error: oneshot::Sender<PusherError>,
    pub(crate) overflow: OverflowPolicy,
}

impl Listener {
    /// Read and dispatch frames until the transport fails.
    pub(crate) async fn run(mut self) {
        debug!("Listen task started");
        let err = loop {
            let result = match self.next_event().await {
                Ok(event) => self.dispatch(event).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                break e;
            }
        };

        if !self.session.shutdown() {
            // Closed by the caller; the error is the close handshake.
            debug!(error = %err, "Listen task stopped after close");
            return;
        }

        error!(error = %err, "Connection lost");
        if self.connection_error.send(err).is_err() {
            debug!("Connection error dropped; no one is listening");
        }
    }

    async fn next_event(&mut self) -> PusherResult<Event> {
        let frame = self.source.recv().await?;
        trace!(frame = %frame, "received frame");
        protocol::decode_frame(&frame)
    }

    async fn dispatch(&self, event: Event) -> PusherResult<()> {
        match event.event.as_str() {
            event::PING => {
                self.session
                    .send(PONG_FRAME.to_owned())
                    .await
                    .inspect_err(|e| warn!(error = %e, "Failed to answer server ping"))?;
            },
            event::PONG => trace!("Pong received"),
            event::ERROR => {
                warn!(data = %event.data, "Server reported an error");
                deliver(&self.protocol_errors, event, self.overflow).await;
            },
            name => {
                let sender = self.binders.read().await.get(name).cloned();
                match sender {
                    Some(sender) => deliver(&sender, event, self.overflow).await,
                    None => trace!(event = %name, "No binder; discarding event"),
                }
            },
        }
        Ok(())
    }
}

/// Push `event` onto a queue according to `policy`.
async fn deliver(queue: &mpsc::Sender<Event>, event: Event, policy: OverflowPolicy) {
    match policy {
        OverflowPolicy::Block => {
            if let Err(mpsc::error::SendError(event)) = queue.send(event).await {
                debug!(event = %event.event, "Consumer gone; discarding event");
            }
        },
        OverflowPolicy::DropNewest => match queue.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(event)) => {
                warn!(event = %event.event, "Queue full; dropping event");
            },
            Err(TrySendError::Closed(event)) => {
                debug!(event = %event.event, "Consumer gone; discarding event");
            },
        },
    }
}
