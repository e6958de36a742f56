//! Event-name to delivery-queue routing table.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::error::{PusherError, PusherResult};
use crate::protocol::Event;

/// Maps an event name to the sending half of its delivery queue.
///
/// At most one queue exists per event name. The listen task reads the table
/// on every inbound event; the client writes it on bind/unbind.
#[derive(Debug, Default)]
pub struct BinderRegistry {
    binders: HashMap<String, mpsc::Sender<Event>>,
}

impl BinderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The queue bound to `event`, if any.
    #[must_use]
    pub fn get(&self, event: &str) -> Option<&mpsc::Sender<Event>> {
        self.binders.get(event)
    }

    /// Register `sender` for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`PusherError::AlreadyBound`] if a queue already exists; the
    /// existing queue is kept.
    pub fn insert(&mut self, event: &str, sender: mpsc::Sender<Event>) -> PusherResult<()> {
        if self.binders.contains_key(event) {
            return Err(PusherError::AlreadyBound(event.to_owned()));
        }
        self.binders.insert(event.to_owned(), sender);
        Ok(())
    }

    /// Remove the registration for `event`. Returns `true` if one existed.
    pub fn delete(&mut self, event: &str) -> bool {
        self.binders.remove(event).is_some()
    }

    /// Returns `true` if `event` has a queue.
    #[must_use]
    pub fn contains(&self, event: &str) -> bool {
        self.binders.contains_key(event)
    }

    /// Number of bound events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.binders.len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.binders.is_empty()
    }
}
