//! Set of channels the client is subscribed to.

use std::collections::BTreeSet;

use crate::error::{PusherError, PusherResult};

/// Tracks subscribed channel names. Names are unique by value.
///
/// Not synchronised; the client guards it with a mutex held across the
/// subscribe/unsubscribe send.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    channels: BTreeSet<String>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `channel` is tracked.
    #[must_use]
    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    /// Track `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`PusherError::AlreadySubscribed`] if it is already tracked.
    pub fn add(&mut self, channel: &str) -> PusherResult<()> {
        if !self.channels.insert(channel.to_owned()) {
            return Err(PusherError::AlreadySubscribed(channel.to_owned()));
        }
        Ok(())
    }

    /// Stop tracking `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`PusherError::NotSubscribed`] if it is not tracked.
    pub fn remove(&mut self, channel: &str) -> PusherResult<()> {
        if !self.channels.remove(channel) {
            return Err(PusherError::NotSubscribed(channel.to_owned()));
        }
        Ok(())
    }

    /// Tracked channels in name order.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.channels.iter().cloned().collect()
    }

    /// Number of tracked channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
