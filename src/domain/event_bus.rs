//! Broadcast channel for lifecycle events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. The memory
//! backend publishes every written [`Event`] through the bus, and streaming
//! readers subscribe to receive events as they happen.

use tokio::sync::broadcast;

use super::Event;

/// Largest ring buffer a bus allocates, whatever capacity is requested.
pub const MAX_BUS_CAPACITY: usize = 1024;

/// Broadcast bus for [`Event`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity.
/// When the ring buffer is full, the oldest events are dropped for lagging
/// receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    ///
    /// The capacity is clamped to `1..=MAX_BUS_CAPACITY`; it only bounds
    /// how far a subscriber may lag, not how much history is kept.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.clamp(1, MAX_BUS_CAPACITY));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no active receivers, the event is silently dropped.
    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
