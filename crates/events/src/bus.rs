//! Event bus built on tokio broadcast channels

use tokio::sync::broadcast;

use crate::types::{Event, EventEnvelope};

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out channel between the orchestrator and its consumers.
///
/// Publishing wraps the event in an [`EventEnvelope`]. Events published
/// while nobody is subscribed are dropped; subscribers only see events
/// published after they subscribed.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event, returning how many subscribers received it.
    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(EventEnvelope::new(event)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
