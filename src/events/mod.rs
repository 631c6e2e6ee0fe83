//! Event system for agent state notifications
//!
//! The event bus is the agent's display surface: status lines, detected
//! numbers and overlay geometry are published here and rendered by whoever
//! subscribes (the CLI front end, tests).

pub mod types;

pub use types::{AgentEvent, StatusSource};

use tokio::sync::broadcast;

/// Event channel capacity (ring buffer size)
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Broadcast bus for agent events
///
/// # Example
///
/// ```no_run
/// use dbmeter_agent::events::{AgentEvent, EventBus, StatusSource};
///
/// let bus = EventBus::new();
/// let mut rx = bus.subscribe();
///
/// bus.publish(AgentEvent::status(StatusSource::Signaling, "signaling connected"));
///
/// tokio::spawn(async move {
///     while let Ok(event) = rx.recv().await {
///         println!("Received event: {:?}", event);
///     }
/// });
/// ```
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all subscribers
    ///
    /// Events published while nobody is subscribed are dropped.
    pub fn publish(&self, event: AgentEvent) {
        let _ = self.tx.send(event);
    }

    /// Publish a status line
    pub fn status(&self, source: StatusSource, text: impl Into<String>) {
        self.publish(AgentEvent::status(source, text));
    }

    /// Subscribe to events
    ///
    /// A subscriber that falls more than the ring size behind receives
    /// `Lagged` and misses the overwritten events.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
