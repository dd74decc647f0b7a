//! Shared event broadcaster
//!
//! Every component that publishes [`PlayerEvent`]s holds an
//! `Arc<SharedState>`; SSE clients subscribe through it.

use offtrack_common::events::PlayerEvent;
use tokio::sync::broadcast;

/// Capacity of the event channel; slow SSE clients skip lagged events
const EVENT_CAPACITY: usize = 256;

pub struct SharedState {
    event_tx: broadcast::Sender<PlayerEvent>,
}

impl SharedState {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { event_tx }
    }

    /// Publish an event; having no subscribers is not an error
    pub fn broadcast_event(&self, event: PlayerEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.event_tx.subscribe()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
