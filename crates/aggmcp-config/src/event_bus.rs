//! In-process event bus wiring [`DomainEvent`] publishers (the config
//! watcher, the backend pool) to subscribers (the HTTP/SSE server, the
//! backend pool's own reload path). Implements the [`EventBusProvider`]
//! port over a plain `tokio::sync::broadcast` channel — a single-process
//! proxy has no need for DI-framework indirection here.

use aggmcp_domain::error::Result;
use aggmcp_domain::events::{DomainEvent, EventBusProvider};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Default channel capacity. Lagging subscribers drop the oldest events
/// rather than block publishers; config-change events are idempotent to
/// re-derive (a dropped one just means a subscriber re-reads on the next
/// one), so this is an acceptable trade-off.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastEventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Synchronous publish for callers outside an async context, such as
    /// the file-change watcher's callback.
    pub fn publish_sync(&self, event: DomainEvent) {
        let _ = self.sender.send(event);
    }
}

#[async_trait]
impl EventBusProvider for BroadcastEventBus {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        // No subscribers is not an error: a server that hasn't opened its
        // SSE stream yet still wants the watcher running.
        let _ = self.sender.send(event);
        Ok(())
    }
}
