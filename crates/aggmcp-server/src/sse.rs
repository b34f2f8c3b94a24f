//! SSE client bookkeeping for `GET /events` (spec §4.6). Each connection
//! gets a server-assigned client id and its own broadcast receiver; the
//! Config Watcher's `config_change` events fan out to every currently
//! connected client with no duplicates and no drops (spec §8: "SSE
//! fan-out").

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashSet;

/// Assigns client ids and tracks which are currently connected, purely
/// for the `/status` SSE-client-count figure — the actual event fan-out
/// is the `tokio::sync::broadcast` channel every client subscribes to
/// directly, so a lagging or dropped client never blocks another.
#[derive(Default)]
pub struct SseClients {
    next_id: AtomicU64,
    connected: DashSet<u64>,
}

impl SseClients {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn connect(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.connected.insert(id);
        id
    }

    pub fn disconnect(&self, id: u64) {
        self.connected.remove(&id);
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.connected.len()
    }
}

pub type SharedSseClients = Arc<SseClients>;
