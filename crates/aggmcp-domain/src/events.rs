//! Domain events published by the Config Watcher and consumed by the
//! Backend Pool and the HTTP/SSE server. Decouples "something changed"
//! from "who needs to react" behind a small publish/subscribe port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Events the core publishes internally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// The watched backend-definition file changed and was re-read.
    BackendConfigChanged { at: DateTime<Utc> },
    /// The profile document changed and was re-read.
    ProfilesChanged { at: DateTime<Utc> },
    /// A backend instance transitioned state.
    BackendStatusChanged {
        backend_id: String,
        status: crate::backend::BackendStatus,
    },
}

/// Publish/subscribe port for domain events. Implemented over a
/// `tokio::sync::broadcast` channel by the infrastructure crate.
#[async_trait]
pub trait EventBusProvider: Send + Sync {
    /// Publish an event to all current subscribers. Never fails loudly —
    /// "no subscribers" is not an error condition.
    async fn publish(&self, event: DomainEvent) -> Result<()>;
}
