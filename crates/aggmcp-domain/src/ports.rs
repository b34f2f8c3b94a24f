//! Capability-provider port: a single interface implemented by both the
//! Backend Pool (remote provider, over subprocess stdio) and the Context
//! Injector (local provider, synthesized from the workspace directory).
//! `resources/list` and `resources/read` dispatch in the Session Router
//! fall out of composing providers rather than branching on URI prefix at
//! every call site (design note §9).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A source of MCP resources. Tools and prompts remain the Pool's
/// exclusive concern since only backends (never the Context Injector)
/// advertise them.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// List the resources this provider currently advertises.
    async fn list_resources(&self) -> Result<Vec<Value>>;

    /// Read one resource's contents by URI. Returns `Err` if the URI is
    /// not one this provider owns or the read fails.
    async fn read_resource(&self, uri: &str) -> Result<Value>;
}
