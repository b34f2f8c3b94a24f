//! Backend definitions and runtime status, per the data model's "Backend
//! Definition" / "Backend Instance" split: definitions are read from the
//! watched config file and never mutated by the core; instances are
//! runtime state exclusively owned by the Backend Pool.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The `::` separator reserved for namespaced identifiers. Backend ids may
/// not contain it.
pub const NAMESPACE_SEPARATOR: &str = "::";

/// Prefix writers use to soft-disable a backend without deleting its
/// launch config.
pub const DISABLED_PREFIX: &str = "_disabled_";

/// How to reach a single backend: a local subprocess or a remote
/// HTTP-based server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum LaunchDescriptor {
    /// Spawn a local subprocess and speak line-delimited JSON-RPC over its
    /// stdio.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Connect to an already-running MCP server over HTTP.
    Remote { url: String, transport: String },
}

/// A single entry from the `mcpServers` map in the backend-definition
/// file. Immutable once loaded; reloaded wholesale on config change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendDefinition {
    pub id: String,
    #[serde(flatten)]
    pub launch: LaunchDescriptor,
}

impl BackendDefinition {
    /// Returns true if `id` uses the soft-disable convention
    /// (`_disabled_<id>`).
    #[must_use]
    pub fn is_soft_disabled(id: &str) -> bool {
        id.starts_with(DISABLED_PREFIX)
    }
}

/// Lifecycle state of a single backend instance, per the state machine in
/// spec §4.1:
/// `disconnected --connect()--> connecting --initialize ok--> connected`;
/// `connecting --initialize fail--> error`; `connected --exit-->
/// disconnected`; `connected --error--> error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl Default for BackendStatus {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// A tool, resource or prompt advertised by a backend, before namespacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCapability {
    /// Tool/prompt name, or resource URI.
    pub key: String,
    /// Full JSON shape as advertised by the backend (schema, description,
    /// MIME type, …), passed through unmodified aside from the namespaced
    /// key rewrite applied at aggregation time.
    pub payload: serde_json::Value,
}

/// Split a namespaced identifier `<backend-id>::<rest>` into its parts.
///
/// Returns `None` if there is no `::` separator. `workspace://` resources
/// bypass namespacing entirely and are never passed to this function by
/// callers that first check for that scheme.
#[must_use]
pub fn split_namespaced(value: &str) -> Option<(&str, &str)> {
    value.split_once(NAMESPACE_SEPARATOR)
}

/// Join a backend id and original name/uri into a namespaced identifier.
#[must_use]
pub fn join_namespaced(backend_id: &str, rest: &str) -> String {
    format!("{backend_id}{NAMESPACE_SEPARATOR}{rest}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_separator_only() {
        let (id, rest) = split_namespaced("server-git::git::status").unwrap();
        assert_eq!(id, "server-git");
        assert_eq!(rest, "git::status");
    }

    #[test]
    fn no_separator_is_none() {
        assert_eq!(split_namespaced("bare_tool"), None);
    }

    #[test]
    fn join_then_split_round_trips() {
        let joined = join_namespaced("server-git", "git_status");
        assert_eq!(split_namespaced(&joined), Some(("server-git", "git_status")));
    }

    #[test]
    fn soft_disabled_prefix_detected() {
        assert!(BackendDefinition::is_soft_disabled("_disabled_firebase-mcp"));
        assert!(!BackendDefinition::is_soft_disabled("firebase-mcp"));
    }
}
