//! Loads the `mcpServers`-shaped backend-definition file (spec §6), and
//! filters out soft-disabled entries before handing the list to the
//! Backend Pool.

use std::collections::HashMap;
use std::path::Path;

use aggmcp_domain::backend::{BackendDefinition, LaunchDescriptor};
use aggmcp_domain::error::{Error, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct BackendsFile {
    #[serde(rename = "mcpServers")]
    mcp_servers: HashMap<String, LaunchDescriptor>,
}

/// Read and parse the backend-definition file, returning only the
/// enabled entries (keys not prefixed `_disabled_`) as a stable-ordered
/// list.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be read or is not valid
/// JSON matching the expected shape.
pub fn load_backend_definitions(path: &Path) -> Result<Vec<BackendDefinition>> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("failed to read backend definitions at {}: {e}", path.display()),
        source: Some(Box::new(e)),
    })?;
    parse_backend_definitions(&content)
}

/// Parse backend-definition file content directly (used by the watcher
/// to avoid a double read, and by tests).
///
/// # Errors
///
/// Returns [`Error::Config`] on malformed JSON.
pub fn parse_backend_definitions(content: &str) -> Result<Vec<BackendDefinition>> {
    let file: BackendsFile = serde_json::from_str(content).map_err(|e| Error::Config {
        message: format!("failed to parse backend definitions: {e}"),
        source: Some(Box::new(e)),
    })?;

    // HashMap iteration order is not stable; sort by id for deterministic
    // downstream behavior (profile/backend matching should not depend on
    // hash-map iteration order).
    let mut ids: Vec<_> = file.mcp_servers.into_iter().collect();
    ids.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(ids
        .into_iter()
        .filter(|(id, _)| !BackendDefinition::is_soft_disabled(id))
        .map(|(id, launch)| BackendDefinition { id, launch })
        .collect())
}

/// Write a minimal backend-definition file if none exists yet, so the
/// proxy has something to watch on first run.
pub fn ensure_backend_definitions_file(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let empty = serde_json::json!({ "mcpServers": {} });
    std::fs::write(path, serde_json::to_string_pretty(&empty)?)?;
    Ok(())
}
