//! Well-known location resolution for the optional TOML config file and
//! the data directory the proxy persists diagnostics under.

use std::path::PathBuf;

use aggmcp_domain::error::Result;

use crate::app_config::AppConfig;

/// Candidate locations for the optional config file, in priority order:
/// current directory first (a project-local override), then the user's
/// XDG config directory.
#[must_use]
pub fn config_file_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from("aggmcp.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join("aggmcp").join("config.toml"));
    }
    candidates
}

/// Resolve the config file to load: an explicitly-provided path wins
/// unconditionally (even if missing, so the caller gets a clear error
/// rather than a silent fallback); otherwise the first existing
/// candidate from [`config_file_candidates`]; otherwise `None`, meaning
/// "run on compiled-in defaults".
#[must_use]
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }
    config_file_candidates().into_iter().find(|p| p.exists())
}

/// Create the configured data directory if it doesn't exist yet.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_data_dir(config: &AppConfig) -> Result<()> {
    std::fs::create_dir_all(&config.paths.data_dir)?;
    Ok(())
}
