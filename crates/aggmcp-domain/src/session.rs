//! Workspace Session: per-workspace binding of profile, enabled backend
//! set and a synthesized context, identified by a stable workspace id.

use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

/// Default idle TTL after which a session is evicted by the background
/// sweep (spec §3: "idle TTL (≈5 minutes)").
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(5 * 60);

/// Interval between background sweeps (spec §4.4: "every minute").
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Derive the stable workspace id used as the session table key from an
/// absolute workspace path. A SHA-256 digest, hex-encoded, so that the
/// same path always yields the same id across restarts without leaking
/// the raw path into logs or metrics keys.
#[must_use]
pub fn workspace_id_for_path(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hex::encode(hasher.finalize())
}

/// Per-workspace session state. Owned exclusively by the Session Router.
#[derive(Debug, Clone)]
pub struct WorkspaceSession {
    pub workspace_id: String,
    pub workspace_path: String,
    pub profile_name: String,
    pub enabled_backends: Vec<String>,
    pub last_activity: Instant,
}

impl WorkspaceSession {
    #[must_use]
    pub fn new(workspace_path: String, profile_name: String, enabled_backends: Vec<String>) -> Self {
        let workspace_id = workspace_id_for_path(&workspace_path);
        Self {
            workspace_id,
            workspace_path,
            profile_name,
            enabled_backends,
            last_activity: Instant::now(),
        }
    }

    /// Bump the last-activity timestamp; called on every dispatched
    /// request.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Whether this session has been idle for longer than `ttl`.
    #[must_use]
    pub fn is_idle(&self, ttl: Duration) -> bool {
        self.last_activity.elapsed() >= ttl
    }
}
