//! `AppConfig`: the typed configuration the whole proxy runs from.
//!
//! Fields map directly onto spec §6's environment variables and file
//! locations, plus the ambient additions named in SPEC_FULL.md §10.3.

use std::path::PathBuf;

use aggmcp_domain::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Network and process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Bind host. Loopback by default per spec §4.6.
    pub host: String,
    /// Bind port. `0` asks the OS to assign one (spec §4.6, automated/isolated mode).
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7865,
        }
    }
}

/// Paths to the files the core reads and watches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    /// Directory for persisted diagnostics (`analytics.json`, `usage.json`, …).
    pub data_dir: PathBuf,
    /// The `mcpServers`-shaped backend-definition file.
    pub backends_file: PathBuf,
    /// The profile document.
    pub profiles_file: PathBuf,
    /// Optional directory of extra prompts the Prompt Library loads
    /// alongside its built-in ones. `None` means no on-disk prompts.
    pub prompts_dir: Option<PathBuf>,
}

impl Default for PathsSection {
    fn default() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aggmcp");
        Self {
            backends_file: base.join("mcp_config.json"),
            profiles_file: base.join("profiles.json"),
            data_dir: base,
            prompts_dir: None,
        }
    }
}

/// Session-router tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Idle TTL in seconds before a session is evicted (spec §3: "≈5 minutes").
    pub idle_ttl_secs: u64,
    /// Sweep interval in seconds (spec §4.4: "every minute").
    pub sweep_interval_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

/// Backend-pool request tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    /// Per-request deadline in seconds (spec §4.1: "30-second timeout").
    pub request_timeout_secs: u64,
    /// Grace period after spawn before the handshake begins.
    pub startup_grace_ms: u64,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            startup_grace_ms: 150,
        }
    }
}

/// Result-cache tuning (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    pub max_entries: usize,
    pub default_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            default_ttl_secs: 300,
            sweep_interval_secs: 30,
        }
    }
}

/// Cost-tracker / analytics tuning (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    pub persist_interval_secs: u64,
    pub unused_tool_threshold_days: u32,
    pub history_days: usize,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            persist_interval_secs: 30,
            unused_tool_threshold_days: 30,
            history_days: 30,
        }
    }
}

/// Security sandbox tuning (spec §4.8). Disabled by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    pub enabled: bool,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self { enabled: false }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub paths: PathsSection,
    pub session: SessionSection,
    pub pool: PoolSection,
    pub cache: CacheSection,
    pub telemetry: TelemetrySection,
    pub security: SecuritySection,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            paths: PathsSection::default(),
            session: SessionSection::default(),
            pool: PoolSection::default(),
            cache: CacheSection::default(),
            telemetry: TelemetrySection::default(),
            security: SecuritySection::default(),
            log_level: "info".to_owned(),
        }
    }
}

impl AppConfig {
    /// Validate cross-field and range invariants not expressible in the
    /// type system alone. Failures are named `Error::Config`, never a
    /// panic.
    pub fn validate(&self) -> Result<()> {
        if self.session.idle_ttl_secs == 0 {
            return Err(Error::config("session.idle_ttl_secs must be greater than zero"));
        }
        if self.session.sweep_interval_secs == 0 {
            return Err(Error::config("session.sweep_interval_secs must be greater than zero"));
        }
        if self.pool.request_timeout_secs == 0 {
            return Err(Error::config("pool.request_timeout_secs must be greater than zero"));
        }
        if self.cache.max_entries == 0 && self.cache.enabled {
            return Err(Error::config("cache.max_entries must be greater than zero when the cache is enabled"));
        }
        match self.log_level.as_str() {
            "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(Error::config(format!(
                    "log_level must be one of debug|info|warn|error, got '{other}'"
                )));
            }
        }
        Ok(())
    }
}
