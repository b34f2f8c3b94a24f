//! Layered configuration loading: compiled-in defaults, an optional TOML
//! file, then `AGGMCP_PROXY_*` environment variables, highest priority
//! last, assembled with `figment`.

use std::path::{Path, PathBuf};

use aggmcp_domain::error::{Error, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;

use crate::app_config::AppConfig;

/// Environment variable prefix, per spec §6.
pub const ENV_PREFIX: &str = "AGGMCP_PROXY_";

/// Load configuration from an optional TOML file plus environment
/// variables, layered over compiled-in defaults, then validate it.
///
/// # Errors
///
/// Returns [`Error::Config`] if the TOML file exists but fails to parse,
/// or if the assembled configuration fails validation.
pub fn load(explicit_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = explicit_path {
        figment = figment.merge(Toml::file(path));
    } else {
        figment = figment.merge(Toml::file("aggmcp.toml"));
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("_"));

    let config: AppConfig = figment
        .extract()
        .map_err(|e| Error::Config {
            message: format!("failed to assemble configuration: {e}"),
            source: None,
        })?;

    config.validate()?;
    Ok(config)
}

/// Load configuration, returning the compiled-in defaults (validated) if
/// no file is present and no overriding environment variables are set.
pub fn load_or_default(explicit_path: Option<&Path>) -> Result<AppConfig> {
    load(explicit_path)
}

/// Resolve the effective path the backend-definition watcher should
/// monitor, honoring `AGGMCP_PROXY_BACKENDS_FILE` if the caller didn't
/// already bake it into `config.paths.backends_file`.
#[must_use]
pub fn backends_file_path(config: &AppConfig) -> PathBuf {
    config.paths.backends_file.clone()
}
