//! Configuration file resolution and loading
//!
//! Config file priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. OS config directory (`<config_dir>/coach/<file_name>`) if it exists
//! 4. None: caller uses built-in defaults

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Resolve which TOML file (if any) to load
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: OS config directory, only when present
    default_config_path(file_name).filter(|path| path.exists())
}

/// `<config_dir>/coach/<file_name>` for the platform
pub fn default_config_path(file_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("coach").join(file_name))
}

/// Load a TOML config, or defaults when no file was resolved
///
/// An explicitly resolved path that cannot be read is an error.
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        tracing::info!("No configuration file found, using built-in defaults");
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    tracing::info!(path = %path.display(), "Loaded TOML configuration");
    Ok(config)
}
