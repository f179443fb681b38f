//! Default paths for rocc components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/rocc/config.toml` or `~/.config/rocc/config.toml`
//! - Data: `$XDG_DATA_HOME/rocc` or `~/.local/share/rocc`

use std::path::PathBuf;
use tracing::debug;

/// Environment variable for overriding the config file path
pub const ROCC_CONFIG_ENV: &str = "ROCC_CONFIG";

/// Environment variable for overriding the data directory
pub const ROCC_DATA_DIR_ENV: &str = "ROCC_DATA_DIR";

/// Application subdirectory name
const APP_DIR: &str = "rocc";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$ROCC_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/rocc/config.toml` (if XDG_CONFIG_HOME is set)
/// 3. `~/.config/rocc/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(ROCC_CONFIG_ENV) {
        debug!(path = %path, "Config path overridden by {}", ROCC_CONFIG_ENV);
        return PathBuf::from(path);
    }

    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join("config.toml");
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml");
    }

    PathBuf::from("/etc").join(APP_DIR).join("config.toml")
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$ROCC_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/rocc` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/rocc` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(ROCC_DATA_DIR_ENV) {
        debug!(path = %path, "Data directory overridden by {}", ROCC_DATA_DIR_ENV);
        return PathBuf::from(path);
    }

    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    let fallback = PathBuf::from("/tmp").join(APP_DIR).join("data");
    debug!(path = %fallback.display(), "No HOME or XDG_DATA_HOME, using temporary data directory");
    fallback
}
