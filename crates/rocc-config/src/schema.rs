//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Local Diameter node identity and storage
    #[serde(default)]
    pub node: RawNodeConfig,

    /// Ro session defaults
    #[serde(default)]
    pub ro: RawRoConfig,
}

/// Node-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawNodeConfig {
    /// Origin-Host, also the prefix of generated Session-Ids
    pub origin_host: Option<String>,

    /// Origin-Realm
    pub origin_realm: Option<String>,

    /// Data directory for the session store
    pub data_dir: Option<PathBuf>,

    /// Session store backend: "sqlite" (default) or "memory"
    pub store: Option<String>,
}

/// Ro application settings. Every field falls back to a built-in default.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRoConfig {
    /// Supported Auth-Application-Ids (default: [4])
    pub application_ids: Option<Vec<u32>>,

    /// Default Credit-Control-Failure-Handling:
    /// "terminate", "continue" or "retry_and_terminate"
    pub credit_control_failure_handling: Option<String>,

    /// Default Direct-Debiting-Failure-Handling: "terminate" or "continue"
    pub direct_debiting_failure_handling: Option<String>,

    /// Validity time used when an answer carries none (seconds)
    pub validity_time_seconds: Option<u64>,

    /// Tx timer: how long a client waits for an answer (seconds)
    pub tx_timer_seconds: Option<u64>,

    /// Server supervision (Tcc) timeout (seconds).
    /// When unset, twice the validity time is used.
    pub supervision_timeout_seconds: Option<u64>,
}
