//! Validated settings structures

use crate::schema::{RawConfig, RawNodeConfig, RawRoConfig};
use crate::validation::{StoreKind, parse_store_kind};
use rocc_api::FailureHandling;
use rocc_util::{ApplicationId, default_data_dir, doubled, seconds};
use std::path::PathBuf;
use std::time::Duration;

/// Default validity time when neither the answer nor the config sets one
pub const DEFAULT_VALIDITY_TIME: Duration = Duration::from_secs(60);

/// Default Tx timer
pub const DEFAULT_TX_TIMER: Duration = Duration::from_secs(30);

/// Validated settings ready for use by the session factory
#[derive(Debug, Clone)]
pub struct Settings {
    pub node: NodeConfig,
    pub ro: RoDefaults,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            node: NodeConfig::from_raw(raw.node),
            ro: RoDefaults::from_raw(raw.ro),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            node: NodeConfig::from_raw(RawNodeConfig::default()),
            ro: RoDefaults::default(),
        }
    }
}

/// Local node identity and storage
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub origin_host: String,
    pub origin_realm: String,
    pub data_dir: PathBuf,
    pub store: StoreKind,
}

impl NodeConfig {
    fn from_raw(raw: RawNodeConfig) -> Self {
        Self {
            origin_host: raw.origin_host.unwrap_or_else(|| "rocc.localdomain".into()),
            origin_realm: raw.origin_realm.unwrap_or_else(|| "localdomain".into()),
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            store: raw
                .store
                .as_deref()
                .and_then(parse_store_kind)
                .unwrap_or(StoreKind::Sqlite),
        }
    }

    /// SQLite database file inside the data directory
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("sessions.db")
    }
}

/// Statically configured Ro defaults, consulted whenever a session has not
/// received a value from its peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoDefaults {
    pub application_ids: Vec<ApplicationId>,
    pub credit_control_failure_handling: FailureHandling,
    pub direct_debiting_failure_handling: FailureHandling,
    pub validity_time: Duration,
    pub tx_timer: Duration,
    /// None means "twice the validity time"
    pub supervision_timeout: Option<Duration>,
}

impl Default for RoDefaults {
    fn default() -> Self {
        Self {
            application_ids: vec![ApplicationId::CREDIT_CONTROL],
            credit_control_failure_handling: FailureHandling::Terminate,
            direct_debiting_failure_handling: FailureHandling::Terminate,
            validity_time: DEFAULT_VALIDITY_TIME,
            tx_timer: DEFAULT_TX_TIMER,
            supervision_timeout: None,
        }
    }
}

impl RoDefaults {
    fn from_raw(raw: RawRoConfig) -> Self {
        let defaults = Self::default();

        Self {
            application_ids: raw
                .application_ids
                .map(|ids| ids.into_iter().map(ApplicationId::new).collect())
                .unwrap_or(defaults.application_ids),
            credit_control_failure_handling: raw
                .credit_control_failure_handling
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.credit_control_failure_handling),
            direct_debiting_failure_handling: raw
                .direct_debiting_failure_handling
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.direct_debiting_failure_handling),
            validity_time: raw
                .validity_time_seconds
                .map(seconds)
                .unwrap_or(defaults.validity_time),
            tx_timer: raw.tx_timer_seconds.map(seconds).unwrap_or(defaults.tx_timer),
            supervision_timeout: raw.supervision_timeout_seconds.map(seconds),
        }
    }

    pub fn supports(&self, application_id: ApplicationId) -> bool {
        self.application_ids.contains(&application_id)
    }

    /// Supervision duration for a session whose last answer carried
    /// `validity` (if any). A zero validity falls back to the default.
    pub fn supervision_for(&self, validity: Option<Duration>) -> Duration {
        let validity = validity
            .filter(|v| !v.is_zero())
            .unwrap_or(self.validity_time);
        self.supervision_timeout.unwrap_or_else(|| doubled(validity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_credit_control_conventions() {
        let defaults = RoDefaults::default();
        assert_eq!(defaults.credit_control_failure_handling, FailureHandling::Terminate);
        assert_eq!(defaults.direct_debiting_failure_handling, FailureHandling::Terminate);
        assert_eq!(defaults.validity_time, Duration::from_secs(60));
        assert_eq!(defaults.tx_timer, Duration::from_secs(30));
        assert!(defaults.supports(ApplicationId::CREDIT_CONTROL));
        assert!(!defaults.supports(ApplicationId::new(16777238)));
    }

    #[test]
    fn supervision_prefers_configured_timeout() {
        let mut defaults = RoDefaults::default();
        assert_eq!(defaults.supervision_for(None), Duration::from_secs(120));
        assert_eq!(
            defaults.supervision_for(Some(Duration::from_secs(10))),
            Duration::from_secs(20)
        );

        assert_eq!(
            defaults.supervision_for(Some(Duration::ZERO)),
            Duration::from_secs(120)
        );

        defaults.supervision_timeout = Some(Duration::from_secs(30));
        assert_eq!(
            defaults.supervision_for(Some(Duration::from_secs(10))),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn from_raw_applies_overrides() {
        let raw = RawRoConfig {
            credit_control_failure_handling: Some("continue".into()),
            tx_timer_seconds: Some(5),
            application_ids: Some(vec![4, 16777238]),
            ..Default::default()
        };

        let ro = RoDefaults::from_raw(raw);
        assert_eq!(ro.credit_control_failure_handling, FailureHandling::Continue);
        assert_eq!(ro.tx_timer, Duration::from_secs(5));
        assert_eq!(ro.application_ids.len(), 2);
        assert_eq!(ro.validity_time, DEFAULT_VALIDITY_TIME);
    }
}
