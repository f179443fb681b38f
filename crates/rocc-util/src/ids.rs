//! Strongly-typed identifiers for rocc

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Diameter Session-Id
///
/// Session-Ids are opaque UTF-8 strings on the wire. Generated ids follow the
/// `<DiameterIdentity>;<high>;<low>` layout, with a UUID as the low part so
/// they stay unique across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh globally unique id for the given origin host
    pub fn generate(origin_host: &str) -> Self {
        let high = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self(format!("{};{};{}", origin_host, high, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Diameter application identifier (Auth-Application-Id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(u32);

impl ApplicationId {
    /// Diameter Credit-Control application (RFC 4006), used by Ro and Gy
    pub const CREDIT_CONTROL: ApplicationId = ApplicationId(4);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self::CREDIT_CONTROL
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
