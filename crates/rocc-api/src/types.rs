//! Shared types for the Ro session layer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which side of the charging dialogue a session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    /// Credit-control client (CTF / access device)
    Client,
    /// Credit-control server (OCS / charging function)
    Server,
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionRole::Client => write!(f, "client"),
            SessionRole::Server => write!(f, "server"),
        }
    }
}

/// Client session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    Idle,
    /// CCR-Initial sent, Tx armed
    PendingInitial,
    /// CCR-Event sent, Tx armed
    PendingEvent,
    /// Quota granted, Validity armed
    Open,
    /// CCR-Update sent, Tx armed
    PendingUpdate,
    /// CCR-Termination sent, Tx armed
    PendingTermination,
    /// Absorbing; the session has been released
    Terminated,
}

impl ClientState {
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ClientState::PendingInitial
                | ClientState::PendingEvent
                | ClientState::PendingUpdate
                | ClientState::PendingTermination
        )
    }
}

/// Server session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Idle,
    /// Initial request answered successfully, Supervision armed
    Open,
    /// Absorbing; the session has been released
    Terminated,
}

/// State of either role, as persisted in the session record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "state", rename_all = "snake_case")]
pub enum SessionState {
    Client(ClientState),
    Server(ServerState),
}

impl SessionState {
    pub fn initial(role: SessionRole) -> Self {
        match role {
            SessionRole::Client => SessionState::Client(ClientState::Idle),
            SessionRole::Server => SessionState::Server(ServerState::Idle),
        }
    }

    pub fn role(&self) -> SessionRole {
        match self {
            SessionState::Client(_) => SessionRole::Client,
            SessionState::Server(_) => SessionRole::Server,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(
            self,
            SessionState::Client(ClientState::Terminated)
                | SessionState::Server(ServerState::Terminated)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Client(s) => write!(f, "client:{:?}", s),
            SessionState::Server(s) => write!(f, "server:{:?}", s),
        }
    }
}

/// Failure-handling policy code (CCFH, and DDFH mapped onto it)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureHandling {
    Terminate,
    Continue,
    RetryAndTerminate,
}

impl FailureHandling {
    /// Credit-Control-Failure-Handling AVP value
    pub fn from_ccfh(value: u32) -> Option<Self> {
        match value {
            0 => Some(FailureHandling::Terminate),
            1 => Some(FailureHandling::Continue),
            2 => Some(FailureHandling::RetryAndTerminate),
            _ => None,
        }
    }

    /// Direct-Debiting-Failure-Handling AVP value.
    /// TERMINATE_OR_BUFFER is treated as Terminate; buffering is not offered.
    pub fn from_ddfh(value: u32) -> Option<Self> {
        match value {
            0 => Some(FailureHandling::Terminate),
            1 => Some(FailureHandling::Continue),
            _ => None,
        }
    }

    pub fn ccfh_value(&self) -> u32 {
        match self {
            FailureHandling::Terminate => 0,
            FailureHandling::Continue => 1,
            FailureHandling::RetryAndTerminate => 2,
        }
    }
}

/// Error parsing a textual enum value
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {kind} '{value}'")]
pub struct ParseValueError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for FailureHandling {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "terminate" | "terminate_or_buffer" => Ok(FailureHandling::Terminate),
            "continue" => Ok(FailureHandling::Continue),
            "retry_and_terminate" => Ok(FailureHandling::RetryAndTerminate),
            _ => Err(ParseValueError {
                kind: "failure handling",
                value: s.to_string(),
            }),
        }
    }
}

/// CC-Request-Type values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CcRequestType {
    Initial,
    Update,
    Termination,
    Event,
}

impl CcRequestType {
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            1 => Some(CcRequestType::Initial),
            2 => Some(CcRequestType::Update),
            3 => Some(CcRequestType::Termination),
            4 => Some(CcRequestType::Event),
            _ => None,
        }
    }

    pub fn value(&self) -> u32 {
        match self {
            CcRequestType::Initial => 1,
            CcRequestType::Update => 2,
            CcRequestType::Termination => 3,
            CcRequestType::Event => 4,
        }
    }
}

/// Requested-Action values (event requests only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedAction {
    DirectDebiting,
    RefundAccount,
    CheckBalance,
    PriceEnquiry,
}

impl RequestedAction {
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            0 => Some(RequestedAction::DirectDebiting),
            1 => Some(RequestedAction::RefundAccount),
            2 => Some(RequestedAction::CheckBalance),
            3 => Some(RequestedAction::PriceEnquiry),
            _ => None,
        }
    }
}
