//! Error types for rocc

use thiserror::Error;

use crate::{ApplicationId, SessionId};

/// Core error type for session layer operations
#[derive(Debug, Error)]
pub enum RoError {
    #[error("Unsupported session role: {0}")]
    UnsupportedRole(String),

    #[error("Unsupported application: {0}")]
    UnsupportedApplication(ApplicationId),

    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Session already exists: {0}")]
    AlreadyExists(SessionId),

    #[error("Illegal state: cannot handle {event} in state {state}")]
    IllegalState { state: String, event: String },

    #[error("Route failure: {0}")]
    RouteFailure(String),

    #[error("Overload failure: {0}")]
    OverloadFailure(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal failure: {0}")]
    InternalFailure(String),
}

impl RoError {
    pub fn illegal_state(state: impl std::fmt::Debug, event: impl Into<String>) -> Self {
        Self::IllegalState {
            state: format!("{:?}", state),
            event: event.into(),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalFailure(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RoError>;
