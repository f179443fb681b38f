//! Session datastore for rocc
//!
//! Provides:
//! - Session data records (survive restarts, re-hydrated on lookup)
//! - Audit log (append-only)
//! - SQLite and in-memory implementations

mod audit;
mod memory;
mod record;
mod sqlite;
mod traits;

pub use audit::*;
pub use memory::*;
pub use record::*;
pub use sqlite::*;
pub use traits::*;

use rocc_util::{RoError, SessionId};
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session record not found: {0}")]
    NotFound(SessionId),

    #[error("Session record already exists: {0}")]
    AlreadyExists(SessionId),

    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for RoError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => RoError::NotFound(id),
            StoreError::AlreadyExists(id) => RoError::AlreadyExists(id),
            other => RoError::store(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
