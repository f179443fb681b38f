//! Shared utilities for rocc
//!
//! This crate provides:
//! - ID types (SessionId, ApplicationId)
//! - Error types shared by the session layer
//! - Wall-clock helpers
//! - Default paths for config and data directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
