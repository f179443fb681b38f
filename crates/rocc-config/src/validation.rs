//! Configuration validation

use crate::schema::{RawConfig, RawNodeConfig, RawRoConfig};
use rocc_api::FailureHandling;
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("node: {0}")]
    NodeError(String),

    #[error("Invalid failure handling '{value}' for {field}")]
    InvalidFailureHandling { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("Duplicate application id: {0}")]
    DuplicateApplicationId(u32),

    #[error("At least one application id must be configured")]
    NoApplicationIds,

    #[error("Unknown store backend '{0}' (expected \"sqlite\" or \"memory\")")]
    UnknownStore(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = validate_node(&config.node);
    errors.extend(validate_ro(&config.ro));
    errors
}

fn validate_node(node: &RawNodeConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(host) = &node.origin_host
        && (host.is_empty() || host.contains(';'))
    {
        errors.push(ValidationError::NodeError(format!(
            "origin_host '{}' must be non-empty and must not contain ';'",
            host
        )));
    }

    if let Some(store) = &node.store
        && parse_store_kind(store).is_none()
    {
        errors.push(ValidationError::UnknownStore(store.clone()));
    }

    errors
}

fn validate_ro(ro: &RawRoConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(ids) = &ro.application_ids {
        if ids.is_empty() {
            errors.push(ValidationError::NoApplicationIds);
        }
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                errors.push(ValidationError::DuplicateApplicationId(*id));
            }
        }
    }

    if let Some(value) = &ro.credit_control_failure_handling
        && value.parse::<FailureHandling>().is_err()
    {
        errors.push(ValidationError::InvalidFailureHandling {
            field: "credit_control_failure_handling",
            value: value.clone(),
        });
    }

    // DDFH only knows TERMINATE_OR_BUFFER and CONTINUE
    if let Some(value) = &ro.direct_debiting_failure_handling
        && !matches!(
            value.parse::<FailureHandling>(),
            Ok(FailureHandling::Terminate | FailureHandling::Continue)
        )
    {
        errors.push(ValidationError::InvalidFailureHandling {
            field: "direct_debiting_failure_handling",
            value: value.clone(),
        });
    }

    for (field, value) in [
        ("validity_time_seconds", ro.validity_time_seconds),
        ("tx_timer_seconds", ro.tx_timer_seconds),
        ("supervision_timeout_seconds", ro.supervision_timeout_seconds),
    ] {
        if value == Some(0) {
            errors.push(ValidationError::ZeroDuration { field });
        }
    }

    errors
}

/// Session store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Memory,
}

pub fn parse_store_kind(s: &str) -> Option<StoreKind> {
    match s.to_lowercase().as_str() {
        "sqlite" => Some(StoreKind::Sqlite),
        "memory" | "in_memory" => Some(StoreKind::Memory),
        _ => None,
    }
}
