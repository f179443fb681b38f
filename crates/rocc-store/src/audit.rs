//! Audit event types

use chrono::{DateTime, Local};
use rocc_api::{SessionRole, SessionState};
use rocc_util::{ApplicationId, SessionId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Session created by the factory
    SessionCreated {
        session_id: SessionId,
        role: SessionRole,
        application_id: ApplicationId,
    },

    /// Session re-hydrated from its persisted record
    SessionRestored {
        session_id: SessionId,
        state: SessionState,
    },

    /// FSM transition
    StateChanged {
        session_id: SessionId,
        from: SessionState,
        to: SessionState,
    },

    /// Failure handling granted continued service
    AccessGranted { session_id: SessionId, reason: String },

    /// Failure handling denied service
    AccessDenied { session_id: SessionId, reason: String },

    /// Session released and removed from routing
    SessionReleased {
        session_id: SessionId,
        final_state: SessionState,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: rocc_util::now(),
            event,
        }
    }
}
