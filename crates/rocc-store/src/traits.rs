//! Store trait definitions

use rocc_api::SessionRole;
use rocc_util::{ApplicationId, SessionId};

use crate::{AuditEvent, SessionData, StoreResult};

/// Session datastore.
///
/// Owns the durable lifetime of session records, independent of any
/// in-memory session object.
pub trait SessionDatastore: Send + Sync {
    // Session records

    /// Allocate a fresh record. Fails with `AlreadyExists` if one is present.
    fn create(
        &self,
        role: SessionRole,
        session_id: &SessionId,
        application_id: ApplicationId,
    ) -> StoreResult<SessionData>;

    /// Check whether a record exists
    fn exists(&self, session_id: &SessionId) -> StoreResult<bool>;

    /// Load a record
    fn load(&self, session_id: &SessionId) -> StoreResult<Option<SessionData>>;

    /// Insert or replace a record
    fn save(&self, data: &SessionData) -> StoreResult<()>;

    /// Remove a record (no-op if absent)
    fn remove(&self, session_id: &SessionId) -> StoreResult<()>;

    /// Ids of all stored records
    fn session_ids(&self) -> StoreResult<Vec<SessionId>>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
