//! In-memory store implementation

use rocc_api::SessionRole;
use rocc_util::{ApplicationId, SessionId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::{AuditEvent, SessionData, SessionDatastore, StoreError, StoreResult};

/// Audit entries kept by default; older ones are dropped
pub const DEFAULT_AUDIT_CAPACITY: usize = 1024;

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, SessionData>,
    audits: VecDeque<AuditEvent>,
    next_audit_id: i64,
}

/// Volatile store. Records live as long as the store does; the audit log is
/// a ring holding the most recent entries.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    audit_capacity: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_audit_capacity(DEFAULT_AUDIT_CAPACITY)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_audit_capacity(audit_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            audit_capacity: audit_capacity.max(1),
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl SessionDatastore for MemoryStore {
    fn create(
        &self,
        role: SessionRole,
        session_id: &SessionId,
        application_id: ApplicationId,
    ) -> StoreResult<SessionData> {
        let mut inner = self.lock()?;
        if inner.sessions.contains_key(session_id) {
            return Err(StoreError::AlreadyExists(session_id.clone()));
        }

        let data = SessionData::new(role, session_id.clone(), application_id);
        inner.sessions.insert(session_id.clone(), data.clone());
        debug!(session_id = %session_id, role = %role, "Session record created");
        Ok(data)
    }

    fn exists(&self, session_id: &SessionId) -> StoreResult<bool> {
        Ok(self.lock()?.sessions.contains_key(session_id))
    }

    fn load(&self, session_id: &SessionId) -> StoreResult<Option<SessionData>> {
        Ok(self.lock()?.sessions.get(session_id).cloned())
    }

    fn save(&self, data: &SessionData) -> StoreResult<()> {
        self.lock()?
            .sessions
            .insert(data.session_id.clone(), data.clone());
        Ok(())
    }

    fn remove(&self, session_id: &SessionId) -> StoreResult<()> {
        self.lock()?.sessions.remove(session_id);
        Ok(())
    }

    fn session_ids(&self) -> StoreResult<Vec<SessionId>> {
        Ok(self.lock()?.sessions.keys().cloned().collect())
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.next_audit_id += 1;
        event.id = inner.next_audit_id;
        if inner.audits.len() == self.audit_capacity {
            inner.audits.pop_front();
        }
        inner.audits.push_back(event);
        Ok(())
    }

    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        Ok(self.lock()?.audits.iter().rev().take(limit).cloned().collect())
    }

    fn is_healthy(&self) -> bool {
        self.inner.lock().is_ok()
    }
}
