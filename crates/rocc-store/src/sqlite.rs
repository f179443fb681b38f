//! SQLite-based store implementation

use chrono::{DateTime, Local};
use rocc_api::SessionRole;
use rocc_util::{ApplicationId, SessionId};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AuditEvent, SessionData, SessionDatastore, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Session records, one row per session-id
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                role TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                data_json TEXT NOT NULL
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

impl SessionDatastore for SqliteStore {
    fn create(
        &self,
        role: SessionRole,
        session_id: &SessionId,
        application_id: ApplicationId,
    ) -> StoreResult<SessionData> {
        let conn = self.lock()?;
        let data = SessionData::new(role, session_id.clone(), application_id);
        let json = serde_json::to_string(&data)?;

        let inserted = conn.execute(
            r#"
            INSERT INTO sessions (session_id, role, updated_at, data_json)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id) DO NOTHING
            "#,
            params![
                session_id.as_str(),
                role.to_string(),
                data.updated_at.to_rfc3339(),
                json
            ],
        )?;

        if inserted == 0 {
            return Err(StoreError::AlreadyExists(session_id.clone()));
        }

        debug!(session_id = %session_id, role = %role, "Session record created");
        Ok(data)
    }

    fn exists(&self, session_id: &SessionId) -> StoreResult<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sessions WHERE session_id = ?",
                [session_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn load(&self, session_id: &SessionId) -> StoreResult<Option<SessionData>> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT data_json FROM sessions WHERE session_id = ?",
                [session_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn save(&self, data: &SessionData) -> StoreResult<()> {
        let conn = self.lock()?;
        let json = serde_json::to_string(data)?;

        conn.execute(
            r#"
            INSERT INTO sessions (session_id, role, updated_at, data_json)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id)
            DO UPDATE SET updated_at = excluded.updated_at, data_json = excluded.data_json
            "#,
            params![
                data.session_id.as_str(),
                data.role().to_string(),
                data.updated_at.to_rfc3339(),
                json
            ],
        )?;

        debug!(session_id = %data.session_id, state = %data.state, "Session record saved");
        Ok(())
    }

    fn remove(&self, session_id: &SessionId) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM sessions WHERE session_id = ?",
            [session_id.as_str()],
        )?;
        Ok(())
    }

    fn session_ids(&self) -> StoreResult<Vec<SessionId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT session_id FROM sessions ORDER BY session_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(SessionId::new(row?));
        }
        Ok(ids)
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.lock()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| rocc_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
