//! Persisted session data record

use chrono::{DateTime, Local};
use rocc_api::{FailureHandling, Message, SessionRole, SessionState};
use rocc_util::{ApplicationId, SessionId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything a session needs to be reconstructed after a restart.
///
/// The state machines read and write this record; the in-memory session
/// object is only a driver around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub session_id: SessionId,
    pub application_id: ApplicationId,
    pub state: SessionState,

    /// Last Credit-Control-Failure-Handling received from the peer
    #[serde(default)]
    pub ccfh: Option<FailureHandling>,

    /// Last Direct-Debiting-Failure-Handling received from the peer
    #[serde(default)]
    pub ddfh: Option<FailureHandling>,

    /// The dialogue is an event-based direct debiting exchange
    #[serde(default)]
    pub direct_debiting: bool,

    /// Outstanding credit-control request (sent by a client, received by a server)
    #[serde(default)]
    pub pending_request: Option<Message>,

    /// The outstanding request has already been re-sent once
    #[serde(default)]
    pub retransmitted: bool,

    /// Outstanding Re-Auth-Request (server side)
    #[serde(default)]
    pub pending_rar: Option<Message>,

    /// Validity-Time from the most recent successful answer
    #[serde(default)]
    pub validity_time: Option<Duration>,

    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
}

impl SessionData {
    pub fn new(role: SessionRole, session_id: SessionId, application_id: ApplicationId) -> Self {
        let now = rocc_util::now();
        Self {
            session_id,
            application_id,
            state: SessionState::initial(role),
            ccfh: None,
            ddfh: None,
            direct_debiting: false,
            pending_request: None,
            retransmitted: false,
            pending_rar: None,
            validity_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn role(&self) -> SessionRole {
        self.state.role()
    }

    /// Bump `updated_at`
    pub fn touch(&mut self) {
        self.updated_at = rocc_util::now();
    }
}
