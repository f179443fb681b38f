//! Listener and context callbacks
//!
//! Applications observe sessions through these traits. Every method has a
//! default body that only logs, so an implementation overrides just what it
//! cares about. Callbacks run on the session task after the transition has
//! been committed; an `Err` is logged and never undoes the transition.
//!
//! Callbacks are synchronous. To drive the session from a callback (answer a
//! request, send an update), spawn a task that calls the session handle.

use rocc_api::{
    CreditControlAnswer, CreditControlRequest, Message, ReAuthAnswer, ReAuthRequest,
    SessionState,
};
use rocc_transport_api::TransportError;
use rocc_util::SessionId;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::{ClientRoSession, DefaultMessageFactory, RoMessageFactory, ServerRoSession};

/// Error reported by a listener callback
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl From<String> for ListenerError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ListenerError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

pub type ListenerResult = Result<(), ListenerError>;

/// Application events on client sessions
pub trait ClientSessionListener: Send + Sync {
    fn do_credit_control_answer(
        &self,
        session: &ClientRoSession,
        request: &CreditControlRequest,
        answer: &CreditControlAnswer,
    ) -> ListenerResult {
        debug!(
            session_id = %session.session_id(),
            request_type = ?request.request_type(),
            result_code = ?answer.result_code(),
            "CCA received"
        );
        Ok(())
    }

    fn do_re_auth_request(
        &self,
        session: &ClientRoSession,
        _request: &ReAuthRequest,
    ) -> ListenerResult {
        debug!(session_id = %session.session_id(), "RAR received");
        Ok(())
    }

    fn do_other_event(&self, session: &ClientRoSession, message: &Message) -> ListenerResult {
        debug!(
            session_id = %session.session_id(),
            command_code = message.command_code,
            "Other event received"
        );
        Ok(())
    }

    fn do_send_error(
        &self,
        session: &ClientRoSession,
        request: &Message,
        error: &TransportError,
    ) -> ListenerResult {
        debug!(
            session_id = %session.session_id(),
            command_code = request.command_code,
            error = %error,
            "Send failed"
        );
        Ok(())
    }
}

/// Application events on server sessions
pub trait ServerSessionListener: Send + Sync {
    fn do_credit_control_request(
        &self,
        session: &ServerRoSession,
        request: &CreditControlRequest,
    ) -> ListenerResult {
        debug!(
            session_id = %session.session_id(),
            request_type = ?request.request_type(),
            "CCR received"
        );
        Ok(())
    }

    fn do_re_auth_answer(
        &self,
        session: &ServerRoSession,
        _request: &ReAuthRequest,
        answer: &ReAuthAnswer,
    ) -> ListenerResult {
        debug!(
            session_id = %session.session_id(),
            result_code = ?answer.result_code(),
            "RAA received"
        );
        Ok(())
    }

    fn do_other_event(&self, session: &ServerRoSession, message: &Message) -> ListenerResult {
        debug!(
            session_id = %session.session_id(),
            command_code = message.command_code,
            "Other event received"
        );
        Ok(())
    }
}

/// State transitions of any session
pub trait StateChangeListener: Send + Sync {
    fn state_changed(
        &self,
        session_id: &SessionId,
        old: SessionState,
        new: SessionState,
    ) -> ListenerResult {
        debug!(session_id = %session_id, old = %old, new = %new, "State changed");
        Ok(())
    }
}

/// Failure-handling outcomes and timer events on client sessions
pub trait ClientSessionContext: Send + Sync {
    fn tx_timer_expired(&self, session: &ClientRoSession) -> ListenerResult {
        debug!(session_id = %session.session_id(), "Tx timer expired");
        Ok(())
    }

    fn grant_access_on_deliver_failure(
        &self,
        session: &ClientRoSession,
        _request: &Message,
    ) -> ListenerResult {
        info!(session_id = %session.session_id(), "Access granted after delivery failure");
        Ok(())
    }

    fn deny_access_on_deliver_failure(
        &self,
        session: &ClientRoSession,
        _request: &Message,
    ) -> ListenerResult {
        info!(session_id = %session.session_id(), "Access denied after delivery failure");
        Ok(())
    }

    fn grant_access_on_tx_expire(&self, session: &ClientRoSession) -> ListenerResult {
        info!(session_id = %session.session_id(), "Access granted after Tx expiry");
        Ok(())
    }

    fn deny_access_on_tx_expire(&self, session: &ClientRoSession) -> ListenerResult {
        info!(session_id = %session.session_id(), "Access denied after Tx expiry");
        Ok(())
    }

    fn grant_access_on_failure_message(&self, session: &ClientRoSession) -> ListenerResult {
        info!(session_id = %session.session_id(), "Access granted after failure answer");
        Ok(())
    }

    fn deny_access_on_failure_message(&self, session: &ClientRoSession) -> ListenerResult {
        info!(session_id = %session.session_id(), "Access denied after failure answer");
        Ok(())
    }

    fn grant_access_on_validity_expire(&self, session: &ClientRoSession) -> ListenerResult {
        info!(session_id = %session.session_id(), "Access granted after validity expiry");
        Ok(())
    }

    fn deny_access_on_validity_expire(&self, session: &ClientRoSession) -> ListenerResult {
        info!(session_id = %session.session_id(), "Access denied after validity expiry");
        Ok(())
    }

    fn indicate_service_error(&self, session: &ClientRoSession) -> ListenerResult {
        info!(session_id = %session.session_id(), "Service error");
        Ok(())
    }

    /// Request to send when granted quota runs out. `None` lets failure
    /// handling decide whether service continues.
    fn reauthorization_request(&self, _session: &ClientRoSession) -> Option<CreditControlRequest> {
        None
    }
}

/// Supervision events on server sessions
pub trait ServerSessionContext: Send + Sync {
    fn session_supervision_timer_started(&self, session: &ServerRoSession) -> ListenerResult {
        debug!(session_id = %session.session_id(), "Supervision timer started");
        Ok(())
    }

    fn session_supervision_timer_restarted(&self, session: &ServerRoSession) -> ListenerResult {
        debug!(session_id = %session.session_id(), "Supervision timer restarted");
        Ok(())
    }

    fn session_supervision_timer_stopped(&self, session: &ServerRoSession) -> ListenerResult {
        debug!(session_id = %session.session_id(), "Supervision timer stopped");
        Ok(())
    }

    fn session_supervision_timer_expired(&self, session: &ServerRoSession) -> ListenerResult {
        info!(session_id = %session.session_id(), "Supervision timer expired");
        Ok(())
    }

    fn timeout_expired(&self, session: &ServerRoSession, request: &Message) -> ListenerResult {
        info!(
            session_id = %session.session_id(),
            command_code = request.command_code,
            "Request could not be delivered"
        );
        Ok(())
    }
}

/// Fallback used for every callback slot nobody filled
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultListener;

impl ClientSessionListener for DefaultListener {}
impl ServerSessionListener for DefaultListener {}
impl StateChangeListener for DefaultListener {}
impl ClientSessionContext for DefaultListener {}
impl ServerSessionContext for DefaultListener {}

/// Listener and context wiring handed to every session the factory creates
#[derive(Clone, Default)]
pub struct Listeners {
    client: Option<Arc<dyn ClientSessionListener>>,
    server: Option<Arc<dyn ServerSessionListener>>,
    state: Option<Arc<dyn StateChangeListener>>,
    client_context: Option<Arc<dyn ClientSessionContext>>,
    server_context: Option<Arc<dyn ServerSessionContext>>,
    message_factory: Option<Arc<dyn RoMessageFactory>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_client_listener(&mut self, listener: Arc<dyn ClientSessionListener>) -> &mut Self {
        self.client = Some(listener);
        self
    }

    pub fn set_server_listener(&mut self, listener: Arc<dyn ServerSessionListener>) -> &mut Self {
        self.server = Some(listener);
        self
    }

    pub fn set_state_listener(&mut self, listener: Arc<dyn StateChangeListener>) -> &mut Self {
        self.state = Some(listener);
        self
    }

    pub fn set_client_context(&mut self, context: Arc<dyn ClientSessionContext>) -> &mut Self {
        self.client_context = Some(context);
        self
    }

    pub fn set_server_context(&mut self, context: Arc<dyn ServerSessionContext>) -> &mut Self {
        self.server_context = Some(context);
        self
    }

    pub fn set_message_factory(&mut self, factory: Arc<dyn RoMessageFactory>) -> &mut Self {
        self.message_factory = Some(factory);
        self
    }

    pub fn client_listener(&self) -> &dyn ClientSessionListener {
        self.client.as_deref().unwrap_or(&DefaultListener)
    }

    pub fn server_listener(&self) -> &dyn ServerSessionListener {
        self.server.as_deref().unwrap_or(&DefaultListener)
    }

    pub fn state_listener(&self) -> &dyn StateChangeListener {
        self.state.as_deref().unwrap_or(&DefaultListener)
    }

    pub fn client_context(&self) -> &dyn ClientSessionContext {
        self.client_context.as_deref().unwrap_or(&DefaultListener)
    }

    pub fn server_context(&self) -> &dyn ServerSessionContext {
        self.server_context.as_deref().unwrap_or(&DefaultListener)
    }

    pub fn message_factory(&self) -> &dyn RoMessageFactory {
        self.message_factory
            .as_deref()
            .unwrap_or(&DefaultMessageFactory)
    }
}
