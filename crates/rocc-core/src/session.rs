//! Session handles and the per-session task
//!
//! Every live session is a Tokio task owning its [`SessionData`] record and
//! timer slots. Handles talk to it through an unbounded mailbox, so all
//! events for one session (application calls, inbound messages, timer
//! expiries) are applied one at a time in arrival order.

use dashmap::DashMap;
use rocc_api::{AppEvent, ClientState, Message, ServerState, SessionRole, SessionState};
use rocc_config::RoDefaults;
use rocc_store::{AuditEvent, AuditEventType, SessionData, SessionDatastore};
use rocc_transport_api::{Transport, TransportError};
use rocc_util::{ApplicationId, Result, RoError, SessionId};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::client::{self, ClientEvent, ClientNotification};
use crate::server::{self, ServerEvent, ServerNotification};
use crate::{
    AccessDecision, Effect, Expiry, ListenerResult, Listeners, TimerKind, TimerSlots, Transition,
};
use rocc_api::{CreditControlAnswer, CreditControlRequest, ReAuthAnswer, ReAuthRequest};

type Reply = oneshot::Sender<Result<()>>;

enum Command<E> {
    /// Application-originated event
    Event { event: E, reply: Option<Reply> },
    /// Message received from the transport
    Inbound { message: Message, reply: Reply },
    TimerExpired(Expiry),
}

struct HandleInner<E> {
    session_id: SessionId,
    application_id: ApplicationId,
    mailbox: mpsc::UnboundedSender<Command<E>>,
    state: watch::Receiver<SessionState>,
}

impl<E> HandleInner<E> {
    fn session_state(&self) -> SessionState {
        *self.state.borrow()
    }

    async fn call(&self, event: E, operation: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let gone = || RoError::illegal_state(self.session_state(), operation);

        self.mailbox
            .send(Command::Event {
                event,
                reply: Some(reply),
            })
            .map_err(|_| gone())?;
        rx.await.map_err(|_| gone())?
    }

    async fn release(&self, event: E) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        if self
            .mailbox
            .send(Command::Event {
                event,
                reply: Some(reply),
            })
            .is_err()
        {
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }

    async fn deliver(&self, message: Message) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let gone = || RoError::NotFound(self.session_id.clone());

        self.mailbox
            .send(Command::Inbound { message, reply })
            .map_err(|_| gone())?;
        rx.await.map_err(|_| gone())?
    }

    async fn terminated(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(SessionState::is_terminated).await;
    }
}

/// Handle to a client credit-control session
#[derive(Clone)]
pub struct ClientRoSession {
    inner: Arc<HandleInner<ClientEvent>>,
}

impl ClientRoSession {
    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    pub fn application_id(&self) -> ApplicationId {
        self.inner.application_id
    }

    pub fn session_state(&self) -> SessionState {
        self.inner.session_state()
    }

    pub fn state(&self) -> ClientState {
        match self.session_state() {
            SessionState::Client(state) => state,
            SessionState::Server(_) => ClientState::Terminated,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == ClientState::Terminated
    }

    /// Send a CCR. Returns once the transition is committed and the request
    /// handed to the transport; the answer arrives through the listener.
    /// A transport failure is resolved by failure handling first and then
    /// returned as `RouteFailure` or `OverloadFailure`.
    pub async fn send_credit_control_request(&self, request: CreditControlRequest) -> Result<()> {
        self.inner
            .call(ClientEvent::SendRequest(request), "send CCR")
            .await
    }

    pub async fn send_re_auth_answer(&self, answer: ReAuthAnswer) -> Result<()> {
        self.inner
            .call(ClientEvent::SendReAuthAnswer(answer), "send RAA")
            .await
    }

    /// Release the session locally. Idempotent.
    pub async fn release(&self) -> Result<()> {
        self.inner.release(ClientEvent::Release).await
    }

    /// Resolves once the session has terminated
    pub async fn terminated(&self) {
        self.inner.terminated().await
    }

    pub(crate) async fn deliver(&self, message: Message) -> Result<()> {
        self.inner.deliver(message).await
    }
}

impl fmt::Debug for ClientRoSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRoSession")
            .field("session_id", self.session_id())
            .field("state", &self.state())
            .finish()
    }
}

/// Handle to a server credit-control session
#[derive(Clone)]
pub struct ServerRoSession {
    inner: Arc<HandleInner<ServerEvent>>,
}

impl ServerRoSession {
    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    pub fn application_id(&self) -> ApplicationId {
        self.inner.application_id
    }

    pub fn session_state(&self) -> SessionState {
        self.inner.session_state()
    }

    pub fn state(&self) -> ServerState {
        match self.session_state() {
            SessionState::Server(state) => state,
            SessionState::Client(_) => ServerState::Terminated,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == ServerState::Terminated
    }

    /// Answer the outstanding CCR
    pub async fn send_credit_control_answer(&self, answer: CreditControlAnswer) -> Result<()> {
        self.inner
            .call(ServerEvent::SendAnswer(answer), "send CCA")
            .await
    }

    pub async fn send_re_auth_request(&self, request: ReAuthRequest) -> Result<()> {
        self.inner
            .call(ServerEvent::SendReAuthRequest(request), "send RAR")
            .await
    }

    /// Release the session locally. Idempotent.
    pub async fn release(&self) -> Result<()> {
        self.inner.release(ServerEvent::Release).await
    }

    /// Resolves once the session has terminated
    pub async fn terminated(&self) {
        self.inner.terminated().await
    }

    pub(crate) async fn deliver(&self, message: Message) -> Result<()> {
        self.inner.deliver(message).await
    }
}

impl fmt::Debug for ServerRoSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerRoSession")
            .field("session_id", self.session_id())
            .field("state", &self.state())
            .finish()
    }
}

/// A live session of either role
#[derive(Debug, Clone)]
pub enum RoSession {
    Client(ClientRoSession),
    Server(ServerRoSession),
}

impl RoSession {
    pub fn session_id(&self) -> &SessionId {
        match self {
            RoSession::Client(s) => s.session_id(),
            RoSession::Server(s) => s.session_id(),
        }
    }

    pub fn role(&self) -> SessionRole {
        match self {
            RoSession::Client(_) => SessionRole::Client,
            RoSession::Server(_) => SessionRole::Server,
        }
    }

    pub fn session_state(&self) -> SessionState {
        match self {
            RoSession::Client(s) => s.session_state(),
            RoSession::Server(s) => s.session_state(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.session_state().is_terminated()
    }

    pub fn as_client(&self) -> Option<&ClientRoSession> {
        match self {
            RoSession::Client(s) => Some(s),
            RoSession::Server(_) => None,
        }
    }

    pub fn as_server(&self) -> Option<&ServerRoSession> {
        match self {
            RoSession::Server(s) => Some(s),
            RoSession::Client(_) => None,
        }
    }

    pub async fn release(&self) -> Result<()> {
        match self {
            RoSession::Client(s) => s.release().await,
            RoSession::Server(s) => s.release().await,
        }
    }

    pub async fn terminated(&self) {
        match self {
            RoSession::Client(s) => s.terminated().await,
            RoSession::Server(s) => s.terminated().await,
        }
    }

    pub(crate) async fn deliver(&self, message: Message) -> Result<()> {
        match self {
            RoSession::Client(s) => s.deliver(message).await,
            RoSession::Server(s) => s.deliver(message).await,
        }
    }

    /// True if both values are handles to the same session task
    pub fn same_session(&self, other: &RoSession) -> bool {
        match (self, other) {
            (RoSession::Client(a), RoSession::Client(b)) => Arc::ptr_eq(&a.inner, &b.inner),
            (RoSession::Server(a), RoSession::Server(b)) => Arc::ptr_eq(&a.inner, &b.inner),
            _ => false,
        }
    }
}

/// Everything a session task needs from its factory
#[derive(Clone)]
pub(crate) struct SessionEnv {
    pub store: Arc<dyn SessionDatastore>,
    pub transport: Arc<dyn Transport>,
    pub defaults: Arc<RoDefaults>,
    pub listeners: Listeners,
    pub registry: Arc<DashMap<SessionId, RoSession>>,
    /// Flips to true when the owning factory shuts down
    pub shutdown: watch::Receiver<bool>,
}

impl SessionEnv {
    pub fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to record audit event");
        }
    }
}

/// Role-specific glue between the generic task and a state machine
trait Role: Send + 'static {
    type Event: Send + 'static;
    type Notification: Send + 'static;
    type Handle: Clone + Send + Sync + 'static;

    fn handle(inner: Arc<HandleInner<Self::Event>>) -> Self::Handle;
    fn wrap(handle: &Self::Handle) -> RoSession;

    fn transition(
        data: &mut SessionData,
        defaults: &RoDefaults,
        event: Self::Event,
    ) -> Result<Transition<Self::Notification>>;

    fn inbound(listeners: &Listeners, message: Message) -> Self::Event;
    fn send_failed(message: Message, error: TransportError) -> Self::Event;
    fn expired(
        kind: TimerKind,
        state: SessionState,
        handle: &Self::Handle,
        listeners: &Listeners,
    ) -> Option<Self::Event>;
    fn restore_event() -> Self::Event;

    fn notify(handle: &Self::Handle, env: &SessionEnv, notification: Self::Notification);
}

struct ClientSide;

impl Role for ClientSide {
    type Event = ClientEvent;
    type Notification = ClientNotification;
    type Handle = ClientRoSession;

    fn handle(inner: Arc<HandleInner<ClientEvent>>) -> ClientRoSession {
        ClientRoSession { inner }
    }

    fn wrap(handle: &ClientRoSession) -> RoSession {
        RoSession::Client(handle.clone())
    }

    fn transition(
        data: &mut SessionData,
        defaults: &RoDefaults,
        event: ClientEvent,
    ) -> Result<Transition<ClientNotification>> {
        client::transition(data, defaults, event)
    }

    fn inbound(listeners: &Listeners, message: Message) -> ClientEvent {
        match listeners.message_factory().classify(message) {
            AppEvent::CreditControlAnswer(answer) => ClientEvent::Answer(answer),
            AppEvent::ReAuthRequest(request) => ClientEvent::ReAuthRequest(request),
            AppEvent::CreditControlRequest(request) => ClientEvent::Other(request.into_message()),
            AppEvent::ReAuthAnswer(answer) => ClientEvent::Other(answer.into_message()),
            AppEvent::Other(message) => ClientEvent::Other(message),
        }
    }

    fn send_failed(request: Message, error: TransportError) -> ClientEvent {
        ClientEvent::SendFailed { request, error }
    }

    fn expired(
        kind: TimerKind,
        state: SessionState,
        handle: &ClientRoSession,
        listeners: &Listeners,
    ) -> Option<ClientEvent> {
        match kind {
            TimerKind::Tx => Some(ClientEvent::TxExpired),
            TimerKind::Validity => {
                let reauthorization = if state == SessionState::Client(ClientState::Open) {
                    listeners.client_context().reauthorization_request(handle)
                } else {
                    None
                };
                Some(ClientEvent::ValidityExpired { reauthorization })
            }
            TimerKind::Supervision => None,
        }
    }

    fn restore_event() -> ClientEvent {
        ClientEvent::Restore
    }

    fn notify(handle: &ClientRoSession, env: &SessionEnv, notification: ClientNotification) {
        if let Some((decision, kind)) = notification.access_outcome() {
            let session_id = handle.session_id().clone();
            let reason = kind.as_str().to_string();
            env.audit(match decision {
                AccessDecision::Grant => AuditEventType::AccessGranted { session_id, reason },
                AccessDecision::Deny => AuditEventType::AccessDenied { session_id, reason },
            });
        }

        let listener = env.listeners.client_listener();
        let context = env.listeners.client_context();
        let result = match &notification {
            ClientNotification::CreditControlAnswer { request, answer } => {
                listener.do_credit_control_answer(handle, request, answer)
            }
            ClientNotification::ReAuthRequest(request) => {
                listener.do_re_auth_request(handle, request)
            }
            ClientNotification::OtherEvent(message) => listener.do_other_event(handle, message),
            ClientNotification::SendError { request, error } => {
                listener.do_send_error(handle, request, error)
            }
            ClientNotification::TxTimerExpired => context.tx_timer_expired(handle),
            ClientNotification::GrantOnDeliverFailure(request) => {
                context.grant_access_on_deliver_failure(handle, request)
            }
            ClientNotification::DenyOnDeliverFailure(request) => {
                context.deny_access_on_deliver_failure(handle, request)
            }
            ClientNotification::GrantOnTxExpire => context.grant_access_on_tx_expire(handle),
            ClientNotification::DenyOnTxExpire => context.deny_access_on_tx_expire(handle),
            ClientNotification::GrantOnFailureMessage => {
                context.grant_access_on_failure_message(handle)
            }
            ClientNotification::DenyOnFailureMessage => {
                context.deny_access_on_failure_message(handle)
            }
            ClientNotification::GrantOnValidityExpire => {
                context.grant_access_on_validity_expire(handle)
            }
            ClientNotification::DenyOnValidityExpire => {
                context.deny_access_on_validity_expire(handle)
            }
            ClientNotification::ServiceError => context.indicate_service_error(handle),
        };
        report(handle.session_id(), result);
    }
}

struct ServerSide;

impl Role for ServerSide {
    type Event = ServerEvent;
    type Notification = ServerNotification;
    type Handle = ServerRoSession;

    fn handle(inner: Arc<HandleInner<ServerEvent>>) -> ServerRoSession {
        ServerRoSession { inner }
    }

    fn wrap(handle: &ServerRoSession) -> RoSession {
        RoSession::Server(handle.clone())
    }

    fn transition(
        data: &mut SessionData,
        defaults: &RoDefaults,
        event: ServerEvent,
    ) -> Result<Transition<ServerNotification>> {
        server::transition(data, defaults, event)
    }

    fn inbound(listeners: &Listeners, message: Message) -> ServerEvent {
        match listeners.message_factory().classify(message) {
            AppEvent::CreditControlRequest(request) => ServerEvent::Request(request),
            AppEvent::ReAuthAnswer(answer) => ServerEvent::ReAuthAnswer(answer),
            AppEvent::CreditControlAnswer(answer) => ServerEvent::Other(answer.into_message()),
            AppEvent::ReAuthRequest(request) => ServerEvent::Other(request.into_message()),
            AppEvent::Other(message) => ServerEvent::Other(message),
        }
    }

    fn send_failed(message: Message, error: TransportError) -> ServerEvent {
        ServerEvent::SendFailed { message, error }
    }

    fn expired(
        kind: TimerKind,
        _state: SessionState,
        _handle: &ServerRoSession,
        _listeners: &Listeners,
    ) -> Option<ServerEvent> {
        match kind {
            TimerKind::Supervision => Some(ServerEvent::SupervisionExpired),
            TimerKind::Tx | TimerKind::Validity => None,
        }
    }

    fn restore_event() -> ServerEvent {
        ServerEvent::Restore
    }

    fn notify(handle: &ServerRoSession, env: &SessionEnv, notification: ServerNotification) {
        let listener = env.listeners.server_listener();
        let context = env.listeners.server_context();
        let result = match &notification {
            ServerNotification::CreditControlRequest(request) => {
                listener.do_credit_control_request(handle, request)
            }
            ServerNotification::ReAuthAnswer { request, answer } => {
                listener.do_re_auth_answer(handle, request, answer)
            }
            ServerNotification::OtherEvent(message) => listener.do_other_event(handle, message),
            ServerNotification::SupervisionStarted => {
                context.session_supervision_timer_started(handle)
            }
            ServerNotification::SupervisionRestarted => {
                context.session_supervision_timer_restarted(handle)
            }
            ServerNotification::SupervisionStopped => {
                context.session_supervision_timer_stopped(handle)
            }
            ServerNotification::SupervisionExpired => {
                context.session_supervision_timer_expired(handle)
            }
            ServerNotification::TimeoutExpired(request) => context.timeout_expired(handle, request),
        };
        report(handle.session_id(), result);
    }
}

fn report(session_id: &SessionId, result: ListenerResult) {
    if let Err(e) = result {
        warn!(session_id = %session_id, error = %e, "Listener callback failed");
    }
}

struct SessionTask<R: Role> {
    data: SessionData,
    env: SessionEnv,
    handle: R::Handle,
    timers: TimerSlots,
    mailbox: mpsc::UnboundedReceiver<Command<R::Event>>,
    // Weak so that armed timers never keep the mailbox open on their own
    mailbox_tx: mpsc::WeakUnboundedSender<Command<R::Event>>,
    state_tx: watch::Sender<SessionState>,
    released: bool,
}

impl<R: Role> SessionTask<R> {
    async fn run(mut self, restore: bool) {
        if restore && let Err(e) = self.handle_event(R::restore_event()).await {
            warn!(session_id = %self.data.session_id, error = %e, "Failed to restore session");
        }

        let mut shutdown = self.env.shutdown.clone();
        while !self.released {
            let command = tokio::select! {
                biased;
                Ok(_) = shutdown.wait_for(|stop| *stop) => {
                    self.suspend();
                    break;
                }
                command = self.mailbox.recv() => command,
            };
            let Some(command) = command else {
                break;
            };

            match command {
                Command::Event { event, reply } => {
                    let result = self.handle_event(event).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                Command::Inbound { message, reply } => {
                    let event = R::inbound(&self.env.listeners, message);
                    let _ = reply.send(self.handle_event(event).await);
                }
                Command::TimerExpired(expiry) => {
                    if !self.timers.accept(expiry) {
                        trace!(
                            session_id = %self.data.session_id,
                            kind = ?expiry.kind,
                            "Stale timer expiry ignored"
                        );
                        continue;
                    }
                    debug!(session_id = %self.data.session_id, kind = ?expiry.kind, "Timer expired");
                    let event =
                        R::expired(expiry.kind, self.data.state, &self.handle, &self.env.listeners);
                    if let Some(event) = event
                        && let Err(e) = self.handle_event(event).await
                    {
                        warn!(session_id = %self.data.session_id, error = %e, "Timer event rejected");
                    }
                }
            }
        }

        debug!(session_id = %self.data.session_id, "Session task finished");
    }

    /// Apply `event` and any follow-up events its effects produce.
    ///
    /// A transport failure while dispatching on behalf of `event` is
    /// returned to the caller once failure handling has run.
    async fn handle_event(&mut self, event: R::Event) -> Result<()> {
        let mut follow_ups = VecDeque::new();
        let failed = self.apply(event, &mut follow_ups).await?;

        while !self.released
            && let Some(event) = follow_ups.pop_front()
        {
            if let Err(e) = self.apply(event, &mut follow_ups).await {
                warn!(session_id = %self.data.session_id, error = %e, "Follow-up event rejected");
            }
        }

        match failed {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    /// Commit one transition and execute its effects. Returns the first
    /// dispatch failure, if any.
    async fn apply(
        &mut self,
        event: R::Event,
        follow_ups: &mut VecDeque<R::Event>,
    ) -> Result<Option<TransportError>> {
        let mut data = self.data.clone();
        let transition = R::transition(&mut data, &self.env.defaults, event)?;

        let old = self.data.state;
        let new = data.state;
        let changed = data != self.data;
        if changed {
            data.touch();
            self.data = data;
        }

        if old != new {
            debug!(session_id = %self.data.session_id, from = %old, to = %new, "Session state changed");
            self.state_tx.send_replace(new);
            report(
                &self.data.session_id,
                self.env
                    .listeners
                    .state_listener()
                    .state_changed(&self.data.session_id, old, new),
            );
            self.env.audit(AuditEventType::StateChanged {
                session_id: self.data.session_id.clone(),
                from: old,
                to: new,
            });
        }

        if changed
            && !new.is_terminated()
            && let Err(e) = self.env.store.save(&self.data)
        {
            warn!(session_id = %self.data.session_id, error = %e, "Failed to persist session");
        }

        let mut release = false;
        let mut failed = None;
        for effect in transition.effects {
            match effect {
                Effect::Dispatch(message) => {
                    if let Err(error) = self.env.transport.dispatch(message.clone()).await {
                        warn!(
                            session_id = %self.data.session_id,
                            command_code = message.command_code,
                            error = %error,
                            "Dispatch failed"
                        );
                        if failed.is_none() {
                            failed = Some(error.clone());
                        }
                        follow_ups.push_back(R::send_failed(message, error));
                    }
                }
                Effect::ArmTimer(kind, duration) => {
                    let mailbox = self.mailbox_tx.clone();
                    self.timers.arm(kind, duration, move |expiry| {
                        if let Some(mailbox) = mailbox.upgrade() {
                            let _ = mailbox.send(Command::TimerExpired(expiry));
                        }
                    });
                }
                Effect::CancelTimer(kind) => {
                    self.timers.cancel(kind);
                }
                Effect::Notify(notification) => R::notify(&self.handle, &self.env, notification),
                Effect::Release => release = true,
            }
        }

        if release {
            self.finish();
        }
        Ok(failed)
    }

    /// Stop without releasing: the record stays persisted for re-hydration
    fn suspend(&mut self) {
        self.timers.cancel_all();
        debug!(
            session_id = %self.data.session_id,
            state = %self.data.state,
            "Session task stopped by factory shutdown"
        );
    }

    fn finish(&mut self) {
        self.released = true;
        self.timers.cancel_all();

        let session_id = self.data.session_id.clone();
        if let Err(e) = self.env.store.remove(&session_id) {
            warn!(session_id = %session_id, error = %e, "Failed to remove session record");
        }
        self.env.audit(AuditEventType::SessionReleased {
            session_id: session_id.clone(),
            final_state: self.data.state,
        });

        let this = R::wrap(&self.handle);
        self.env
            .registry
            .remove_if(&session_id, |_, live| live.same_session(&this));

        info!(session_id = %session_id, state = %self.data.state, "Session released");
    }
}

fn start<R: Role>(env: SessionEnv, data: SessionData, restore: bool) -> R::Handle {
    let (mailbox_tx, mailbox) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(data.state);

    let handle = R::handle(Arc::new(HandleInner {
        session_id: data.session_id.clone(),
        application_id: data.application_id,
        mailbox: mailbox_tx.clone(),
        state: state_rx,
    }));

    let task = SessionTask::<R> {
        data,
        env,
        handle: handle.clone(),
        timers: TimerSlots::new(),
        mailbox,
        mailbox_tx: mailbox_tx.downgrade(),
        state_tx,
        released: false,
    };
    tokio::spawn(task.run(restore));
    handle
}

/// Start the task for `data`. With `restore`, timers are re-armed from the
/// persisted state before any queued event is applied.
///
/// Must be called within a Tokio runtime.
pub(crate) fn spawn_session(env: SessionEnv, data: SessionData, restore: bool) -> RoSession {
    match data.role() {
        SessionRole::Client => RoSession::Client(start::<ClientSide>(env, data, restore)),
        SessionRole::Server => RoSession::Server(start::<ServerSide>(env, data, restore)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocc_api::CcRequestType;
    use rocc_store::MemoryStore;
    use rocc_transport_api::MockTransport;
    use std::time::Duration;

    fn env(transport: Arc<MockTransport>, defaults: RoDefaults) -> SessionEnv {
        SessionEnv {
            store: Arc::new(MemoryStore::new()),
            transport,
            defaults: Arc::new(defaults),
            listeners: Listeners::new(),
            registry: Arc::new(DashMap::new()),
            shutdown: watch::channel(false).1,
        }
    }

    fn client_data(id: &str) -> SessionData {
        SessionData::new(
            SessionRole::Client,
            SessionId::new(id),
            ApplicationId::CREDIT_CONTROL,
        )
    }

    #[tokio::test]
    async fn send_request_dispatches_and_moves_to_pending() {
        let transport = Arc::new(MockTransport::new());
        let session = spawn_session(
            env(transport.clone(), RoDefaults::default()),
            client_data("pgw;1;1"),
            false,
        );
        let client = session.as_client().unwrap();

        let ccr = CreditControlRequest::new(
            client.session_id(),
            ApplicationId::CREDIT_CONTROL,
            CcRequestType::Initial,
            0,
        );
        client.send_credit_control_request(ccr).await.unwrap();

        assert_eq!(client.state(), ClientState::PendingInitial);
        assert_eq!(transport.dispatched().len(), 1);
    }

    #[tokio::test]
    async fn illegal_event_leaves_state_untouched() {
        let transport = Arc::new(MockTransport::new());
        let session = spawn_session(
            env(transport.clone(), RoDefaults::default()),
            client_data("pgw;1;2"),
            false,
        );
        let client = session.as_client().unwrap();

        let update = CreditControlRequest::new(
            client.session_id(),
            ApplicationId::CREDIT_CONTROL,
            CcRequestType::Update,
            1,
        );
        let err = client.send_credit_control_request(update).await.unwrap_err();

        assert!(matches!(err, RoError::IllegalState { .. }));
        assert_eq!(client.state(), ClientState::Idle);
        assert!(transport.dispatched().is_empty());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let transport = Arc::new(MockTransport::new());
        let session = spawn_session(
            env(transport, RoDefaults::default()),
            client_data("pgw;1;3"),
            false,
        );

        session.release().await.unwrap();
        assert!(session.is_terminated());
        session.release().await.unwrap();
    }

    #[tokio::test]
    async fn calls_after_release_are_illegal() {
        let transport = Arc::new(MockTransport::new());
        let session = spawn_session(
            env(transport, RoDefaults::default()),
            client_data("pgw;1;4"),
            false,
        );
        session.release().await.unwrap();

        let client = session.as_client().unwrap();
        let ccr = CreditControlRequest::new(
            client.session_id(),
            ApplicationId::CREDIT_CONTROL,
            CcRequestType::Initial,
            0,
        );
        let err = client.send_credit_control_request(ccr).await.unwrap_err();
        assert!(matches!(err, RoError::IllegalState { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn restored_pending_session_rearms_tx() {
        let transport = Arc::new(MockTransport::new());
        let mut data = client_data("pgw;1;5");
        data.state = SessionState::Client(ClientState::PendingInitial);
        data.pending_request = Some(
            CreditControlRequest::new(
                &data.session_id,
                ApplicationId::CREDIT_CONTROL,
                CcRequestType::Initial,
                0,
            )
            .into_message(),
        );

        let defaults = RoDefaults {
            tx_timer: Duration::from_secs(5),
            ..RoDefaults::default()
        };
        let session = spawn_session(env(transport, defaults), data, true);

        // Default handling is TERMINATE: the restored Tx expiry denies access
        tokio::time::timeout(Duration::from_secs(10), session.terminated())
            .await
            .unwrap();
        assert!(session.is_terminated());
    }

    struct Failing;

    impl crate::ClientSessionListener for Failing {
        fn do_credit_control_answer(
            &self,
            _: &ClientRoSession,
            _: &CreditControlRequest,
            _: &CreditControlAnswer,
        ) -> ListenerResult {
            Err("answer handler failed".into())
        }
    }

    impl crate::StateChangeListener for Failing {
        fn state_changed(&self, _: &SessionId, _: SessionState, _: SessionState) -> ListenerResult {
            Err("state listener failed".into())
        }
    }

    #[tokio::test]
    async fn failing_listeners_do_not_undo_transitions() {
        let transport = Arc::new(MockTransport::new());
        let mut env = env(transport.clone(), RoDefaults::default());
        let failing = Arc::new(Failing);
        env.listeners
            .set_client_listener(failing.clone())
            .set_state_listener(failing);
        let store = env.store.clone();

        let session = spawn_session(env, client_data("pgw;1;6"), false);
        let client = session.as_client().unwrap();
        let id = client.session_id().clone();

        let initial = CreditControlRequest::new(
            &id,
            ApplicationId::CREDIT_CONTROL,
            CcRequestType::Initial,
            0,
        );
        client
            .send_credit_control_request(initial.clone())
            .await
            .unwrap();
        assert_eq!(client.state(), ClientState::PendingInitial);

        session
            .deliver(CreditControlAnswer::success(&initial).into_message())
            .await
            .unwrap();
        assert_eq!(client.state(), ClientState::Open);

        let record = store.load(&id).unwrap().unwrap();
        assert_eq!(record.state, SessionState::Client(ClientState::Open));
        assert_eq!(transport.dispatched().len(), 1);
    }
}
