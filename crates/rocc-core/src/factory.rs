//! Session factory and registry

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rocc_api::{CcRequestType, CreditControlRequest, Message, SessionRole};
use rocc_config::{RoDefaults, Settings};
use rocc_store::{AuditEventType, SessionData, SessionDatastore};
use rocc_transport_api::Transport;
use rocc_util::{ApplicationId, Result, RoError, SessionId};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::session::{SessionEnv, spawn_session};
use crate::{ClientRoSession, Listeners, RoSession, ServerRoSession};

/// Creates Ro sessions and routes inbound messages to them.
///
/// The registry maps each Session-Id to at most one live session. Sessions
/// whose record is in the store but not in memory (after a restart) are
/// re-hydrated on first use.
///
/// Dropping the factory (or calling [`shutdown`](Self::shutdown)) stops
/// every session task it started. Their store records are kept, so another
/// factory on the same store can re-hydrate them.
pub struct RoSessionFactory {
    origin_host: String,
    defaults: Arc<RoDefaults>,
    store: Arc<dyn SessionDatastore>,
    transport: Arc<dyn Transport>,
    listeners: RwLock<Listeners>,
    registry: Arc<DashMap<SessionId, RoSession>>,
    shutdown: watch::Sender<bool>,
}

impl RoSessionFactory {
    pub fn new(
        settings: &Settings,
        store: Arc<dyn SessionDatastore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            origin_host: settings.node.origin_host.clone(),
            defaults: Arc::new(settings.ro.clone()),
            store,
            transport,
            listeners: RwLock::new(Listeners::default()),
            registry: Arc::new(DashMap::new()),
            shutdown: watch::channel(false).0,
        }
    }

    pub fn with_listeners(self, listeners: Listeners) -> Self {
        self.set_listeners(listeners);
        self
    }

    /// Replace the listeners used by sessions created from now on
    pub fn set_listeners(&self, listeners: Listeners) {
        *self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner) = listeners;
    }

    pub fn defaults(&self) -> &RoDefaults {
        &self.defaults
    }

    fn env(&self) -> SessionEnv {
        SessionEnv {
            store: self.store.clone(),
            transport: self.transport.clone(),
            defaults: self.defaults.clone(),
            listeners: self
                .listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            registry: self.registry.clone(),
            shutdown: self.shutdown.subscribe(),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if *self.shutdown.borrow() {
            return Err(RoError::internal("session factory is shut down"));
        }
        Ok(())
    }

    /// Create and register a new session.
    ///
    /// The Session-Id is `session_id` if given, else the one carried by
    /// `request`, else a freshly generated one. Must be called within a
    /// Tokio runtime.
    pub fn create_session(
        &self,
        session_id: Option<SessionId>,
        role: SessionRole,
        application_id: ApplicationId,
        request: Option<&Message>,
    ) -> Result<RoSession> {
        self.ensure_running()?;
        if !self.defaults.supports(application_id) {
            return Err(RoError::UnsupportedApplication(application_id));
        }

        let session_id = session_id
            .or_else(|| request.and_then(Message::session_id))
            .unwrap_or_else(|| SessionId::generate(&self.origin_host));

        let session = match self.registry.entry(session_id.clone()) {
            Entry::Occupied(_) => return Err(RoError::AlreadyExists(session_id)),
            Entry::Vacant(slot) => {
                let data = self.store.create(role, &session_id, application_id)?;
                let session = spawn_session(self.env(), data, false);
                slot.insert(session.clone());
                session
            }
        };

        self.env().audit(AuditEventType::SessionCreated {
            session_id: session_id.clone(),
            role,
            application_id,
        });
        info!(session_id = %session_id, %role, %application_id, "Session created");
        Ok(session)
    }

    pub fn create_client_session(
        &self,
        session_id: Option<SessionId>,
        application_id: ApplicationId,
    ) -> Result<ClientRoSession> {
        match self.create_session(session_id, SessionRole::Client, application_id, None)? {
            RoSession::Client(session) => Ok(session),
            RoSession::Server(session) => Err(RoError::internal(format!(
                "{} created with the wrong role",
                session.session_id()
            ))),
        }
    }

    /// Create a server session for an inbound initial or event request
    pub fn create_server_session(&self, request: &Message) -> Result<ServerRoSession> {
        match self.create_session(
            None,
            SessionRole::Server,
            request.application_id,
            Some(request),
        )? {
            RoSession::Server(session) => Ok(session),
            RoSession::Client(session) => Err(RoError::internal(format!(
                "{} created with the wrong role",
                session.session_id()
            ))),
        }
    }

    /// Look up a session of the given role, re-hydrating it from the store
    /// if it is not live.
    pub fn lookup_session(&self, session_id: &SessionId, role: SessionRole) -> Result<RoSession> {
        let session = self
            .find(session_id)?
            .ok_or_else(|| RoError::NotFound(session_id.clone()))?;

        if session.role() != role {
            return Err(RoError::UnsupportedRole(format!(
                "{} is a {} session",
                session_id,
                session.role()
            )));
        }
        Ok(session)
    }

    pub fn client_session(&self, session_id: &SessionId) -> Result<ClientRoSession> {
        let session = self.lookup_session(session_id, SessionRole::Client)?;
        session
            .as_client()
            .cloned()
            .ok_or_else(|| RoError::NotFound(session_id.clone()))
    }

    pub fn server_session(&self, session_id: &SessionId) -> Result<ServerRoSession> {
        let session = self.lookup_session(session_id, SessionRole::Server)?;
        session
            .as_server()
            .cloned()
            .ok_or_else(|| RoError::NotFound(session_id.clone()))
    }

    /// Live session, else the persisted one brought back to life
    fn find(&self, session_id: &SessionId) -> Result<Option<RoSession>> {
        if let Some(session) = self.registry.get(session_id).map(|s| s.value().clone()) {
            return Ok(Some(session));
        }

        match self.store.load(session_id)? {
            Some(data) => self.restore(data).map(Some),
            None => Ok(None),
        }
    }

    fn restore(&self, data: SessionData) -> Result<RoSession> {
        self.ensure_running()?;
        if !self.defaults.supports(data.application_id) {
            return Err(RoError::UnsupportedApplication(data.application_id));
        }

        let session_id = data.session_id.clone();
        let state = data.state;
        let session = match self.registry.entry(session_id.clone()) {
            Entry::Occupied(live) => return Ok(live.get().clone()),
            Entry::Vacant(slot) => {
                let session = spawn_session(self.env(), data, true);
                slot.insert(session.clone());
                session
            }
        };

        self.env().audit(AuditEventType::SessionRestored {
            session_id: session_id.clone(),
            state,
        });
        info!(session_id = %session_id, %state, "Session restored");
        Ok(session)
    }

    /// Re-hydrate every persisted session. Returns how many were restored.
    pub fn restore_persisted(&self) -> Result<usize> {
        let mut restored = 0;
        for session_id in self.store.session_ids()? {
            if self.registry.contains_key(&session_id) {
                continue;
            }
            let Some(data) = self.store.load(&session_id)? else {
                continue;
            };
            match self.restore(data) {
                Ok(_) => restored += 1,
                Err(e) => warn!(session_id = %session_id, error = %e, "Failed to restore session"),
            }
        }
        Ok(restored)
    }

    /// Route an inbound message to its session.
    ///
    /// An initial or event CCR for an unknown Session-Id creates a server
    /// session; anything else for an unknown Session-Id is `NotFound`.
    pub async fn deliver(&self, message: Message) -> Result<()> {
        let Some(session_id) = message.session_id() else {
            return Err(RoError::internal("inbound message without Session-Id"));
        };

        let session = match self.find(&session_id)? {
            Some(session) => session,
            None => self.accept(&session_id, &message)?,
        };
        debug!(
            session_id = %session_id,
            command_code = message.command_code,
            is_request = message.is_request,
            "Delivering inbound message"
        );
        session.deliver(message).await
    }

    fn accept(&self, session_id: &SessionId, message: &Message) -> Result<RoSession> {
        if !opens_server_session(message) {
            return Err(RoError::NotFound(session_id.clone()));
        }

        match self.create_session(
            Some(session_id.clone()),
            SessionRole::Server,
            message.application_id,
            Some(message),
        ) {
            Ok(session) => Ok(session),
            // Lost a race with a concurrent delivery for the same id
            Err(RoError::AlreadyExists(_)) => self
                .find(session_id)?
                .ok_or_else(|| RoError::NotFound(session_id.clone())),
            Err(e) => Err(e),
        }
    }

    /// Release a session by id. Persisted records of sessions that are not
    /// live are dropped without re-hydrating them.
    pub async fn release(&self, session_id: &SessionId) -> Result<()> {
        let live = self.registry.get(session_id).map(|s| s.value().clone());
        match live {
            Some(session) => session.release().await,
            None => {
                self.store.remove(session_id)?;
                Ok(())
            }
        }
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.registry.contains_key(session_id)
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.registry.iter().map(|e| e.key().clone()).collect()
    }

    pub fn is_healthy(&self) -> bool {
        !*self.shutdown.borrow() && self.store.is_healthy() && self.transport.is_healthy()
    }

    /// Stop every live session task without releasing it.
    ///
    /// Timers are cancelled and records stay in the store. The factory
    /// refuses to create or restore sessions afterwards.
    pub fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        let live = self.registry.len();
        self.registry.clear();
        info!(sessions = live, "Session factory shut down");
    }
}

impl Drop for RoSessionFactory {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn opens_server_session(message: &Message) -> bool {
    if !message.is_request {
        return false;
    }
    let request = CreditControlRequest::from_message(message.clone());
    matches!(
        request.request_type(),
        Some(CcRequestType::Initial | CcRequestType::Event)
    ) && message.command_code == rocc_api::avp::cmd::CREDIT_CONTROL
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientSessionContext, ListenerResult, ServerSessionContext};
    use rocc_api::{ClientState, CreditControlAnswer, FailureHandling, ServerState};
    use rocc_store::{MemoryStore, SqliteStore};
    use rocc_transport_api::MockTransport;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn record(&self, call: &str) -> ListenerResult {
            self.calls.lock().unwrap().push(call.to_string());
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ClientSessionContext for Recorder {
        fn grant_access_on_tx_expire(&self, _: &ClientRoSession) -> ListenerResult {
            self.record("grant_tx")
        }

        fn deny_access_on_tx_expire(&self, _: &ClientRoSession) -> ListenerResult {
            self.record("deny_tx")
        }

        fn grant_access_on_validity_expire(&self, _: &ClientRoSession) -> ListenerResult {
            self.record("grant_validity")
        }

        fn deny_access_on_deliver_failure(
            &self,
            _: &ClientRoSession,
            _: &Message,
        ) -> ListenerResult {
            self.record("deny_deliver")
        }
    }

    impl ServerSessionContext for Recorder {
        fn session_supervision_timer_started(&self, _: &ServerRoSession) -> ListenerResult {
            self.record("started")
        }

        fn session_supervision_timer_restarted(&self, _: &ServerRoSession) -> ListenerResult {
            self.record("restarted")
        }

        fn session_supervision_timer_expired(&self, _: &ServerRoSession) -> ListenerResult {
            self.record("expired")
        }
    }

    fn settings(ro: RoDefaults) -> Settings {
        Settings {
            ro,
            ..Settings::default()
        }
    }

    fn factory(
        ro: RoDefaults,
        transport: Arc<MockTransport>,
        recorder: Arc<Recorder>,
    ) -> RoSessionFactory {
        let mut listeners = Listeners::new();
        listeners
            .set_client_context(recorder.clone())
            .set_server_context(recorder);
        RoSessionFactory::new(&settings(ro), Arc::new(MemoryStore::new()), transport)
            .with_listeners(listeners)
    }

    fn ccr(session_id: &SessionId, request_type: CcRequestType, number: u32) -> CreditControlRequest {
        CreditControlRequest::new(session_id, ApplicationId::CREDIT_CONTROL, request_type, number)
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_with_terminate_denies_and_releases() {
        let transport = Arc::new(MockTransport::new());
        let recorder = Arc::new(Recorder::default());
        let ro = RoDefaults {
            tx_timer: Duration::from_secs(5),
            credit_control_failure_handling: FailureHandling::Terminate,
            ..RoDefaults::default()
        };
        let factory = factory(ro, transport.clone(), recorder.clone());

        let session = factory
            .create_client_session(None, ApplicationId::CREDIT_CONTROL)
            .unwrap();
        let id = session.session_id().clone();
        session
            .send_credit_control_request(ccr(&id, CcRequestType::Initial, 0))
            .await
            .unwrap();
        assert_eq!(session.state(), ClientState::PendingInitial);

        timeout(Duration::from_secs(6), session.terminated())
            .await
            .unwrap();

        assert_eq!(recorder.calls(), vec!["deny_tx"]);
        assert!(!factory.contains(&id));
        assert_eq!(transport.dispatched().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn update_restarts_supervision() {
        let transport = Arc::new(MockTransport::new());
        let recorder = Arc::new(Recorder::default());
        let ro = RoDefaults {
            supervision_timeout: Some(Duration::from_secs(30)),
            ..RoDefaults::default()
        };
        let factory = factory(ro, transport.clone(), recorder.clone());
        let id = SessionId::new("pgw.example;100;1");

        factory
            .deliver(ccr(&id, CcRequestType::Initial, 0).into_message())
            .await
            .unwrap();
        let server = factory.server_session(&id).unwrap();
        server
            .send_credit_control_answer(CreditControlAnswer::success(&ccr(
                &id,
                CcRequestType::Initial,
                0,
            )))
            .await
            .unwrap();
        assert_eq!(server.state(), ServerState::Open);

        sleep(Duration::from_secs(10)).await;
        factory
            .deliver(ccr(&id, CcRequestType::Update, 1).into_message())
            .await
            .unwrap();
        server
            .send_credit_control_answer(CreditControlAnswer::success(&ccr(
                &id,
                CcRequestType::Update,
                1,
            )))
            .await
            .unwrap();

        // Original deadline (30s) passes without expiry
        sleep(Duration::from_secs(25)).await;
        assert_eq!(server.state(), ServerState::Open);

        timeout(Duration::from_secs(10), server.terminated())
            .await
            .unwrap();
        assert_eq!(recorder.calls(), vec!["started", "restarted", "expired"]);
        assert_eq!(transport.dispatched().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn validity_expiry_with_continue_keeps_session_open() {
        let transport = Arc::new(MockTransport::new());
        let recorder = Arc::new(Recorder::default());
        let ro = RoDefaults {
            credit_control_failure_handling: FailureHandling::Continue,
            ..RoDefaults::default()
        };
        let factory = factory(ro, transport.clone(), recorder.clone());

        let session = factory
            .create_client_session(None, ApplicationId::CREDIT_CONTROL)
            .unwrap();
        let id = session.session_id().clone();
        let initial = ccr(&id, CcRequestType::Initial, 0);
        session
            .send_credit_control_request(initial.clone())
            .await
            .unwrap();
        factory
            .deliver(
                CreditControlAnswer::success(&initial)
                    .with_validity_time(60)
                    .into_message(),
            )
            .await
            .unwrap();
        assert_eq!(session.state(), ClientState::Open);

        sleep(Duration::from_secs(61)).await;
        assert_eq!(recorder.calls(), vec!["grant_validity"]);
        assert_eq!(session.state(), ClientState::Open);

        session
            .send_credit_control_request(ccr(&id, CcRequestType::Update, 1))
            .await
            .unwrap();
        assert_eq!(session.state(), ClientState::PendingUpdate);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let factory = factory(
            RoDefaults::default(),
            Arc::new(MockTransport::new()),
            Arc::new(Recorder::default()),
        );
        let id = SessionId::new("pgw.example;1;1");

        factory
            .create_client_session(Some(id.clone()), ApplicationId::CREDIT_CONTROL)
            .unwrap();
        let err = factory
            .create_client_session(Some(id.clone()), ApplicationId::CREDIT_CONTROL)
            .unwrap_err();

        assert!(matches!(err, RoError::AlreadyExists(dup) if dup == id));
        assert_eq!(factory.session_count(), 1);
    }

    #[tokio::test]
    async fn unsupported_application_is_rejected() {
        let factory = factory(
            RoDefaults::default(),
            Arc::new(MockTransport::new()),
            Arc::new(Recorder::default()),
        );

        let err = factory
            .create_client_session(None, ApplicationId::new(16777238))
            .unwrap_err();
        assert!(matches!(err, RoError::UnsupportedApplication(_)));
    }

    #[tokio::test]
    async fn send_failure_with_terminate_denies() {
        let transport = Arc::new(MockTransport::new());
        transport.set_fail_dispatch(true);
        let recorder = Arc::new(Recorder::default());
        let factory = factory(RoDefaults::default(), transport.clone(), recorder.clone());

        let session = factory
            .create_client_session(None, ApplicationId::CREDIT_CONTROL)
            .unwrap();
        let id = session.session_id().clone();
        let err = session
            .send_credit_control_request(ccr(&id, CcRequestType::Initial, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, RoError::RouteFailure(_)));
        assert!(session.is_terminated());
        assert_eq!(recorder.calls(), vec!["deny_deliver"]);
        assert!(!factory.contains(&id));
    }

    #[tokio::test]
    async fn answer_for_unknown_session_is_not_found() {
        let factory = factory(
            RoDefaults::default(),
            Arc::new(MockTransport::new()),
            Arc::new(Recorder::default()),
        );
        let id = SessionId::new("pgw.example;9;9");
        let answer = CreditControlAnswer::success(&ccr(&id, CcRequestType::Initial, 0));

        let err = factory.deliver(answer.into_message()).await.unwrap_err();
        assert!(matches!(err, RoError::NotFound(_)));
    }

    #[tokio::test]
    async fn release_by_id_is_idempotent() {
        let factory = factory(
            RoDefaults::default(),
            Arc::new(MockTransport::new()),
            Arc::new(Recorder::default()),
        );
        let session = factory
            .create_client_session(None, ApplicationId::CREDIT_CONTROL)
            .unwrap();
        let id = session.session_id().clone();

        factory.release(&id).await.unwrap();
        factory.release(&id).await.unwrap();
        assert!(session.is_terminated());
        assert_eq!(factory.session_count(), 0);
    }

    #[tokio::test]
    async fn persisted_session_is_restored_on_lookup() {
        let store: Arc<dyn SessionDatastore> = Arc::new(SqliteStore::in_memory().unwrap());
        let transport = Arc::new(MockTransport::new());
        let id = SessionId::new("pgw.example;5;5");

        {
            let first = RoSessionFactory::new(
                &Settings::default(),
                store.clone(),
                transport.clone(),
            );
            let session = first
                .create_client_session(Some(id.clone()), ApplicationId::CREDIT_CONTROL)
                .unwrap();
            session
                .send_credit_control_request(ccr(&id, CcRequestType::Initial, 0))
                .await
                .unwrap();
        }

        let second = RoSessionFactory::new(&Settings::default(), store, transport);
        assert!(!second.contains(&id));

        let restored = second.client_session(&id).unwrap();
        assert_eq!(restored.state(), ClientState::PendingInitial);
        assert!(second.contains(&id));

        let err = second
            .lookup_session(&id, SessionRole::Server)
            .unwrap_err();
        assert!(matches!(err, RoError::UnsupportedRole(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_factory_leaves_one_live_session_per_id() {
        let store: Arc<dyn SessionDatastore> = Arc::new(MemoryStore::new());
        let transport = Arc::new(MockTransport::new());
        let recorder = Arc::new(Recorder::default());
        let ro = RoDefaults {
            tx_timer: Duration::from_secs(5),
            credit_control_failure_handling: FailureHandling::Terminate,
            ..RoDefaults::default()
        };
        let mut listeners = Listeners::new();
        listeners.set_client_context(recorder.clone());
        let id = SessionId::new("pgw.example;6;6");

        let first = RoSessionFactory::new(&settings(ro.clone()), store.clone(), transport.clone())
            .with_listeners(listeners.clone());
        let session = first
            .create_client_session(Some(id.clone()), ApplicationId::CREDIT_CONTROL)
            .unwrap();
        session
            .send_credit_control_request(ccr(&id, CcRequestType::Initial, 0))
            .await
            .unwrap();
        drop(session);
        drop(first);
        tokio::task::yield_now().await;
        assert!(store.exists(&id).unwrap());

        let second = RoSessionFactory::new(&settings(ro), store.clone(), transport)
            .with_listeners(listeners);
        let restored = second.client_session(&id).unwrap();
        assert_eq!(restored.state(), ClientState::PendingInitial);

        sleep(Duration::from_secs(40)).await;
        assert_eq!(recorder.calls(), vec!["deny_tx"]);
        assert!(restored.is_terminated());
        assert!(!store.exists(&id).unwrap());
    }

    #[tokio::test]
    async fn shutdown_stops_sessions_and_keeps_records() {
        let store: Arc<dyn SessionDatastore> = Arc::new(MemoryStore::new());
        let factory = RoSessionFactory::new(
            &Settings::default(),
            store.clone(),
            Arc::new(MockTransport::new()),
        );
        let session = factory
            .create_client_session(None, ApplicationId::CREDIT_CONTROL)
            .unwrap();
        let id = session.session_id().clone();
        session
            .send_credit_control_request(ccr(&id, CcRequestType::Initial, 0))
            .await
            .unwrap();

        factory.shutdown();
        assert_eq!(factory.session_count(), 0);
        assert!(!factory.is_healthy());

        let err = session
            .send_credit_control_request(ccr(&id, CcRequestType::Update, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, RoError::IllegalState { .. }));
        assert!(store.exists(&id).unwrap());

        let err = factory
            .create_client_session(None, ApplicationId::CREDIT_CONTROL)
            .unwrap_err();
        assert!(matches!(err, RoError::InternalFailure(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_create_registers_one_session() {
        let factory = Arc::new(factory(
            RoDefaults::default(),
            Arc::new(MockTransport::new()),
            Arc::new(Recorder::default()),
        ));
        let id = SessionId::new("pgw.example;7;7");

        let mut creates = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let factory = factory.clone();
            let id = id.clone();
            creates.spawn(async move {
                factory
                    .create_client_session(Some(id), ApplicationId::CREDIT_CONTROL)
                    .is_ok()
            });
        }
        let mut created = 0;
        while let Some(ok) = creates.join_next().await {
            if ok.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(factory.session_count(), 1);

        let live = factory.lookup_session(&id, SessionRole::Client).unwrap();
        let mut lookups = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let factory = factory.clone();
            let id = id.clone();
            lookups.spawn(async move { factory.lookup_session(&id, SessionRole::Client) });
        }
        while let Some(found) = lookups.join_next().await {
            assert!(found.unwrap().unwrap().same_session(&live));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn answer_racing_tx_expiry_has_exactly_one_outcome() {
        let recorder = Arc::new(Recorder::default());
        let ro = RoDefaults {
            tx_timer: Duration::from_millis(2),
            credit_control_failure_handling: FailureHandling::Terminate,
            ..RoDefaults::default()
        };
        let factory = Arc::new(factory(ro, Arc::new(MockTransport::new()), recorder.clone()));

        let (mut answered, mut expired) = (0, 0);
        for round in 0..100u64 {
            let id = SessionId::new(format!("pgw.example;race;{round}"));
            let session = factory
                .create_client_session(Some(id.clone()), ApplicationId::CREDIT_CONTROL)
                .unwrap();
            let initial = ccr(&id, CcRequestType::Initial, 0);
            session
                .send_credit_control_request(initial.clone())
                .await
                .unwrap();
            let denials = recorder.calls().len();

            let answer = CreditControlAnswer::success(&initial).into_message();
            let racer = factory.clone();
            let delay = Duration::from_micros(1500 + (round % 5) * 250);
            let delivered = tokio::spawn(async move {
                sleep(delay).await;
                racer.deliver(answer).await.is_ok()
            })
            .await
            .unwrap();
            sleep(Duration::from_millis(10)).await;

            let denied = recorder.calls().len() > denials;
            assert_ne!(delivered, denied, "round {round}");
            if delivered {
                answered += 1;
                assert_eq!(session.state(), ClientState::Open);
                factory.release(&id).await.unwrap();
            } else {
                expired += 1;
                assert!(session.is_terminated());
            }
        }
        assert_eq!(answered + expired, 100);
        assert_eq!(factory.session_count(), 0);
    }
}
