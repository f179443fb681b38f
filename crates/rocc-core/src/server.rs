//! Server session state machine
//!
//! ```text
//! Idle --CCR-I, CCA ok--> Open --CCR-U, CCA--> Open --CCR-T, CCA--> Terminated
//! Idle --CCR-E, CCA-----> Terminated
//! ```
//!
//! The server owns the Supervision (Tcc) timer: started when the initial
//! request is answered, restarted whenever an update arrives, stopped on
//! termination. Expiry releases the session.

use rocc_api::avp;
use rocc_api::{
    CcRequestType, CreditControlAnswer, CreditControlRequest, Message, ReAuthAnswer,
    ReAuthRequest, ServerState, SessionState,
};
use rocc_config::RoDefaults;
use rocc_store::SessionData;
use rocc_transport_api::TransportError;
use rocc_util::{Result, RoError};

use crate::{TimerKind, Transition};

/// Inputs to the server state machine
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// CCR received from the client
    Request(CreditControlRequest),
    /// Application answers the outstanding CCR
    SendAnswer(CreditControlAnswer),
    SupervisionExpired,
    /// Application sends a RAR
    SendReAuthRequest(ReAuthRequest),
    /// RAA received from the client
    ReAuthAnswer(ReAuthAnswer),
    /// The transport refused an outbound message
    SendFailed {
        message: Message,
        error: TransportError,
    },
    Other(Message),
    Release,
    /// Session re-hydrated from the store
    Restore,
}

/// Callbacks a server transition asks the driver to make
#[derive(Debug, Clone)]
pub enum ServerNotification {
    CreditControlRequest(CreditControlRequest),
    ReAuthAnswer {
        request: ReAuthRequest,
        answer: ReAuthAnswer,
    },
    OtherEvent(Message),
    SupervisionStarted,
    SupervisionRestarted,
    SupervisionStopped,
    SupervisionExpired,
    /// An outbound request could not be delivered
    TimeoutExpired(Message),
}

pub type ServerTransition = Transition<ServerNotification>;

/// Current server state of a record
pub fn server_state(data: &SessionData) -> Result<ServerState> {
    match data.state {
        SessionState::Server(state) => Ok(state),
        SessionState::Client(_) => Err(RoError::UnsupportedRole(format!(
            "{} is a client session",
            data.session_id
        ))),
    }
}

/// Apply one event to a server session record
pub fn transition(
    data: &mut SessionData,
    defaults: &RoDefaults,
    event: ServerEvent,
) -> Result<ServerTransition> {
    let state = server_state(data)?;

    match event {
        ServerEvent::Request(request) => on_request(data, defaults, state, request),
        ServerEvent::SendAnswer(answer) => send_answer(data, defaults, state, answer),
        ServerEvent::SupervisionExpired => {
            let mut t = Transition::new();
            if state == ServerState::Open {
                t.notify(ServerNotification::SupervisionExpired);
                terminate(data, &mut t);
            }
            Ok(t)
        }
        ServerEvent::SendReAuthRequest(request) => {
            if state != ServerState::Open {
                return Err(RoError::illegal_state(state, "send RAR"));
            }
            let message = request.into_message();
            data.pending_rar = Some(message.clone());
            let mut t = Transition::new();
            t.dispatch(message);
            Ok(t)
        }
        ServerEvent::ReAuthAnswer(answer) => {
            if state != ServerState::Open {
                return Err(RoError::illegal_state(state, "receive RAA"));
            }
            let Some(request) = data.pending_rar.take() else {
                return Err(RoError::illegal_state(state, "receive RAA without outstanding RAR"));
            };
            let mut t = Transition::new();
            t.notify(ServerNotification::ReAuthAnswer {
                request: ReAuthRequest::from_message(request),
                answer,
            });
            Ok(t)
        }
        ServerEvent::SendFailed { message, error: _ } => {
            let mut t = Transition::new();
            if message.is_request && message.command_code == avp::cmd::RE_AUTH {
                data.pending_rar = None;
                t.notify(ServerNotification::TimeoutExpired(message));
            }
            Ok(t)
        }
        ServerEvent::Other(message) => {
            if state == ServerState::Terminated {
                return Err(RoError::illegal_state(state, "receive other event"));
            }
            let mut t = Transition::new();
            t.notify(ServerNotification::OtherEvent(message));
            Ok(t)
        }
        ServerEvent::Release => {
            let mut t = Transition::new();
            if state != ServerState::Terminated {
                t.cancel(TimerKind::Supervision);
                terminate(data, &mut t);
            }
            Ok(t)
        }
        ServerEvent::Restore => {
            let mut t = Transition::new();
            if state == ServerState::Open {
                t.arm(
                    TimerKind::Supervision,
                    defaults.supervision_for(data.validity_time),
                );
            }
            Ok(t)
        }
    }
}

fn set_state(data: &mut SessionData, state: ServerState) {
    data.state = SessionState::Server(state);
}

fn terminate(data: &mut SessionData, t: &mut ServerTransition) {
    data.pending_request = None;
    data.pending_rar = None;
    set_state(data, ServerState::Terminated);
    t.release();
}

fn on_request(
    data: &mut SessionData,
    defaults: &RoDefaults,
    state: ServerState,
    request: CreditControlRequest,
) -> Result<ServerTransition> {
    let request_type = request.request_type();
    match (state, request_type) {
        (ServerState::Idle, Some(CcRequestType::Initial | CcRequestType::Event))
        | (ServerState::Open, Some(CcRequestType::Update | CcRequestType::Termination)) => {}
        (_, Some(request_type)) => {
            return Err(RoError::illegal_state(
                state,
                format!("receive CCR {:?}", request_type),
            ));
        }
        (_, None) => {
            return Err(RoError::illegal_state(
                state,
                "receive CCR without CC-Request-Type",
            ));
        }
    }

    let mut t = Transition::new();
    match request_type {
        Some(CcRequestType::Event) => {
            data.direct_debiting = request.is_direct_debiting();
        }
        Some(CcRequestType::Update) => {
            t.arm(
                TimerKind::Supervision,
                defaults.supervision_for(data.validity_time),
            )
            .notify(ServerNotification::SupervisionRestarted);
        }
        Some(CcRequestType::Termination) => {
            t.cancel(TimerKind::Supervision)
                .notify(ServerNotification::SupervisionStopped);
        }
        _ => {}
    }

    data.pending_request = Some(request.message().clone());
    t.notify(ServerNotification::CreditControlRequest(request));
    Ok(t)
}

fn send_answer(
    data: &mut SessionData,
    defaults: &RoDefaults,
    state: ServerState,
    answer: CreditControlAnswer,
) -> Result<ServerTransition> {
    let Some(pending) = data.pending_request.as_ref() else {
        return Err(RoError::illegal_state(state, "send CCA without outstanding CCR"));
    };
    let request_type = CreditControlRequest::from_message(pending.clone()).request_type();
    let success = answer.is_success();
    let validity = answer.validity_time();

    data.pending_request = None;
    let mut t = Transition::new();
    t.dispatch(answer.into_message());

    match (state, request_type, success) {
        (ServerState::Idle, Some(CcRequestType::Initial), true) => {
            data.validity_time = validity;
            set_state(data, ServerState::Open);
            t.arm(TimerKind::Supervision, defaults.supervision_for(validity))
                .notify(ServerNotification::SupervisionStarted);
        }
        (ServerState::Open, Some(CcRequestType::Update), true) => {
            if validity.is_some() {
                data.validity_time = validity;
            }
        }
        _ => terminate(data, &mut t),
    }
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocc_api::SessionRole;
    use rocc_api::avp::result;
    use rocc_util::{ApplicationId, SessionId};
    use std::time::Duration;

    fn session() -> SessionData {
        SessionData::new(
            SessionRole::Server,
            SessionId::new("pgw;1;1"),
            ApplicationId::CREDIT_CONTROL,
        )
    }

    fn ccr(request_type: CcRequestType, number: u32) -> CreditControlRequest {
        CreditControlRequest::new(
            &SessionId::new("pgw;1;1"),
            ApplicationId::CREDIT_CONTROL,
            request_type,
            number,
        )
    }

    fn state(data: &SessionData) -> ServerState {
        server_state(data).unwrap()
    }

    fn open_session(defaults: &RoDefaults) -> SessionData {
        let mut data = session();
        let request = ccr(CcRequestType::Initial, 0);
        transition(&mut data, defaults, ServerEvent::Request(request.clone())).unwrap();
        transition(
            &mut data,
            defaults,
            ServerEvent::SendAnswer(CreditControlAnswer::success(&request)),
        )
        .unwrap();
        data
    }

    #[test]
    fn test_initial_request_is_delivered() {
        let defaults = RoDefaults::default();
        let mut data = session();

        let t = transition(
            &mut data,
            &defaults,
            ServerEvent::Request(ccr(CcRequestType::Initial, 0)),
        )
        .unwrap();

        assert_eq!(state(&data), ServerState::Idle);
        assert!(data.pending_request.is_some());
        assert!(matches!(
            t.notifications().next(),
            Some(ServerNotification::CreditControlRequest(_))
        ));
    }

    #[test]
    fn test_update_in_idle_is_illegal() {
        let defaults = RoDefaults::default();
        let mut data = session();

        let result = transition(
            &mut data,
            &defaults,
            ServerEvent::Request(ccr(CcRequestType::Update, 1)),
        );
        assert!(matches!(result, Err(RoError::IllegalState { .. })));
    }

    #[test]
    fn test_initial_answer_opens_and_starts_supervision() {
        let defaults = RoDefaults::default();
        let mut data = session();
        let request = ccr(CcRequestType::Initial, 0);
        transition(&mut data, &defaults, ServerEvent::Request(request.clone())).unwrap();

        let t = transition(
            &mut data,
            &defaults,
            ServerEvent::SendAnswer(CreditControlAnswer::success(&request).with_validity_time(30)),
        )
        .unwrap();

        assert_eq!(state(&data), ServerState::Open);
        assert_eq!(t.dispatched().count(), 1);
        assert_eq!(t.armed(TimerKind::Supervision), Some(Duration::from_secs(60)));
        assert!(t
            .notifications()
            .any(|n| matches!(n, ServerNotification::SupervisionStarted)));
    }

    #[test]
    fn test_zero_validity_time_keeps_session_supervised() {
        let defaults = RoDefaults::default();
        let mut data = session();
        let request = ccr(CcRequestType::Initial, 0);
        transition(&mut data, &defaults, ServerEvent::Request(request.clone())).unwrap();

        let t = transition(
            &mut data,
            &defaults,
            ServerEvent::SendAnswer(CreditControlAnswer::success(&request).with_validity_time(0)),
        )
        .unwrap();

        assert_eq!(state(&data), ServerState::Open);
        assert_eq!(data.validity_time, None);
        assert_eq!(
            t.armed(TimerKind::Supervision),
            Some(defaults.supervision_for(None))
        );
        assert!(!t.releases());
    }

    #[test]
    fn test_configured_supervision_wins() {
        let defaults = RoDefaults {
            supervision_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let mut data = session();
        let request = ccr(CcRequestType::Initial, 0);
        transition(&mut data, &defaults, ServerEvent::Request(request.clone())).unwrap();

        let t = transition(
            &mut data,
            &defaults,
            ServerEvent::SendAnswer(CreditControlAnswer::success(&request).with_validity_time(500)),
        )
        .unwrap();
        assert_eq!(t.armed(TimerKind::Supervision), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_initial_failure_answer_releases() {
        let defaults = RoDefaults::default();
        let mut data = session();
        let request = ccr(CcRequestType::Initial, 0);
        transition(&mut data, &defaults, ServerEvent::Request(request.clone())).unwrap();

        let t = transition(
            &mut data,
            &defaults,
            ServerEvent::SendAnswer(CreditControlAnswer::to(
                &request,
                result::END_USER_SERVICE_DENIED,
            )),
        )
        .unwrap();

        assert_eq!(t.dispatched().count(), 1);
        assert!(t.releases());
        assert_eq!(state(&data), ServerState::Terminated);
    }

    #[test]
    fn test_event_answer_releases() {
        let defaults = RoDefaults::default();
        let mut data = session();
        let request = ccr(CcRequestType::Event, 0);
        transition(&mut data, &defaults, ServerEvent::Request(request.clone())).unwrap();
        assert!(data.direct_debiting);

        let t = transition(
            &mut data,
            &defaults,
            ServerEvent::SendAnswer(CreditControlAnswer::success(&request)),
        )
        .unwrap();
        assert!(t.releases());
        assert_eq!(t.armed(TimerKind::Supervision), None);
    }

    #[test]
    fn test_update_restarts_supervision() {
        let defaults = RoDefaults::default();
        let mut data = open_session(&defaults);

        let t = transition(
            &mut data,
            &defaults,
            ServerEvent::Request(ccr(CcRequestType::Update, 1)),
        )
        .unwrap();

        assert_eq!(t.armed(TimerKind::Supervision), Some(Duration::from_secs(120)));
        let notes: Vec<_> = t.notifications().collect();
        assert!(matches!(notes[0], ServerNotification::SupervisionRestarted));
        assert!(matches!(notes[1], ServerNotification::CreditControlRequest(_)));
        assert_eq!(state(&data), ServerState::Open);
    }

    #[test]
    fn test_termination_stops_supervision_and_answer_releases() {
        let defaults = RoDefaults::default();
        let mut data = open_session(&defaults);
        let request = ccr(CcRequestType::Termination, 1);

        let t = transition(&mut data, &defaults, ServerEvent::Request(request.clone())).unwrap();
        assert!(t.cancels(TimerKind::Supervision));
        assert!(t
            .notifications()
            .any(|n| matches!(n, ServerNotification::SupervisionStopped)));

        let t = transition(
            &mut data,
            &defaults,
            ServerEvent::SendAnswer(CreditControlAnswer::success(&request)),
        )
        .unwrap();
        assert!(t.releases());
    }

    #[test]
    fn test_answer_without_request_is_illegal() {
        let defaults = RoDefaults::default();
        let mut data = open_session(&defaults);
        let request = ccr(CcRequestType::Update, 1);

        let result = transition(
            &mut data,
            &defaults,
            ServerEvent::SendAnswer(CreditControlAnswer::success(&request)),
        );
        assert!(matches!(result, Err(RoError::IllegalState { .. })));
    }

    #[test]
    fn test_supervision_expiry_releases() {
        let defaults = RoDefaults::default();
        let mut data = open_session(&defaults);

        let t = transition(&mut data, &defaults, ServerEvent::SupervisionExpired).unwrap();
        assert!(matches!(
            t.notifications().next(),
            Some(ServerNotification::SupervisionExpired)
        ));
        assert!(t.releases());

        // Already terminated: nothing more happens
        let t = transition(&mut data, &defaults, ServerEvent::SupervisionExpired).unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn test_re_auth_exchange() {
        let defaults = RoDefaults::default();
        let mut data = open_session(&defaults);
        let rar = ReAuthRequest::new(&data.session_id, ApplicationId::CREDIT_CONTROL);

        let t = transition(&mut data, &defaults, ServerEvent::SendReAuthRequest(rar.clone()))
            .unwrap();
        assert_eq!(t.dispatched().count(), 1);

        let t = transition(
            &mut data,
            &defaults,
            ServerEvent::ReAuthAnswer(ReAuthAnswer::to(&rar, result::SUCCESS)),
        )
        .unwrap();
        assert!(matches!(
            t.notifications().next(),
            Some(ServerNotification::ReAuthAnswer { .. })
        ));
        assert!(data.pending_rar.is_none());
    }

    #[test]
    fn test_failed_rar_dispatch_reports_timeout() {
        let defaults = RoDefaults::default();
        let mut data = open_session(&defaults);
        let rar = ReAuthRequest::new(&data.session_id, ApplicationId::CREDIT_CONTROL);
        transition(&mut data, &defaults, ServerEvent::SendReAuthRequest(rar.clone())).unwrap();

        let t = transition(
            &mut data,
            &defaults,
            ServerEvent::SendFailed {
                message: rar.into_message(),
                error: TransportError::Route("no peer".into()),
            },
        )
        .unwrap();
        assert!(matches!(
            t.notifications().next(),
            Some(ServerNotification::TimeoutExpired(_))
        ));
        assert!(!t.releases());
        assert!(data.pending_rar.is_none());
    }

    #[test]
    fn test_rar_in_idle_is_illegal() {
        let defaults = RoDefaults::default();
        let mut data = session();
        let rar = ReAuthRequest::new(&data.session_id, ApplicationId::CREDIT_CONTROL);

        let result = transition(&mut data, &defaults, ServerEvent::SendReAuthRequest(rar));
        assert!(matches!(result, Err(RoError::IllegalState { .. })));
    }

    #[test]
    fn test_release_and_restore() {
        let defaults = RoDefaults::default();
        let mut data = open_session(&defaults);

        let t = transition(&mut data, &defaults, ServerEvent::Restore).unwrap();
        assert_eq!(t.armed(TimerKind::Supervision), Some(Duration::from_secs(120)));

        let t = transition(&mut data, &defaults, ServerEvent::Release).unwrap();
        assert!(t.releases());
        let t = transition(&mut data, &defaults, ServerEvent::Release).unwrap();
        assert!(t.is_empty());
    }
}
