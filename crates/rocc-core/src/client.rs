//! Client session state machine
//!
//! ```text
//! Idle --CCR-I--> PendingInitial --CCA ok--> Open --CCR-U--> PendingUpdate --CCA ok--> Open
//! Idle --CCR-E--> PendingEvent ----CCA-----> Terminated
//! Open --CCR-T--> PendingTermination --CCA--> Terminated
//! ```
//!
//! [`transition`] is a pure function over the persisted [`SessionData`]: it
//! updates the record and returns the effects for the driver to execute. On
//! error the record is left untouched.

use rocc_api::avp::{self, result};
use rocc_api::{
    CcRequestType, ClientState, CreditControlAnswer, CreditControlRequest, FailureHandling,
    Message, ReAuthAnswer, ReAuthRequest, SessionState,
};
use rocc_config::RoDefaults;
use rocc_store::SessionData;
use rocc_transport_api::TransportError;
use rocc_util::{Result, RoError};

use crate::policy::{self, AccessDecision, FailureCategory, FailureKind};
use crate::{TimerKind, Transition};

/// Inputs to the client state machine
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Application sends a CCR
    SendRequest(CreditControlRequest),
    /// CCA received from the server
    Answer(CreditControlAnswer),
    TxExpired,
    /// The transport refused an outbound message
    SendFailed {
        request: Message,
        error: TransportError,
    },
    /// Validity expired; carries the re-authorization request the client
    /// context produced, if any
    ValidityExpired {
        reauthorization: Option<CreditControlRequest>,
    },
    /// RAR received from the server
    ReAuthRequest(ReAuthRequest),
    /// Application answers a RAR
    SendReAuthAnswer(ReAuthAnswer),
    Other(Message),
    Release,
    /// Session re-hydrated from the store
    Restore,
}

/// Callbacks a client transition asks the driver to make
#[derive(Debug, Clone)]
pub enum ClientNotification {
    CreditControlAnswer {
        request: CreditControlRequest,
        answer: CreditControlAnswer,
    },
    ReAuthRequest(ReAuthRequest),
    OtherEvent(Message),
    SendError {
        request: Message,
        error: TransportError,
    },
    TxTimerExpired,
    GrantOnDeliverFailure(Message),
    DenyOnDeliverFailure(Message),
    GrantOnTxExpire,
    DenyOnTxExpire,
    GrantOnFailureMessage,
    DenyOnFailureMessage,
    GrantOnValidityExpire,
    DenyOnValidityExpire,
    ServiceError,
}

impl ClientNotification {
    /// Grant/deny outcome carried by this notification, for auditing
    pub fn access_outcome(&self) -> Option<(AccessDecision, FailureKind)> {
        use AccessDecision::*;
        use FailureKind::*;

        match self {
            ClientNotification::GrantOnDeliverFailure(_) => Some((Grant, SendFailure)),
            ClientNotification::DenyOnDeliverFailure(_) => Some((Deny, SendFailure)),
            ClientNotification::GrantOnTxExpire => Some((Grant, AnswerTimeout)),
            ClientNotification::DenyOnTxExpire => Some((Deny, AnswerTimeout)),
            ClientNotification::GrantOnFailureMessage => Some((Grant, FailureAnswer)),
            ClientNotification::DenyOnFailureMessage | ClientNotification::ServiceError => {
                Some((Deny, FailureAnswer))
            }
            ClientNotification::GrantOnValidityExpire => Some((Grant, ValidityTimeout)),
            ClientNotification::DenyOnValidityExpire => Some((Deny, ValidityTimeout)),
            _ => None,
        }
    }
}

pub type ClientTransition = Transition<ClientNotification>;

/// Current client state of a record
pub fn client_state(data: &SessionData) -> Result<ClientState> {
    match data.state {
        SessionState::Client(state) => Ok(state),
        SessionState::Server(_) => Err(RoError::UnsupportedRole(format!(
            "{} is a server session",
            data.session_id
        ))),
    }
}

/// Apply one event to a client session record
pub fn transition(
    data: &mut SessionData,
    defaults: &RoDefaults,
    event: ClientEvent,
) -> Result<ClientTransition> {
    let state = client_state(data)?;

    match event {
        ClientEvent::SendRequest(request) => send_request(data, defaults, state, request),
        ClientEvent::Answer(answer) => on_answer(data, defaults, state, answer),
        ClientEvent::TxExpired => Ok(on_tx_expired(data, defaults, state)),
        ClientEvent::SendFailed { request, error } => {
            Ok(on_send_failed(data, defaults, state, request, error))
        }
        ClientEvent::ValidityExpired { reauthorization } => {
            on_validity_expired(data, defaults, state, reauthorization)
        }
        ClientEvent::ReAuthRequest(request) => {
            if !is_active(state) {
                return Err(RoError::illegal_state(state, "receive RAR"));
            }
            let mut t = Transition::new();
            t.notify(ClientNotification::ReAuthRequest(request));
            Ok(t)
        }
        ClientEvent::SendReAuthAnswer(answer) => {
            if !is_active(state) {
                return Err(RoError::illegal_state(state, "send RAA"));
            }
            let mut t = Transition::new();
            t.dispatch(answer.into_message());
            Ok(t)
        }
        ClientEvent::Other(message) => {
            if state == ClientState::Terminated {
                return Err(RoError::illegal_state(state, "receive other event"));
            }
            let mut t = Transition::new();
            t.notify(ClientNotification::OtherEvent(message));
            Ok(t)
        }
        ClientEvent::Release => Ok(release(data, state)),
        ClientEvent::Restore => Ok(restore(data, defaults, state)),
    }
}

fn is_active(state: ClientState) -> bool {
    state == ClientState::Open || state.is_pending()
}

fn set_state(data: &mut SessionData, state: ClientState) {
    data.state = SessionState::Client(state);
}

fn terminate(data: &mut SessionData, t: &mut ClientTransition) {
    data.pending_request = None;
    data.retransmitted = false;
    set_state(data, ClientState::Terminated);
    t.release();
}

fn send_request(
    data: &mut SessionData,
    defaults: &RoDefaults,
    state: ClientState,
    request: CreditControlRequest,
) -> Result<ClientTransition> {
    let request_type = request.request_type();
    let next = match (state, request_type) {
        (ClientState::Idle, Some(CcRequestType::Initial)) => ClientState::PendingInitial,
        (ClientState::Idle, Some(CcRequestType::Event)) => ClientState::PendingEvent,
        (ClientState::Open, Some(CcRequestType::Update)) => ClientState::PendingUpdate,
        (ClientState::Open, Some(CcRequestType::Termination)) => ClientState::PendingTermination,
        (_, Some(request_type)) => {
            return Err(RoError::illegal_state(
                state,
                format!("send CCR {:?}", request_type),
            ));
        }
        (_, None) => {
            return Err(RoError::illegal_state(
                state,
                "send CCR without CC-Request-Type",
            ));
        }
    };

    let mut t = Transition::new();
    if state == ClientState::Open {
        t.cancel(TimerKind::Validity);
    }
    if next == ClientState::PendingEvent {
        data.direct_debiting = request.is_direct_debiting();
    }

    let message = request.into_message();
    data.pending_request = Some(message.clone());
    data.retransmitted = false;
    set_state(data, next);

    t.dispatch(message).arm(TimerKind::Tx, defaults.tx_timer);
    Ok(t)
}

fn on_answer(
    data: &mut SessionData,
    defaults: &RoDefaults,
    state: ClientState,
    answer: CreditControlAnswer,
) -> Result<ClientTransition> {
    if !state.is_pending() {
        return Err(RoError::illegal_state(state, "receive CCA"));
    }
    let Some(pending) = data.pending_request.clone() else {
        return Err(RoError::illegal_state(state, "receive CCA without outstanding CCR"));
    };

    let request = CreditControlRequest::from_message(pending);
    if let (Some(sent), Some(received)) = (request.request_number(), answer.request_number())
        && sent != received
    {
        return Err(RoError::illegal_state(
            state,
            format!("receive CCA for request number {} (outstanding {})", received, sent),
        ));
    }

    if let Some(ccfh) = answer.credit_control_failure_handling() {
        data.ccfh = Some(ccfh);
    }
    if let Some(ddfh) = answer.direct_debiting_failure_handling() {
        data.ddfh = Some(ddfh);
    }
    data.pending_request = None;
    data.retransmitted = false;

    let mut t = Transition::new();
    t.cancel(TimerKind::Tx);
    t.notify(ClientNotification::CreditControlAnswer {
        request,
        answer: answer.clone(),
    });

    if answer.is_success() {
        match state {
            ClientState::PendingInitial | ClientState::PendingUpdate => {
                data.validity_time = answer.validity_time();
                set_state(data, ClientState::Open);
                t.arm(
                    TimerKind::Validity,
                    answer.validity_time().unwrap_or(defaults.validity_time),
                );
            }
            _ => terminate(data, &mut t),
        }
        return Ok(t);
    }

    let notification = match answer.result_code() {
        Some(result::CREDIT_CONTROL_NOT_APPLICABLE) => ClientNotification::GrantOnFailureMessage,
        Some(
            result::END_USER_SERVICE_DENIED | result::CREDIT_LIMIT_REACHED | result::USER_UNKNOWN,
        ) => ClientNotification::DenyOnFailureMessage,
        _ => match decide(data, defaults, FailureKind::FailureAnswer) {
            AccessDecision::Grant => ClientNotification::GrantOnFailureMessage,
            AccessDecision::Deny => ClientNotification::ServiceError,
        },
    };
    t.notify(notification);
    terminate(data, &mut t);
    Ok(t)
}

fn on_tx_expired(
    data: &mut SessionData,
    defaults: &RoDefaults,
    state: ClientState,
) -> ClientTransition {
    let mut t = Transition::new();
    if !state.is_pending() {
        return t;
    }

    t.notify(ClientNotification::TxTimerExpired);
    if state == ClientState::PendingTermination {
        terminate(data, &mut t);
        return t;
    }

    let handling = handling(data, defaults);
    if policy::should_retransmit(handling, FailureKind::AnswerTimeout, data.retransmitted)
        && let Some(pending) = &data.pending_request
    {
        let again = pending.as_retransmission();
        data.retransmitted = true;
        t.dispatch(again)
            .arm(TimerKind::Tx, defaults.tx_timer)
            .notify(ClientNotification::GrantOnTxExpire);
        return t;
    }

    // RETRY_AND_TERMINATE whose single retry went unanswered
    let decision = if data.retransmitted && handling == FailureHandling::RetryAndTerminate {
        AccessDecision::Deny
    } else {
        decide(data, defaults, FailureKind::AnswerTimeout)
    };

    match decision {
        AccessDecision::Grant => {
            t.notify(ClientNotification::GrantOnTxExpire);
            continue_after_failure(data, defaults, state, &mut t);
        }
        AccessDecision::Deny => {
            t.notify(ClientNotification::DenyOnTxExpire);
            terminate(data, &mut t);
        }
    }
    t
}

fn on_send_failed(
    data: &mut SessionData,
    defaults: &RoDefaults,
    state: ClientState,
    request: Message,
    error: TransportError,
) -> ClientTransition {
    let mut t = Transition::new();
    t.notify(ClientNotification::SendError {
        request: request.clone(),
        error,
    });

    let outstanding = state.is_pending()
        && data
            .pending_request
            .as_ref()
            .is_some_and(|pending| same_request(pending, &request));
    if !outstanding {
        return t;
    }

    t.cancel(TimerKind::Tx);
    match decide(data, defaults, FailureKind::SendFailure) {
        AccessDecision::Grant => {
            t.notify(ClientNotification::GrantOnDeliverFailure(request));
            continue_after_failure(data, defaults, state, &mut t);
        }
        AccessDecision::Deny => {
            t.notify(ClientNotification::DenyOnDeliverFailure(request));
            terminate(data, &mut t);
        }
    }
    t
}

fn on_validity_expired(
    data: &mut SessionData,
    defaults: &RoDefaults,
    state: ClientState,
    reauthorization: Option<CreditControlRequest>,
) -> Result<ClientTransition> {
    if state != ClientState::Open {
        return Ok(Transition::new());
    }

    if let Some(request) = reauthorization
        && request.request_type() == Some(CcRequestType::Update)
    {
        return send_request(data, defaults, state, request);
    }

    let mut t = Transition::new();
    match decide(data, defaults, FailureKind::ValidityTimeout) {
        AccessDecision::Grant => {
            t.notify(ClientNotification::GrantOnValidityExpire)
                .arm(TimerKind::Validity, defaults.validity_time);
        }
        AccessDecision::Deny => {
            t.notify(ClientNotification::DenyOnValidityExpire);
            terminate(data, &mut t);
        }
    }
    Ok(t)
}

fn release(data: &mut SessionData, state: ClientState) -> ClientTransition {
    let mut t = Transition::new();
    if state == ClientState::Terminated {
        return t;
    }
    t.cancel(TimerKind::Tx).cancel(TimerKind::Validity);
    terminate(data, &mut t);
    t
}

fn restore(data: &SessionData, defaults: &RoDefaults, state: ClientState) -> ClientTransition {
    let mut t = Transition::new();
    if state.is_pending() {
        t.arm(TimerKind::Tx, defaults.tx_timer);
    } else if state == ClientState::Open {
        t.arm(
            TimerKind::Validity,
            data.validity_time.unwrap_or(defaults.validity_time),
        );
    }
    t
}

/// Service continues after a granted failure: session dialogues go back to
/// Open on default quota, one-shot dialogues end.
fn continue_after_failure(
    data: &mut SessionData,
    defaults: &RoDefaults,
    state: ClientState,
    t: &mut ClientTransition,
) {
    match state {
        ClientState::PendingEvent | ClientState::PendingTermination => terminate(data, t),
        _ => {
            data.pending_request = None;
            data.retransmitted = false;
            set_state(data, ClientState::Open);
            t.arm(TimerKind::Validity, defaults.validity_time);
        }
    }
}

fn category(data: &SessionData) -> FailureCategory {
    FailureCategory::for_dialogue(data.direct_debiting)
}

fn received_value(data: &SessionData) -> Option<FailureHandling> {
    match category(data) {
        FailureCategory::CreditControl => data.ccfh,
        FailureCategory::DirectDebiting => data.ddfh,
    }
}

fn handling(data: &SessionData, defaults: &RoDefaults) -> FailureHandling {
    policy::effective_handling(received_value(data), category(data), defaults)
}

fn decide(data: &SessionData, defaults: &RoDefaults, kind: FailureKind) -> AccessDecision {
    policy::resolve_failure(received_value(data), kind, category(data), defaults)
}

fn same_request(a: &Message, b: &Message) -> bool {
    a.command_code == b.command_code
        && a.avp_u32(avp::CC_REQUEST_TYPE) == b.avp_u32(avp::CC_REQUEST_TYPE)
        && a.avp_u32(avp::CC_REQUEST_NUMBER) == b.avp_u32(avp::CC_REQUEST_NUMBER)
}
