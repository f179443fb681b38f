//! Typed Ro application events
//!
//! Each view wraps a generic [`Message`] and exposes the fields the session
//! state machines need. Views are immutable; accessors return `None` when a
//! field is absent rather than failing, malformed content is the decoder's
//! problem.

use rocc_util::{ApplicationId, SessionId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::avp;
use crate::{Avp, CcRequestType, FailureHandling, Message, RequestedAction};

/// Credit-Control-Request view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditControlRequest {
    message: Message,
}

impl CreditControlRequest {
    /// Build an outbound CCR
    pub fn new(
        session_id: &SessionId,
        application_id: ApplicationId,
        request_type: CcRequestType,
        request_number: u32,
    ) -> Self {
        let message = Message::request(avp::cmd::CREDIT_CONTROL, application_id, session_id)
            .with_avp(Avp::unsigned32(avp::CC_REQUEST_TYPE, request_type.value()))
            .with_avp(Avp::unsigned32(avp::CC_REQUEST_NUMBER, request_number));
        Self { message }
    }

    pub fn from_message(message: Message) -> Self {
        Self { message }
    }

    pub fn with_avp(self, avp: Avp) -> Self {
        Self {
            message: self.message.with_avp(avp),
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.message.session_id()
    }

    pub fn request_type(&self) -> Option<CcRequestType> {
        self.message
            .avp_u32(avp::CC_REQUEST_TYPE)
            .and_then(CcRequestType::from_value)
    }

    pub fn request_number(&self) -> Option<u32> {
        self.message.avp_u32(avp::CC_REQUEST_NUMBER)
    }

    pub fn requested_action(&self) -> Option<RequestedAction> {
        self.message
            .avp_u32(avp::REQUESTED_ACTION)
            .and_then(RequestedAction::from_value)
    }

    /// Event request debiting the account directly. An event request without
    /// Requested-Action defaults to DIRECT_DEBITING.
    pub fn is_direct_debiting(&self) -> bool {
        self.request_type() == Some(CcRequestType::Event)
            && matches!(
                self.requested_action(),
                None | Some(RequestedAction::DirectDebiting)
            )
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }
}

/// Credit-Control-Answer view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditControlAnswer {
    message: Message,
}

impl CreditControlAnswer {
    /// Build the answer to `request` with the given Result-Code
    pub fn to(request: &CreditControlRequest, result_code: u32) -> Self {
        let mut message = Message::answer_to(request.message(), result_code);
        if let Some(request_type) = request.message().avp(avp::CC_REQUEST_TYPE) {
            message.avps.push(request_type.clone());
        }
        if let Some(number) = request.message().avp(avp::CC_REQUEST_NUMBER) {
            message.avps.push(number.clone());
        }
        Self { message }
    }

    pub fn success(request: &CreditControlRequest) -> Self {
        Self::to(request, avp::result::SUCCESS)
    }

    pub fn from_message(message: Message) -> Self {
        Self { message }
    }

    pub fn with_validity_time(self, seconds: u32) -> Self {
        Self {
            message: self
                .message
                .with_avp(Avp::unsigned32(avp::VALIDITY_TIME, seconds)),
        }
    }

    pub fn with_credit_control_failure_handling(self, value: FailureHandling) -> Self {
        Self {
            message: self.message.with_avp(Avp::unsigned32(
                avp::CREDIT_CONTROL_FAILURE_HANDLING,
                value.ccfh_value(),
            )),
        }
    }

    pub fn with_direct_debiting_failure_handling(self, value: FailureHandling) -> Self {
        let ddfh = match value {
            FailureHandling::Continue => 1,
            _ => 0,
        };
        Self {
            message: self
                .message
                .with_avp(Avp::unsigned32(avp::DIRECT_DEBITING_FAILURE_HANDLING, ddfh)),
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.message.session_id()
    }

    pub fn result_code(&self) -> Option<u32> {
        self.message.result_code()
    }

    /// An answer without Result-Code is not treated as a success
    pub fn is_success(&self) -> bool {
        self.result_code().is_some_and(avp::result::is_success)
    }

    pub fn request_type(&self) -> Option<CcRequestType> {
        self.message
            .avp_u32(avp::CC_REQUEST_TYPE)
            .and_then(CcRequestType::from_value)
    }

    pub fn request_number(&self) -> Option<u32> {
        self.message.avp_u32(avp::CC_REQUEST_NUMBER)
    }

    pub fn credit_control_failure_handling(&self) -> Option<FailureHandling> {
        self.message
            .avp_u32(avp::CREDIT_CONTROL_FAILURE_HANDLING)
            .and_then(FailureHandling::from_ccfh)
    }

    pub fn direct_debiting_failure_handling(&self) -> Option<FailureHandling> {
        self.message
            .avp_u32(avp::DIRECT_DEBITING_FAILURE_HANDLING)
            .and_then(FailureHandling::from_ddfh)
    }

    /// Validity-Time at top level, or in the first Multiple-Services-Credit-Control.
    /// A zero Validity-Time counts as absent.
    pub fn validity_time(&self) -> Option<Duration> {
        self.message
            .avp_u32(avp::VALIDITY_TIME)
            .filter(|secs| *secs > 0)
            .or_else(|| {
                self.message
                    .avps
                    .iter()
                    .filter(|a| a.code == avp::MULTIPLE_SERVICES_CREDIT_CONTROL)
                    .filter_map(|mscc| mscc.child(avp::VALIDITY_TIME).and_then(Avp::as_u32))
                    .find(|secs| *secs > 0)
            })
            .map(|secs| Duration::from_secs(u64::from(secs)))
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }
}

/// Re-Auth-Request view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReAuthRequest {
    message: Message,
}

impl ReAuthRequest {
    /// Re-Auth-Request-Type AUTHORIZE_ONLY
    pub const AUTHORIZE_ONLY: u32 = 0;

    pub fn new(session_id: &SessionId, application_id: ApplicationId) -> Self {
        let message = Message::request(avp::cmd::RE_AUTH, application_id, session_id)
            .with_avp(Avp::unsigned32(avp::RE_AUTH_REQUEST_TYPE, Self::AUTHORIZE_ONLY));
        Self { message }
    }

    pub fn from_message(message: Message) -> Self {
        Self { message }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.message.session_id()
    }

    pub fn re_auth_request_type(&self) -> Option<u32> {
        self.message.avp_u32(avp::RE_AUTH_REQUEST_TYPE)
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }
}

/// Re-Auth-Answer view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReAuthAnswer {
    message: Message,
}

impl ReAuthAnswer {
    pub fn to(request: &ReAuthRequest, result_code: u32) -> Self {
        Self {
            message: Message::answer_to(request.message(), result_code),
        }
    }

    pub fn from_message(message: Message) -> Self {
        Self { message }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.message.session_id()
    }

    pub fn result_code(&self) -> Option<u32> {
        self.message.result_code()
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }
}

/// Inbound message classified into a typed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    CreditControlRequest(CreditControlRequest),
    CreditControlAnswer(CreditControlAnswer),
    ReAuthRequest(ReAuthRequest),
    ReAuthAnswer(ReAuthAnswer),
    /// Any other command on the session (extensions)
    Other(Message),
}

impl AppEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::CreditControlRequest(_) => "CCR",
            AppEvent::CreditControlAnswer(_) => "CCA",
            AppEvent::ReAuthRequest(_) => "RAR",
            AppEvent::ReAuthAnswer(_) => "RAA",
            AppEvent::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ccr(request_type: CcRequestType) -> CreditControlRequest {
        CreditControlRequest::new(
            &SessionId::new("pgw;1;1"),
            ApplicationId::CREDIT_CONTROL,
            request_type,
            0,
        )
    }

    #[test]
    fn ccr_fields() {
        let req = ccr(CcRequestType::Initial);
        assert_eq!(req.request_type(), Some(CcRequestType::Initial));
        assert_eq!(req.request_number(), Some(0));
        assert!(!req.is_direct_debiting());
    }

    #[test]
    fn event_without_action_is_direct_debiting() {
        assert!(ccr(CcRequestType::Event).is_direct_debiting());

        let balance = ccr(CcRequestType::Event).with_avp(Avp::unsigned32(avp::REQUESTED_ACTION, 2));
        assert_eq!(balance.requested_action(), Some(RequestedAction::CheckBalance));
        assert!(!balance.is_direct_debiting());
    }

    #[test]
    fn cca_echoes_request_type_and_carries_policy() {
        let req = ccr(CcRequestType::Update);
        let ans = CreditControlAnswer::success(&req)
            .with_validity_time(90)
            .with_credit_control_failure_handling(FailureHandling::Continue);

        assert!(ans.is_success());
        assert_eq!(ans.request_type(), Some(CcRequestType::Update));
        assert_eq!(ans.validity_time(), Some(Duration::from_secs(90)));
        assert_eq!(
            ans.credit_control_failure_handling(),
            Some(FailureHandling::Continue)
        );
        assert_eq!(ans.direct_debiting_failure_handling(), None);
    }

    #[test]
    fn cca_validity_time_from_mscc() {
        let req = ccr(CcRequestType::Initial);
        let mut message = CreditControlAnswer::success(&req).into_message();
        message.avps.push(Avp::grouped(
            avp::MULTIPLE_SERVICES_CREDIT_CONTROL,
            vec![Avp::unsigned32(avp::VALIDITY_TIME, 45)],
        ));

        let ans = CreditControlAnswer::from_message(message);
        assert_eq!(ans.validity_time(), Some(Duration::from_secs(45)));
    }

    #[test]
    fn cca_zero_validity_time_is_absent() {
        let req = ccr(CcRequestType::Initial);
        assert_eq!(
            CreditControlAnswer::success(&req)
                .with_validity_time(0)
                .validity_time(),
            None
        );

        let mut message = CreditControlAnswer::success(&req)
            .with_validity_time(0)
            .into_message();
        message.avps.push(Avp::grouped(
            avp::MULTIPLE_SERVICES_CREDIT_CONTROL,
            vec![Avp::unsigned32(avp::VALIDITY_TIME, 20)],
        ));
        let ans = CreditControlAnswer::from_message(message);
        assert_eq!(ans.validity_time(), Some(Duration::from_secs(20)));
    }

    #[test]
    fn cca_without_result_code_is_not_success() {
        let req = ccr(CcRequestType::Initial);
        let mut message = CreditControlAnswer::success(&req).into_message();
        message.avps.retain(|a| a.code != avp::RESULT_CODE);
        assert!(!CreditControlAnswer::from_message(message).is_success());
    }

    #[test]
    fn re_auth_round_trip_fields() {
        let rar = ReAuthRequest::new(&SessionId::new("pgw;1;1"), ApplicationId::CREDIT_CONTROL);
        assert_eq!(rar.re_auth_request_type(), Some(ReAuthRequest::AUTHORIZE_ONLY));

        let raa = ReAuthAnswer::to(&rar, avp::result::SUCCESS);
        assert_eq!(raa.result_code(), Some(2001));
        assert_eq!(raa.session_id(), rar.session_id());
    }
}
