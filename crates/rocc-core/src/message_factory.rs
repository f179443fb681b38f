//! Typed views over generic messages

use rocc_api::avp;
use rocc_api::{
    AppEvent, CreditControlAnswer, CreditControlRequest, Message, ReAuthAnswer, ReAuthRequest,
};

/// Builds typed application events from decoded messages.
///
/// Construction never validates beyond field presence; a message missing
/// fields still yields a view whose accessors return `None`.
pub trait RoMessageFactory: Send + Sync {
    fn create_credit_control_request(&self, message: Message) -> CreditControlRequest {
        CreditControlRequest::from_message(message)
    }

    fn create_credit_control_answer(&self, message: Message) -> CreditControlAnswer {
        CreditControlAnswer::from_message(message)
    }

    fn create_re_auth_request(&self, message: Message) -> ReAuthRequest {
        ReAuthRequest::from_message(message)
    }

    fn create_re_auth_answer(&self, message: Message) -> ReAuthAnswer {
        ReAuthAnswer::from_message(message)
    }

    /// Classify by command code and request flag
    fn classify(&self, message: Message) -> AppEvent {
        match (message.command_code, message.is_request) {
            (avp::cmd::CREDIT_CONTROL, true) => {
                AppEvent::CreditControlRequest(self.create_credit_control_request(message))
            }
            (avp::cmd::CREDIT_CONTROL, false) => {
                AppEvent::CreditControlAnswer(self.create_credit_control_answer(message))
            }
            (avp::cmd::RE_AUTH, true) => {
                AppEvent::ReAuthRequest(self.create_re_auth_request(message))
            }
            (avp::cmd::RE_AUTH, false) => {
                AppEvent::ReAuthAnswer(self.create_re_auth_answer(message))
            }
            _ => AppEvent::Other(message),
        }
    }
}

/// Stateless factory producing the stock views
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMessageFactory;

impl RoMessageFactory for DefaultMessageFactory {}

#[cfg(test)]
mod tests {
    use super::*;
    use rocc_api::CcRequestType;
    use rocc_util::{ApplicationId, SessionId};

    #[test]
    fn classify_by_command_and_flag() {
        let factory = DefaultMessageFactory;
        let id = SessionId::new("pgw;1;1");
        let ccr = CreditControlRequest::new(&id, ApplicationId::CREDIT_CONTROL, CcRequestType::Initial, 0);
        let cca = CreditControlAnswer::success(&ccr);
        let rar = ReAuthRequest::new(&id, ApplicationId::CREDIT_CONTROL);
        let raa = ReAuthAnswer::to(&rar, 2001);

        assert!(matches!(
            factory.classify(ccr.into_message()),
            AppEvent::CreditControlRequest(_)
        ));
        assert!(matches!(
            factory.classify(cca.into_message()),
            AppEvent::CreditControlAnswer(_)
        ));
        assert!(matches!(factory.classify(rar.into_message()), AppEvent::ReAuthRequest(_)));
        assert!(matches!(factory.classify(raa.into_message()), AppEvent::ReAuthAnswer(_)));
    }

    #[test]
    fn unknown_command_is_other() {
        // Accounting-Request
        let msg = Message::request(271, ApplicationId::CREDIT_CONTROL, &SessionId::new("s"));
        assert!(matches!(DefaultMessageFactory.classify(msg), AppEvent::Other(_)));
    }

    #[test]
    fn views_do_not_mutate_message() {
        let msg = Message::request(
            avp::cmd::CREDIT_CONTROL,
            ApplicationId::CREDIT_CONTROL,
            &SessionId::new("s"),
        );
        let view = DefaultMessageFactory.create_credit_control_request(msg.clone());
        assert_eq!(view.request_type(), None);
        assert_eq!(view.message(), &msg);
    }
}
