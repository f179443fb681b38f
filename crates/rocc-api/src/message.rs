//! Generic Diameter message model
//!
//! Decoding happens in the transport layer; by the time a message reaches the
//! session layer it is a header plus an ordered AVP list. The session layer
//! only looks fields up, it never re-encodes.

use rocc_util::{ApplicationId, SessionId};
use serde::{Deserialize, Serialize};

use crate::avp;

/// AVP payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AvpValue {
    Unsigned32(u32),
    Unsigned64(u64),
    Integer32(i32),
    Utf8String(String),
    OctetString(Vec<u8>),
    Grouped(Vec<Avp>),
}

/// A single attribute-value pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avp {
    pub code: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<u32>,
    pub value: AvpValue,
}

impl Avp {
    pub fn new(code: u32, value: AvpValue) -> Self {
        Self {
            code,
            vendor_id: None,
            value,
        }
    }

    pub fn unsigned32(code: u32, value: u32) -> Self {
        Self::new(code, AvpValue::Unsigned32(value))
    }

    pub fn utf8(code: u32, value: impl Into<String>) -> Self {
        Self::new(code, AvpValue::Utf8String(value.into()))
    }

    pub fn grouped(code: u32, avps: Vec<Avp>) -> Self {
        Self::new(code, AvpValue::Grouped(avps))
    }

    /// Integer view of Unsigned32/Integer32 (Enumerated) payloads
    pub fn as_u32(&self) -> Option<u32> {
        match self.value {
            AvpValue::Unsigned32(v) => Some(v),
            AvpValue::Integer32(v) => u32::try_from(v).ok(),
            AvpValue::Unsigned64(v) => u32::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            AvpValue::Utf8String(s) => Some(s),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Avp] {
        match &self.value {
            AvpValue::Grouped(avps) => avps,
            _ => &[],
        }
    }

    /// First child AVP with the given code (grouped AVPs only)
    pub fn child(&self, code: u32) -> Option<&Avp> {
        self.children().iter().find(|a| a.code == code)
    }
}

/// Decoded Diameter message (request or answer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub command_code: u32,
    pub application_id: ApplicationId,
    pub is_request: bool,
    /// T flag: set on requests re-sent after a failover or timeout
    #[serde(default)]
    pub is_retransmission: bool,
    pub hop_by_hop_id: u32,
    pub end_to_end_id: u32,
    pub avps: Vec<Avp>,
}

impl Message {
    /// Build a request carrying the given Session-Id
    pub fn request(command_code: u32, application_id: ApplicationId, session_id: &SessionId) -> Self {
        Self {
            command_code,
            application_id,
            is_request: true,
            is_retransmission: false,
            hop_by_hop_id: 0,
            end_to_end_id: 0,
            avps: vec![
                Avp::utf8(avp::SESSION_ID, session_id.as_str()),
                Avp::unsigned32(avp::AUTH_APPLICATION_ID, application_id.value()),
            ],
        }
    }

    /// Build the answer to `request` with the given Result-Code
    pub fn answer_to(request: &Message, result_code: u32) -> Self {
        let mut avps = Vec::new();
        if let Some(session_id) = request.avp(avp::SESSION_ID) {
            avps.push(session_id.clone());
        }
        avps.push(Avp::unsigned32(avp::RESULT_CODE, result_code));
        if let Some(app) = request.avp(avp::AUTH_APPLICATION_ID) {
            avps.push(app.clone());
        }

        Self {
            command_code: request.command_code,
            application_id: request.application_id,
            is_request: false,
            is_retransmission: false,
            hop_by_hop_id: request.hop_by_hop_id,
            end_to_end_id: request.end_to_end_id,
            avps,
        }
    }

    pub fn with_avp(mut self, avp: Avp) -> Self {
        self.avps.push(avp);
        self
    }

    /// First top-level AVP with the given code
    pub fn avp(&self, code: u32) -> Option<&Avp> {
        self.avps.iter().find(|a| a.code == code)
    }

    pub fn avp_u32(&self, code: u32) -> Option<u32> {
        self.avp(code).and_then(Avp::as_u32)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.avp(avp::SESSION_ID)
            .and_then(Avp::as_str)
            .map(SessionId::from)
    }

    pub fn result_code(&self) -> Option<u32> {
        self.avp_u32(avp::RESULT_CODE)
    }

    /// Copy of this request flagged for retransmission
    pub fn as_retransmission(&self) -> Self {
        let mut copy = self.clone();
        copy.is_retransmission = true;
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_session_id() {
        let session_id = SessionId::new("pgw;1;1");
        let msg = Message::request(avp::cmd::CREDIT_CONTROL, ApplicationId::CREDIT_CONTROL, &session_id);

        assert!(msg.is_request);
        assert_eq!(msg.session_id(), Some(session_id));
        assert_eq!(msg.avp_u32(avp::AUTH_APPLICATION_ID), Some(4));
    }

    #[test]
    fn answer_correlates_with_request() {
        let session_id = SessionId::new("pgw;1;2");
        let mut req = Message::request(avp::cmd::CREDIT_CONTROL, ApplicationId::CREDIT_CONTROL, &session_id);
        req.hop_by_hop_id = 7;
        req.end_to_end_id = 9;

        let ans = Message::answer_to(&req, avp::result::SUCCESS);
        assert!(!ans.is_request);
        assert_eq!(ans.session_id(), Some(session_id));
        assert_eq!(ans.result_code(), Some(2001));
        assert_eq!((ans.hop_by_hop_id, ans.end_to_end_id), (7, 9));
    }

    #[test]
    fn grouped_child_lookup() {
        let mscc = Avp::grouped(
            avp::MULTIPLE_SERVICES_CREDIT_CONTROL,
            vec![Avp::unsigned32(avp::VALIDITY_TIME, 120)],
        );
        assert_eq!(mscc.child(avp::VALIDITY_TIME).and_then(Avp::as_u32), Some(120));
        assert!(mscc.child(avp::RESULT_CODE).is_none());
    }

    #[test]
    fn retransmission_sets_t_flag_only_on_copy() {
        let req = Message::request(avp::cmd::CREDIT_CONTROL, ApplicationId::CREDIT_CONTROL, &SessionId::new("s"));
        let again = req.as_retransmission();
        assert!(again.is_retransmission);
        assert!(!req.is_retransmission);
    }
}
