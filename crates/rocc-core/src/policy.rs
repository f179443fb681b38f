//! Failure-handling policy
//!
//! Decides whether service continues (grant) or stops (deny) when a
//! credit-control exchange fails. Pure functions of the received
//! failure-handling value and the configured defaults.

use rocc_api::FailureHandling;
use rocc_config::RoDefaults;

/// Outcome of a failure-handling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Grant,
    Deny,
}

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The request could not be handed to the transport
    SendFailure,
    /// Tx expired without an answer
    AnswerTimeout,
    /// Granted quota expired and no re-authorization was produced
    ValidityTimeout,
    /// The answer carried a failure Result-Code
    FailureAnswer,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::SendFailure => "send_failure",
            FailureKind::AnswerTimeout => "answer_timeout",
            FailureKind::ValidityTimeout => "validity_timeout",
            FailureKind::FailureAnswer => "failure_answer",
        }
    }
}

/// Which failure-handling value governs a dialogue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// Session-based credit control, governed by CCFH
    CreditControl,
    /// Event-based direct debiting, governed by DDFH
    DirectDebiting,
}

impl FailureCategory {
    pub fn for_dialogue(direct_debiting: bool) -> Self {
        if direct_debiting {
            FailureCategory::DirectDebiting
        } else {
            FailureCategory::CreditControl
        }
    }
}

/// The received value, or the configured default for the category
pub fn effective_handling(
    value: Option<FailureHandling>,
    category: FailureCategory,
    defaults: &RoDefaults,
) -> FailureHandling {
    value.unwrap_or(match category {
        FailureCategory::CreditControl => defaults.credit_control_failure_handling,
        FailureCategory::DirectDebiting => defaults.direct_debiting_failure_handling,
    })
}

/// Grant or deny continued service after a failure of the given kind
pub fn resolve_failure(
    value: Option<FailureHandling>,
    kind: FailureKind,
    category: FailureCategory,
    defaults: &RoDefaults,
) -> AccessDecision {
    match effective_handling(value, category, defaults) {
        FailureHandling::Terminate => AccessDecision::Deny,
        FailureHandling::Continue => AccessDecision::Grant,
        FailureHandling::RetryAndTerminate => match kind {
            FailureKind::AnswerTimeout => AccessDecision::Grant,
            _ => AccessDecision::Deny,
        },
    }
}

/// Whether the outstanding request should be re-sent with the T flag
pub fn should_retransmit(
    handling: FailureHandling,
    kind: FailureKind,
    already_retransmitted: bool,
) -> bool {
    handling == FailureHandling::RetryAndTerminate
        && kind == FailureKind::AnswerTimeout
        && !already_retransmitted
}
