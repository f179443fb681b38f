//! Diameter command, AVP and result codes used by the Ro application
//! (RFC 6733, RFC 4006, 3GPP TS 32.299)

/// Command codes
pub mod cmd {
    /// Re-Auth-Request/Answer
    pub const RE_AUTH: u32 = 258;
    /// Credit-Control-Request/Answer
    pub const CREDIT_CONTROL: u32 = 272;
}

/// Session-Id
pub const SESSION_ID: u32 = 263;
/// Origin-Host
pub const ORIGIN_HOST: u32 = 264;
/// Result-Code
pub const RESULT_CODE: u32 = 268;
/// Auth-Application-Id
pub const AUTH_APPLICATION_ID: u32 = 258;
/// Re-Auth-Request-Type
pub const RE_AUTH_REQUEST_TYPE: u32 = 285;
/// Origin-Realm
pub const ORIGIN_REALM: u32 = 296;
/// Destination-Realm
pub const DESTINATION_REALM: u32 = 283;
/// CC-Request-Number
pub const CC_REQUEST_NUMBER: u32 = 415;
/// CC-Request-Type
pub const CC_REQUEST_TYPE: u32 = 416;
/// Credit-Control-Failure-Handling
pub const CREDIT_CONTROL_FAILURE_HANDLING: u32 = 427;
/// Direct-Debiting-Failure-Handling
pub const DIRECT_DEBITING_FAILURE_HANDLING: u32 = 428;
/// Granted-Service-Unit
pub const GRANTED_SERVICE_UNIT: u32 = 431;
/// Requested-Action
pub const REQUESTED_ACTION: u32 = 436;
/// Validity-Time
pub const VALIDITY_TIME: u32 = 448;
/// Multiple-Services-Credit-Control
pub const MULTIPLE_SERVICES_CREDIT_CONTROL: u32 = 456;
/// Reporting-Reason
pub const REPORTING_REASON: u32 = 872;

/// Result-Code values
pub mod result {
    /// DIAMETER_SUCCESS
    pub const SUCCESS: u32 = 2001;
    /// DIAMETER_UNABLE_TO_DELIVER
    pub const UNABLE_TO_DELIVER: u32 = 3002;
    /// DIAMETER_TOO_BUSY
    pub const TOO_BUSY: u32 = 3004;
    /// DIAMETER_END_USER_SERVICE_DENIED
    pub const END_USER_SERVICE_DENIED: u32 = 4010;
    /// DIAMETER_CREDIT_CONTROL_NOT_APPLICABLE
    pub const CREDIT_CONTROL_NOT_APPLICABLE: u32 = 4011;
    /// DIAMETER_CREDIT_LIMIT_REACHED
    pub const CREDIT_LIMIT_REACHED: u32 = 4012;
    /// DIAMETER_UNKNOWN_SESSION_ID
    pub const UNKNOWN_SESSION_ID: u32 = 5002;
    /// DIAMETER_USER_UNKNOWN
    pub const USER_UNKNOWN: u32 = 5030;

    /// 2xxx codes indicate success
    pub fn is_success(code: u32) -> bool {
        (2000..3000).contains(&code)
    }
}

/// Reporting-Reason values used when re-authorizing
pub mod reporting_reason {
    pub const QUOTA_EXHAUSTED: u32 = 3;
    pub const VALIDITY_TIME: u32 = 4;
    pub const FORCED_REAUTHORISATION: u32 = 7;
}
