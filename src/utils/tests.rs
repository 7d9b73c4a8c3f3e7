use super::error::{BrokerError, GatewayError};
use super::logging;

#[test]
fn logging_init_accepts_levels() {
    // Should not panic
    logging::init("info");
    logging::init("debug");
    logging::init("warn");
}

#[test]
fn unknown_level_falls_back_to_info() {
    assert_eq!(logging::parse_level("verbose"), tracing::Level::INFO);
    assert_eq!(logging::parse_level("WARNING"), tracing::Level::WARN);
    assert_eq!(logging::parse_level("trace"), tracing::Level::TRACE);
}

#[test]
fn status_codes_follow_error_kind() {
    assert_eq!(GatewayError::InvalidCredential.status_code(), 401);
    assert_eq!(GatewayError::Unauthenticated.status_code(), 401);
    assert_eq!(
        GatewayError::Unauthorized {
            channel: "chat:ops".to_string()
        }
        .status_code(),
        403
    );
    assert_eq!(GatewayError::BadRequest("empty".into()).status_code(), 400);
    assert_eq!(
        GatewayError::from(BrokerError::Unavailable).status_code(),
        503
    );
}

#[test]
fn invalid_credential_message_does_not_leak_cause() {
    assert_eq!(GatewayError::InvalidCredential.to_string(), "invalid token");
}

#[test]
fn broker_failure_is_reported_as_unavailable() {
    let err = GatewayError::from(BrokerError::Unavailable);
    assert_eq!(err.code(), "broker_error");
    assert_eq!(err.to_string(), "broker unavailable");
}
