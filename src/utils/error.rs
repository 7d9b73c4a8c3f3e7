//! Error types shared by the gateway core, the broker and the transports.
//!
//! Credential failures of every kind (bad shape, bad signature, expiry)
//! collapse into [`GatewayError::InvalidCredential`] so callers cannot tell
//! which check rejected a token.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid token")]
    InvalidCredential,

    #[error("authentication required")]
    Unauthenticated,

    #[error("not allowed on channel {channel}")]
    Unauthorized { channel: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl GatewayError {
    /// Short machine-readable code used in protocol error frames.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidCredential => "invalid_token",
            GatewayError::Unauthenticated => "unauthenticated",
            GatewayError::Unauthorized { .. } => "unauthorized",
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::Broker(_) => "broker_error",
        }
    }

    /// HTTP status equivalent of this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidCredential | GatewayError::Unauthenticated => 401,
            GatewayError::Unauthorized { .. } => 403,
            GatewayError::BadRequest(_) => 400,
            GatewayError::Broker(_) => 503,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("broker unavailable")]
    Unavailable,
}
