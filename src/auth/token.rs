//! Token format
//!
//! A credential is `hex(payload) "." hex(signature)` where `payload` is the
//! UTF-8 string `user_id:username:expiry` (expiry in Unix seconds) and
//! `signature` is HMAC-SHA256 of the raw payload bytes under the process
//! secret. Neither hex alphabet contains `.`, so the split is unambiguous.
//! Field values may not contain `:`; `issue` refuses them.

use std::fmt;
use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::Identity;
use crate::utils::GatewayError;

type HmacSha256 = Hmac<Sha256>;

const DELIMITER: char = '.';
const FIELD_SEPARATOR: char = ':';

/// A decoded credential: payload bytes and the signature over them.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Credential {
    /// Split and hex-decode the wire form. Does not check the signature.
    pub fn parse(token: &str) -> Result<Self, GatewayError> {
        let mut parts = token.split(DELIMITER);
        let (Some(payload), Some(signature), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(GatewayError::InvalidCredential);
        };

        let payload = hex::decode(payload).map_err(|_| GatewayError::InvalidCredential)?;
        let signature = hex::decode(signature).map_err(|_| GatewayError::InvalidCredential)?;
        if payload.is_empty() || signature.is_empty() {
            return Err(GatewayError::InvalidCredential);
        }

        Ok(Self { payload, signature })
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{DELIMITER}{}",
            hex::encode(&self.payload),
            hex::encode(&self.signature)
        )
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("payload_len", &self.payload.len())
            .field("signature", &"<redacted>")
            .finish()
    }
}

/// Issues and validates credentials with a single process-wide secret.
///
/// The secret is immutable after construction, so one service can be shared
/// by any number of concurrent validators behind an `Arc`.
#[derive(Clone)]
pub struct TokenService {
    secret: Vec<u8>,
    default_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: impl Into<Vec<u8>>, default_ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a credential valid for `ttl` from now.
    pub fn issue(
        &self,
        user_id: &str,
        username: &str,
        ttl: Duration,
    ) -> Result<Credential, GatewayError> {
        self.issue_at(user_id, username, ttl, chrono::Utc::now().timestamp())
    }

    pub fn issue_at(
        &self,
        user_id: &str,
        username: &str,
        ttl: Duration,
        now: i64,
    ) -> Result<Credential, GatewayError> {
        if user_id.is_empty() || username.is_empty() {
            return Err(GatewayError::BadRequest(
                "user id and username are required".to_string(),
            ));
        }
        if user_id.contains(FIELD_SEPARATOR) || username.contains(FIELD_SEPARATOR) {
            return Err(GatewayError::BadRequest(format!(
                "user id and username may not contain '{FIELD_SEPARATOR}'"
            )));
        }

        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expiry = now.saturating_add(ttl_secs);
        let payload = format!("{user_id}{FIELD_SEPARATOR}{username}{FIELD_SEPARATOR}{expiry}")
            .into_bytes();
        let signature = self.sign(&payload)?;

        Ok(Credential { payload, signature })
    }

    /// Validate a wire-form credential against the current time.
    pub fn validate(&self, token: &str) -> Result<Identity, GatewayError> {
        self.validate_at(token, chrono::Utc::now().timestamp())
    }

    /// Validate against an explicit clock reading (Unix seconds).
    ///
    /// Every failure is `InvalidCredential`.
    pub fn validate_at(&self, token: &str, now: i64) -> Result<Identity, GatewayError> {
        let credential = Credential::parse(token)?;

        let mut mac = self.mac()?;
        mac.update(&credential.payload);
        // constant time
        mac.verify_slice(&credential.signature)
            .map_err(|_| GatewayError::InvalidCredential)?;

        let payload =
            std::str::from_utf8(&credential.payload).map_err(|_| GatewayError::InvalidCredential)?;
        let fields: Vec<&str> = payload.split(FIELD_SEPARATOR).collect();
        let [user_id, username, expiry] = fields.as_slice() else {
            return Err(GatewayError::InvalidCredential);
        };
        let expiry: i64 = expiry
            .parse()
            .map_err(|_| GatewayError::InvalidCredential)?;

        if expiry <= now {
            return Err(GatewayError::InvalidCredential);
        }
        if user_id.is_empty() || username.is_empty() {
            return Err(GatewayError::InvalidCredential);
        }

        Ok(Identity::new(*user_id, *username))
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, GatewayError> {
        let mut mac = self.mac()?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn mac(&self) -> Result<HmacSha256, GatewayError> {
        // HMAC accepts keys of any length
        HmacSha256::new_from_slice(&self.secret).map_err(|_| GatewayError::InvalidCredential)
    }
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("secret", &"<redacted>")
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

/// Drop an optional `Bearer ` scheme prefix and surrounding whitespace.
pub fn strip_bearer(value: &str) -> &str {
    let value = value.trim();
    value.strip_prefix("Bearer ").unwrap_or(value).trim()
}
