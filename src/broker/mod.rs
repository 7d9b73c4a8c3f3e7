//! Broker capability and the in-process broker.
//!
//! The gateway core only talks to a broker through the [`Broker`] trait:
//! publish a payload to a channel, and register the hooks the broker calls
//! when a client connects or asks to subscribe. [`LocalBroker`] is the
//! in-process implementation the bundled transports run on.

pub mod engine;
pub mod topic;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::auth::Identity;
use crate::utils::{BrokerError, GatewayError};

pub use engine::{BrokerEngine, LocalBroker, close_frame};

/// Position of a publication in its channel stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SequenceInfo {
    /// Per-channel offset, starting at 1; 0 when nobody was subscribed.
    pub offset: u64,
    /// Subscribers the publication was queued for.
    pub delivered: usize,
}

/// Raised once per connection attempt.
#[derive(Debug, Clone, Copy)]
pub struct ConnectEvent<'a> {
    pub client_id: &'a str,
    pub token: &'a str,
}

/// Accept outcome of the connect hook.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectReply {
    pub identity: Identity,
    /// Connection data shown to the client.
    pub data: serde_json::Value,
    /// Server-side subscriptions applied before any client request.
    pub subscriptions: Vec<String>,
}

/// Raised when a connected client asks to join a channel.
#[derive(Debug, Clone, Copy)]
pub struct SubscribeEvent<'a> {
    pub client_id: &'a str,
    pub identity: &'a Identity,
    pub channel: &'a str,
}

pub type ConnectHook =
    Arc<dyn Fn(ConnectEvent<'_>) -> Result<ConnectReply, Disconnect> + Send + Sync>;

pub type SubscribeHook =
    Arc<dyn Fn(SubscribeEvent<'_>) -> Result<(), GatewayError> + Send + Sync>;

/// Terminal reason for closing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnect {
    pub code: u16,
    pub reason: &'static str,
}

impl Disconnect {
    pub const SHUTDOWN: Disconnect = Disconnect {
        code: 3001,
        reason: "shutdown",
    };
    pub const SERVER_ERROR: Disconnect = Disconnect {
        code: 3004,
        reason: "internal server error",
    };
    pub const INVALID_TOKEN: Disconnect = Disconnect {
        code: 3500,
        reason: "invalid token",
    };
    pub const BAD_REQUEST: Disconnect = Disconnect {
        code: 3501,
        reason: "bad request",
    };
}

impl fmt::Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason, self.code)
    }
}

/// What the gateway core needs from a broker.
pub trait Broker: Send + Sync {
    /// Fan `payload` out to every current subscriber of `channel`.
    ///
    /// Returns once the payload is queued; delivery is not awaited.
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<SequenceInfo, BrokerError>;

    fn on_connect(&self, hook: ConnectHook);

    fn on_subscribe_attempt(&self, hook: SubscribeHook);
}
