//! Client representation
//!
//! `Client` models a connected socket and holds the sending side of a
//! per-client channel used by the broker/transport to push frames. The
//! state is advanced by the broker when the connect hook answers.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use super::Session;
use crate::auth::Identity;
use crate::broker::Disconnect;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Pending,
    Connected(Session),
    Rejected(Disconnect),
}

#[derive(Debug)]
pub struct Client {
    pub id: String,
    pub sender: UnboundedSender<WsMessage>,
    pub state: ConnectionState,
}

impl Client {
    /// Create a new pending client with a sender channel. The `id` is a UUID
    /// used to identify the client across broker operations.
    pub fn new(sender: UnboundedSender<WsMessage>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
            state: ConnectionState::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, ConnectionState::Pending)
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            ConnectionState::Connected(session) => Some(session),
            _ => None,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session().map(|s| &s.identity)
    }

    /// Serialize `frame` as a JSON text frame and queue it. Returns false when
    /// the frame could not be encoded or the receiving side is gone.
    pub fn send_json<T: Serialize>(&self, frame: &T) -> bool {
        let text = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize frame for {}: {e}", self.id);
                return false;
            }
        };
        self.sender.send(WsMessage::text(text)).is_ok()
    }
}
