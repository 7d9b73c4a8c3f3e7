use serde::{Deserialize, Serialize};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::Disconnect;
use crate::gateway::Message;
use crate::utils::GatewayError;

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "connect")]
    Connect {
        #[serde(default)]
        token: String,
    },
    #[serde(rename = "subscribe")]
    Subscribe { channel: String },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { channel: String },
    #[serde(rename = "publish")]
    Publish { channel: String, content: String },
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "connected")]
    Connected {
        client: String,
        data: serde_json::Value,
        subscriptions: Vec<String>,
    },
    #[serde(rename = "subscribed")]
    Subscribed { channel: String },
    #[serde(rename = "unsubscribed")]
    Unsubscribed { channel: String },
    #[serde(rename = "published")]
    Published { message: Message },
    #[serde(rename = "publication")]
    Publication {
        channel: String,
        offset: u64,
        data: serde_json::Value,
    },
    #[serde(rename = "error")]
    Error { code: String, message: String },
    #[serde(rename = "disconnect")]
    Disconnect { code: u16, reason: String },
}

impl ServerMessage {
    pub fn error(err: &GatewayError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn disconnect(disconnect: Disconnect) -> Self {
        ServerMessage::Disconnect {
            code: disconnect.code,
            reason: disconnect.reason.to_string(),
        }
    }

    /// Encode as a WebSocket text frame.
    pub fn to_ws(&self) -> Option<WsMessage> {
        serde_json::to_string(self).ok().map(WsMessage::text)
    }
}
