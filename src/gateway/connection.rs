//! Connect handshake.
//!
//! [`ConnectionGate::handle`] is called once per connection attempt, before
//! any channel interaction. A rejection is terminal: the transport closes the
//! socket and the client has to reconnect with a fresh credential.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use super::authorizer::{self, ChannelAction, ChannelAuthorizer};
use crate::auth::{TokenService, strip_bearer};
use crate::broker::{ConnectReply, Disconnect};

pub struct ConnectionGate {
    tokens: Arc<TokenService>,
    authorizer: Arc<dyn ChannelAuthorizer>,
    default_channels: Vec<String>,
}

impl ConnectionGate {
    pub fn new(
        tokens: Arc<TokenService>,
        authorizer: Arc<dyn ChannelAuthorizer>,
        default_channels: Vec<String>,
    ) -> Self {
        Self {
            tokens,
            authorizer,
            default_channels,
        }
    }

    /// Validate the handshake credential and build the accept reply.
    ///
    /// Default channels the authorizer refuses for this identity are left out
    /// of the reply rather than failing the connection.
    pub fn handle(&self, token: &str) -> Result<ConnectReply, Disconnect> {
        let token = strip_bearer(token);
        if token.is_empty() {
            warn!("Connection attempt without token");
            return Err(Disconnect::INVALID_TOKEN);
        }

        let identity = match self.tokens.validate(token) {
            Ok(identity) => identity,
            Err(_) => {
                warn!("Connection rejected: invalid token");
                return Err(Disconnect::INVALID_TOKEN);
            }
        };

        let subscriptions = self
            .default_channels
            .iter()
            .filter(|channel| {
                authorizer::check(
                    self.authorizer.as_ref(),
                    &identity,
                    channel.as_str(),
                    ChannelAction::Subscribe,
                )
            })
            .cloned()
            .collect();

        info!(
            user_id = %identity.user_id,
            username = %identity.username,
            "User connected"
        );

        Ok(ConnectReply {
            data: json!({
                "user_id": identity.user_id,
                "username": identity.username,
            }),
            identity,
            subscriptions,
        })
    }
}
