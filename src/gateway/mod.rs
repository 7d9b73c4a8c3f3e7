//! Gateway core
//!
//! Everything that decides who may connect, subscribe and publish:
//!
//! - [`ConnectionGate`]: validates the handshake credential and builds the
//!   accept reply.
//! - [`ChannelAuthorizer`]: per-channel policy, allow-all by default.
//! - [`PublishPipeline`]: checks, stamps and forwards outbound messages.
//!
//! [`Gateway`] bundles the three around one [`TokenService`] and is what the
//! transports and the broker hooks call into.

pub mod authorizer;
pub mod connection;
pub mod message;
pub mod publish;

use std::sync::{Arc, Weak};
use std::time::Duration;

pub use authorizer::{AllowAll, ChannelAction, ChannelAuthorizer, OwnedNamespace};
pub use connection::ConnectionGate;
pub use message::Message;
pub use publish::{MessageIdGenerator, PublishPipeline};

use crate::auth::{Credential, Identity, TokenService};
use crate::broker::{
    Broker, ConnectEvent, ConnectHook, ConnectReply, Disconnect, SubscribeEvent, SubscribeHook,
};
use crate::config::Settings;
use crate::utils::GatewayError;

pub struct Gateway {
    tokens: Arc<TokenService>,
    authorizer: Arc<dyn ChannelAuthorizer>,
    gate: ConnectionGate,
    pipeline: PublishPipeline,
}

impl Gateway {
    pub fn new(
        tokens: Arc<TokenService>,
        broker: Arc<dyn Broker>,
        authorizer: Arc<dyn ChannelAuthorizer>,
        default_channels: Vec<String>,
    ) -> Self {
        Self {
            gate: ConnectionGate::new(tokens.clone(), authorizer.clone(), default_channels),
            pipeline: PublishPipeline::new(broker, authorizer.clone()),
            tokens,
            authorizer,
        }
    }

    pub fn from_settings(settings: &Settings, broker: Arc<dyn Broker>) -> Self {
        let tokens = Arc::new(TokenService::new(
            settings.auth.secret.as_bytes(),
            Duration::from_secs(settings.auth.token_ttl_secs),
        ));
        Self::new(
            tokens,
            broker,
            authorizer::from_settings(&settings.gateway),
            settings.gateway.default_channels.clone(),
        )
    }

    /// Register the connect and subscribe hooks on `broker`.
    ///
    /// The hooks hold a weak reference, so the broker does not keep the
    /// gateway alive; once it is gone connects are refused.
    pub fn install(self: &Arc<Self>, broker: &dyn Broker) {
        let gateway: Weak<Gateway> = Arc::downgrade(self);
        let connect: ConnectHook = Arc::new(move |event: ConnectEvent<'_>| {
            match gateway.upgrade() {
                Some(gateway) => gateway.connect(event.token),
                None => Err(Disconnect::SHUTDOWN),
            }
        });
        broker.on_connect(connect);

        let gateway: Weak<Gateway> = Arc::downgrade(self);
        let subscribe: SubscribeHook = Arc::new(move |event: SubscribeEvent<'_>| {
            let Some(gateway) = gateway.upgrade() else {
                return Err(GatewayError::Unauthenticated);
            };
            if gateway.authorize(event.identity, event.channel) {
                Ok(())
            } else {
                Err(GatewayError::Unauthorized {
                    channel: event.channel.to_string(),
                })
            }
        });
        broker.on_subscribe_attempt(subscribe);
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Issue a credential with the configured lifetime.
    pub fn issue_token(&self, user_id: &str, username: &str) -> Result<Credential, GatewayError> {
        self.tokens
            .issue(user_id, username, self.tokens.default_ttl())
    }

    pub fn validate_token(&self, token: &str) -> Result<Identity, GatewayError> {
        self.tokens.validate(token)
    }

    pub fn connect(&self, token: &str) -> Result<ConnectReply, Disconnect> {
        self.gate.handle(token)
    }

    /// Subscribe-time policy decision.
    pub fn authorize(&self, identity: &Identity, channel: &str) -> bool {
        authorizer::check(
            self.authorizer.as_ref(),
            identity,
            channel,
            ChannelAction::Subscribe,
        )
    }

    /// Unsubscribe is never refused; the decision is still logged.
    pub fn authorize_unsubscribe(&self, identity: &Identity, channel: &str) -> bool {
        authorizer::check(
            self.authorizer.as_ref(),
            identity,
            channel,
            ChannelAction::Unsubscribe,
        )
    }

    pub fn publish(
        &self,
        identity: Option<&Identity>,
        channel: &str,
        content: &str,
    ) -> Result<Message, GatewayError> {
        self.pipeline.publish(identity, channel, content)
    }
}
