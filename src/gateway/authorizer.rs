//! Channel authorization policies.
//!
//! Any `Fn(&Identity, &str) -> bool` is a [`ChannelAuthorizer`], so a
//! deployment can plug in its own rule without touching the gate.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::auth::Identity;
use crate::config::GatewaySettings;

pub trait ChannelAuthorizer: Send + Sync {
    fn authorize(&self, identity: &Identity, channel: &str) -> bool;
}

impl<F> ChannelAuthorizer for F
where
    F: Fn(&Identity, &str) -> bool + Send + Sync,
{
    fn authorize(&self, identity: &Identity, channel: &str) -> bool {
        self(identity, channel)
    }
}

/// Every authenticated identity may use every channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ChannelAuthorizer for AllowAll {
    fn authorize(&self, _identity: &Identity, _channel: &str) -> bool {
        true
    }
}

/// Channels under `<namespace>:<user_id>` (and deeper, `<namespace>:<user_id>:...`)
/// belong to that user alone. Channels outside the namespace are open.
#[derive(Debug, Clone)]
pub struct OwnedNamespace {
    namespace: String,
}

impl OwnedNamespace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl ChannelAuthorizer for OwnedNamespace {
    fn authorize(&self, identity: &Identity, channel: &str) -> bool {
        let Some(rest) = channel
            .strip_prefix(self.namespace.as_str())
            .and_then(|r| r.strip_prefix(':'))
        else {
            return true;
        };
        rest.split(':').next() == Some(identity.user_id.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAction {
    Subscribe,
    Unsubscribe,
    Publish,
}

impl fmt::Display for ChannelAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelAction::Subscribe => "subscribe",
            ChannelAction::Unsubscribe => "unsubscribe",
            ChannelAction::Publish => "publish",
        })
    }
}

/// Ask `authorizer` and log the decision. Unsubscribe is always allowed.
pub fn check(
    authorizer: &dyn ChannelAuthorizer,
    identity: &Identity,
    channel: &str,
    action: ChannelAction,
) -> bool {
    let allowed = action == ChannelAction::Unsubscribe || authorizer.authorize(identity, channel);
    info!(
        user_id = %identity.user_id,
        username = %identity.username,
        channel,
        %action,
        allowed,
        "channel access"
    );
    allowed
}

/// Authorizer selected by configuration.
pub fn from_settings(settings: &GatewaySettings) -> Arc<dyn ChannelAuthorizer> {
    match settings.owner_namespace.as_deref() {
        Some(ns) if !ns.is_empty() => Arc::new(OwnedNamespace::new(ns)),
        _ => Arc::new(AllowAll),
    }
}
