//! Publish pipeline
//!
//! Turns an authenticated `(identity, channel, content)` request into a
//! stamped [`Message`] and hands its JSON encoding to the broker. Requests
//! that fail a check never reach the broker. Broker failures are reported to
//! the caller as-is; there is no retry here.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::{info, warn};

use super::Message;
use super::authorizer::{self, ChannelAction, ChannelAuthorizer};
use crate::auth::Identity;
use crate::broker::Broker;
use crate::utils::GatewayError;

/// Unique, strictly increasing message ids.
///
/// Each id is the current wall-clock nanosecond reading, bumped past the
/// previous id when the clock has not advanced (or went backwards), so
/// concurrent publishers can never collide.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    last: AtomicU64,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        let now = Utc::now()
            .timestamp_nanos_opt()
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0);

        let prev = match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            }) {
            Ok(prev) | Err(prev) => prev,
        };
        now.max(prev.saturating_add(1))
    }

    /// Next id in its wire form.
    pub fn next_string(&self) -> String {
        format!("{:020}", self.next_id())
    }
}

pub struct PublishPipeline {
    broker: Arc<dyn Broker>,
    authorizer: Arc<dyn ChannelAuthorizer>,
    ids: MessageIdGenerator,
}

impl PublishPipeline {
    pub fn new(broker: Arc<dyn Broker>, authorizer: Arc<dyn ChannelAuthorizer>) -> Self {
        Self {
            broker,
            authorizer,
            ids: MessageIdGenerator::new(),
        }
    }

    pub fn publish(
        &self,
        identity: Option<&Identity>,
        channel: &str,
        content: &str,
    ) -> Result<Message, GatewayError> {
        let identity = identity.ok_or(GatewayError::Unauthenticated)?;

        if channel.trim().is_empty() {
            return Err(GatewayError::BadRequest("channel is required".to_string()));
        }
        if content.trim().is_empty() {
            return Err(GatewayError::BadRequest(
                "content must not be empty".to_string(),
            ));
        }
        if !authorizer::check(
            self.authorizer.as_ref(),
            identity,
            channel,
            ChannelAction::Publish,
        ) {
            return Err(GatewayError::Unauthorized {
                channel: channel.to_string(),
            });
        }

        let message = Message {
            id: self.ids.next_string(),
            channel: channel.to_string(),
            username: identity.username.clone(),
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        let payload = serde_json::to_vec(&message)
            .map_err(|e| GatewayError::BadRequest(format!("unencodable message: {e}")))?;

        match self.broker.publish(channel, &payload) {
            Ok(seq) => {
                info!(
                    channel,
                    id = %message.id,
                    offset = seq.offset,
                    delivered = seq.delivered,
                    username = %identity.username,
                    "Message published"
                );
                Ok(message)
            }
            Err(e) => {
                warn!(channel, id = %message.id, "Publish failed: {e}");
                Err(e.into())
            }
        }
    }
}
