use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message as published to a channel.
///
/// `id` is a zero-padded decimal, so lexical and generation order agree.
/// `timestamp` serializes as RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel: String,
    pub username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}
