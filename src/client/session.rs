use chrono::{DateTime, Utc};

use crate::auth::Identity;

/// Transient association of a validated identity with a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: Identity,
    pub connected_at: DateTime<Utc>,
}

impl Session {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            connected_at: Utc::now(),
        }
    }
}
