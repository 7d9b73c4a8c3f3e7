//! Topic management
//!
//! A `Topic` holds the subscriber IDs for a channel name and the offset of
//! the last publication. Duplicate subscriptions are a no-op.
//!
//! Callers must synchronize access (the engine lock).

use std::collections::HashSet;

pub type SubscriberId = String;

#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub subscribers: HashSet<SubscriberId>,
    pub offset: u64,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashSet::new(),
            offset: 0,
        }
    }

    /// Add a subscriber to the topic. Duplicate adds are ignored.
    pub fn subscribe(&mut self, id: SubscriberId) {
        self.subscribers.insert(id);
    }

    /// Remove a subscriber from the topic.
    pub fn unsubscribe(&mut self, id: &SubscriberId) {
        self.subscribers.remove(id);
    }

    /// Advance and return the publication offset.
    pub fn next_offset(&mut self) -> u64 {
        self.offset += 1;
        self.offset
    }
}
