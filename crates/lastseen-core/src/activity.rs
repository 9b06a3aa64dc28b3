//! Per-author "last seen" aggregation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::Message;

/// Latest message timestamp per author, across every source processed so far.
///
/// Updates are a max-reduction keyed by author id, so the final record does
/// not depend on the order in which sources or batches are recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityRecord {
    last_seen: HashMap<String, DateTime<Utc>>,
}

impl ActivityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a batch of messages into the record.
    ///
    /// Automated messages are ignored.
    pub fn record_activity(&mut self, messages: &[Message]) {
        for message in messages.iter().filter(|m| !m.automated) {
            self.observe(&message.author_id, message.created_at);
        }
    }

    /// Record one sighting. Returns `true` if the stored value moved forward.
    pub fn observe(&mut self, author_id: &str, at: DateTime<Utc>) -> bool {
        match self.last_seen.get_mut(author_id) {
            Some(existing) if at > *existing => {
                *existing = at;
                true
            }
            Some(_) => false,
            None => {
                self.last_seen.insert(author_id.to_string(), at);
                true
            }
        }
    }

    /// Fold another record into this one.
    pub fn merge(&mut self, other: &ActivityRecord) {
        for (author_id, at) in &other.last_seen {
            self.observe(author_id, *at);
        }
    }

    pub fn last_seen(&self, author_id: &str) -> Option<DateTime<Utc>> {
        self.last_seen.get(author_id).copied()
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    pub fn authors(&self) -> impl Iterator<Item = &str> {
        self.last_seen.keys().map(|k| k.as_str())
    }
}
