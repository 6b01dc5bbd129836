//! Stored entry: value plus subscribers

use super::SubscriberSet;

/// One key's value and the sessions watching it.
///
/// Dropping an entry (on delete) discards its subscriber set.
#[derive(Debug)]
pub struct Entry {
    pub value: String,
    pub subscribers: SubscriberSet,
}

impl Entry {
    pub fn new(value: String, subscriber_capacity: usize) -> Self {
        Self {
            value,
            subscribers: SubscriberSet::with_capacity(subscriber_capacity),
        }
    }
}
