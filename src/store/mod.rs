//! Store Module
//!
//! Sharded in-memory table holding every key, its value, and the sessions
//! subscribed to it.
//!
//! ## Responsibilities
//! - One reader/writer lock per shard (first-character bucket of the key)
//! - Deadlock-free multi-key batches via ascending shard acquisition
//! - Synchronous change notification while the shard lock is still held
//! - Point-in-time enumeration for SHOW and backups
//!
//! ## Layout
//! ```text
//! ┌─────────┬─────────┬─────────┬─────┬──────────┐
//! │ Shard 0 │ Shard 1 │ Shard 2 │ ... │ Shard 25 │
//! │ a / 0   │ b / 1   │ c / 2   │     │ z        │
//! │ RwLock  │ RwLock  │ RwLock  │     │ RwLock   │
//! │ HashMap │ HashMap │ HashMap │     │ HashMap  │
//! └─────────┴─────────┴─────────┴─────┴──────────┘
//! ```
//!
//! Entry mutation and subscriber-set mutation happen under the same shard
//! lock, so a write and a subscribe on one key never interleave.

mod entry;
mod lock_order;
mod subscriber;
mod table;

pub use entry::Entry;
pub use lock_order::LockPlan;
pub use subscriber::{Notifier, SessionId, SubscribeOutcome, SubscriberSet};
pub use table::Store;

/// Number of shards (one per letter; digits share the first ten)
pub const SHARD_COUNT: usize = 26;

/// Map a key to its shard by its first character.
///
/// Letters are case-insensitive (`a`/`A` → 0 … `z` → 25), digits map to
/// `0..=9`. Anything else has no shard and is rejected by the store.
pub fn shard_index(key: &str) -> Option<usize> {
    let first = key.bytes().next()?.to_ascii_lowercase();
    match first {
        b'a'..=b'z' => Some((first - b'a') as usize),
        b'0'..=b'9' => Some((first - b'0') as usize),
        _ => None,
    }
}
