//! Sharded table implementation
//!
//! HashMap-per-shard with one parking_lot RwLock each.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::DEFAULT_MAX_SESSIONS;
use crate::error::{KvsError, Result};
use crate::protocol::Notification;

use super::{shard_index, Entry, LockPlan, Notifier, SessionId, SubscribeOutcome, SHARD_COUNT};

type ShardMap = HashMap<String, Entry>;

/// The process-wide key-value store
///
/// ## Locking rules
/// - Single-key operations take exactly one shard lock and release it
///   before returning.
/// - Batches lock every distinct shard they touch, ascending, before any
///   key is touched (see [`LockPlan`]).
/// - `enumerate` read-locks all shards ascending for the whole scan.
/// - Writes and deletes notify subscribers before the shard lock drops,
///   so notifications for one key follow commit order.
pub struct Store {
    shards: Vec<RwLock<ShardMap>>,

    /// Capacity of each entry's subscriber set
    subscriber_capacity: usize,
}

impl Store {
    /// Create an empty store whose entries accept up to
    /// `subscriber_capacity` subscribers each
    pub fn new(subscriber_capacity: usize) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect();
        Self {
            shards,
            subscriber_capacity,
        }
    }

    // =========================================================================
    // Single-key operations
    // =========================================================================

    /// Insert or replace a value, notifying the key's subscribers
    pub fn write(&self, key: &str, value: &str) -> Result<()> {
        let shard = Self::shard_for(key)?;
        let mut map = self.shards[shard].write();
        self.apply_write(&mut map, key, value);
        Ok(())
    }

    /// Read a value; `None` if the key is absent
    pub fn read(&self, key: &str) -> Result<Option<String>> {
        let shard = Self::shard_for(key)?;
        let map = self.shards[shard].read();
        Ok(map.get(key).map(|entry| entry.value.clone()))
    }

    /// Delete a key; `false` if it was absent
    pub fn delete(&self, key: &str) -> Result<bool> {
        let shard = Self::shard_for(key)?;
        let mut map = self.shards[shard].write();
        Ok(Self::apply_delete(&mut map, key))
    }

    // =========================================================================
    // Batch operations
    // =========================================================================

    /// Write every pair under one ordered acquisition of their shards.
    /// Later duplicates of a key win.
    pub fn write_batch(&self, pairs: &[(String, String)]) -> Result<()> {
        let plan = LockPlan::for_keys(pairs.iter().map(|(k, _)| k.as_str()))?;
        let mut locked = self.lock_write(&plan);

        for &(item, shard) in plan.items() {
            let (key, value) = &pairs[item];
            if let Some(map) = locked.shard_mut(shard) {
                self.apply_write(map, key, value);
            }
        }
        Ok(())
    }

    /// Read every key under one ordered acquisition of their shards.
    ///
    /// Results come back in lock order: grouped by ascending shard, request
    /// order preserved inside a shard.
    pub fn read_batch(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>> {
        let plan = LockPlan::for_keys(keys.iter().map(String::as_str))?;
        let locked = self.lock_read(&plan);

        let mut results = Vec::with_capacity(plan.len());
        for &(item, shard) in plan.items() {
            let key = &keys[item];
            let value = locked
                .shard(shard)
                .and_then(|map| map.get(key))
                .map(|entry| entry.value.clone());
            results.push((key.clone(), value));
        }
        Ok(results)
    }

    /// Delete every key under one ordered acquisition of their shards.
    ///
    /// Returns `(key, deleted)` in lock order. A duplicate of an already
    /// deleted key reports `false`.
    pub fn delete_batch(&self, keys: &[String]) -> Result<Vec<(String, bool)>> {
        let plan = LockPlan::for_keys(keys.iter().map(String::as_str))?;
        let mut locked = self.lock_write(&plan);

        let mut results = Vec::with_capacity(plan.len());
        for &(item, shard) in plan.items() {
            let key = &keys[item];
            let deleted = locked
                .shard_mut(shard)
                .map(|map| Self::apply_delete(map, key))
                .unwrap_or(false);
            results.push((key.clone(), deleted));
        }
        Ok(results)
    }

    /// Every `(key, value)` pair, shard-ascending, keys sorted within a
    /// shard. All shards are read-locked for the duration of the scan.
    pub fn enumerate(&self) -> Vec<(String, String)> {
        let guards: Vec<RwLockReadGuard<'_, ShardMap>> =
            self.shards.iter().map(|shard| shard.read()).collect();

        let mut pairs = Vec::new();
        for map in &guards {
            let start = pairs.len();
            pairs.extend(map.iter().map(|(k, e)| (k.clone(), e.value.clone())));
            pairs[start..].sort_unstable_by(|a, b| a.0.cmp(&b.0));
        }
        pairs
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register `notifier` for changes to an existing key.
    ///
    /// Fails with `KeyNotFound` if the key has no entry and with
    /// `SubscribersFull` if the entry's subscriber set has no free slot.
    /// Subscribing twice is a no-op.
    pub fn subscribe(&self, key: &str, notifier: &Arc<Notifier>) -> Result<()> {
        let shard = Self::shard_for(key)?;
        let mut map = self.shards[shard].write();
        let entry = map.get_mut(key).ok_or(KvsError::KeyNotFound)?;

        match entry.subscribers.insert(Arc::clone(notifier)) {
            SubscribeOutcome::Added | SubscribeOutcome::AlreadySubscribed => Ok(()),
            SubscribeOutcome::Full => Err(KvsError::SubscribersFull(key.to_string())),
        }
    }

    /// Remove a session from a key's subscribers.
    ///
    /// `KeyNotFound` if the key has no entry; succeeds even if the session
    /// was not subscribed.
    pub fn unsubscribe(&self, key: &str, session: SessionId) -> Result<()> {
        let shard = Self::shard_for(key)?;
        let mut map = self.shards[shard].write();
        let entry = map.get_mut(key).ok_or(KvsError::KeyNotFound)?;
        entry.subscribers.remove(session);
        Ok(())
    }

    /// Number of subscribers on a key (0 if absent or invalid)
    pub fn subscriber_count(&self, key: &str) -> usize {
        let Some(shard) = shard_index(key) else {
            return 0;
        };
        self.shards[shard]
            .read()
            .get(key)
            .map(|entry| entry.subscribers.len())
            .unwrap_or(0)
    }

    /// Whether a given session holds a slot on a key
    pub fn is_subscribed(&self, key: &str, session: SessionId) -> bool {
        let Some(shard) = shard_index(key) else {
            return false;
        };
        self.shards[shard]
            .read()
            .get(key)
            .map(|entry| entry.subscribers.contains(session))
            .unwrap_or(false)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn shard_for(key: &str) -> Result<usize> {
        shard_index(key).ok_or_else(|| KvsError::InvalidKey(key.to_string()))
    }

    /// Called with the shard's write lock held
    fn apply_write(&self, map: &mut ShardMap, key: &str, value: &str) {
        match map.get_mut(key) {
            Some(entry) => {
                entry.value = value.to_string();
                entry.subscribers.notify_all(&Notification::Updated {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
            None => {
                map.insert(
                    key.to_string(),
                    Entry::new(value.to_string(), self.subscriber_capacity),
                );
            }
        }
    }

    /// Called with the shard's write lock held
    fn apply_delete(map: &mut ShardMap, key: &str) -> bool {
        match map.remove(key) {
            Some(entry) => {
                entry.subscribers.notify_all(&Notification::Deleted {
                    key: key.to_string(),
                });
                true
            }
            None => false,
        }
    }

    fn lock_write(&self, plan: &LockPlan) -> LockedShards<RwLockWriteGuard<'_, ShardMap>> {
        debug_assert!(plan.shards().windows(2).all(|w| w[0] < w[1]));
        LockedShards::new(plan.shards().iter().map(|&s| (s, self.shards[s].write())))
    }

    fn lock_read(&self, plan: &LockPlan) -> LockedShards<RwLockReadGuard<'_, ShardMap>> {
        debug_assert!(plan.shards().windows(2).all(|w| w[0] < w[1]));
        LockedShards::new(plan.shards().iter().map(|&s| (s, self.shards[s].read())))
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}

/// Guards held by one batch, indexed by shard. Released together on drop.
struct LockedShards<G> {
    guards: Vec<Option<G>>,
}

impl<G> LockedShards<G> {
    /// Takes guards in the order the iterator yields them; callers pass the
    /// plan's ascending shard list.
    fn new(acquired: impl Iterator<Item = (usize, G)>) -> Self {
        let mut guards: Vec<Option<G>> = (0..SHARD_COUNT).map(|_| None).collect();
        for (shard, guard) in acquired {
            guards[shard] = Some(guard);
        }
        Self { guards }
    }
}

impl<G: std::ops::Deref<Target = ShardMap>> LockedShards<G> {
    fn shard(&self, shard: usize) -> Option<&ShardMap> {
        self.guards.get(shard)?.as_deref()
    }
}

impl<G: std::ops::DerefMut<Target = ShardMap>> LockedShards<G> {
    fn shard_mut(&mut self, shard: usize) -> Option<&mut ShardMap> {
        self.guards.get_mut(shard)?.as_deref_mut()
    }
}
