//! Lock ordering for multi-key batches
//!
//! Every batch locks the distinct shards it touches in ascending index
//! order. Two batches with overlapping shard sets therefore always contend
//! on their lowest common shard first and can never wait on each other in
//! a cycle.

use crate::error::{KvsError, Result};

use super::shard_index;

/// Shard acquisition order for one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockPlan {
    /// Distinct shard indices, ascending
    shards: Vec<usize>,

    /// `(item index, shard)` for every requested key, stable-sorted by shard
    items: Vec<(usize, usize)>,
}

impl LockPlan {
    /// Build a plan for the given keys (duplicates allowed).
    ///
    /// Fails with `InvalidKey` on the first key that has no shard, before
    /// anything is locked.
    pub fn for_keys<'a, I>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut items = Vec::new();
        for (position, key) in keys.into_iter().enumerate() {
            let shard = shard_index(key).ok_or_else(|| KvsError::InvalidKey(key.to_string()))?;
            items.push((position, shard));
        }

        // sort_by_key is stable: keys in the same shard keep request order
        items.sort_by_key(|&(_, shard)| shard);

        let mut shards: Vec<usize> = items.iter().map(|&(_, shard)| shard).collect();
        shards.dedup();

        Ok(Self { shards, items })
    }

    /// Distinct shards to lock, in acquisition order
    pub fn shards(&self) -> &[usize] {
        &self.shards
    }

    /// Requested items as `(item index, shard)` in lock order
    pub fn items(&self) -> &[(usize, usize)] {
        &self.items
    }

    /// Number of requested items (duplicates included)
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
