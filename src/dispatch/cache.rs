//! # Type-Keyed Cache
//!
//! Concurrent memoizing map from a type key (a [`TypeKey`](super::type_key::TypeKey) or a
//! tuple/enum of them) to an artifact derived from it: capability descriptors, compiled call
//! adapters and polymorphic request matches.
//!
//! ## Construction policy
//!
//! [`TypeKeyedCache::get_or_create`] runs the factory **outside** of any lock. Two callers
//! racing on the same missing key may therefore both run the factory; the first result
//! committed to the map wins and every caller, including the loser of the race, gets that
//! committed value back. Factories must be pure: running one twice must be harmless.
//!
//! [`TypeKeyedCache::get_or_try_create_once`] holds the key's shard lock while the factory runs,
//! which gives at-most-once construction at the cost of blocking other writers to that shard.
//!
//! Entries are never evicted. The number of entries is bounded by the set of types the
//! application routes, not by call volume.

use dashmap::DashMap;
use std::hash::Hash;

pub struct TypeKeyedCache<K, V> {
    entries: DashMap<K, V>,
}

impl<K, V> TypeKeyedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Look up `key`, deriving and committing the value on a miss.
    pub fn get_or_create<F>(&self, key: K, factory: F) -> V
    where
        F: FnOnce(&K) -> V,
    {
        if let Some(existing) = self.get(&key) {
            return existing;
        }

        let created = factory(&key);
        self.entries.entry(key).or_insert(created).value().clone()
    }

    /// Fallible variant of [`get_or_create`](Self::get_or_create). Failures are not cached.
    pub fn get_or_try_create<F, E>(&self, key: K, factory: F) -> Result<V, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        if let Some(existing) = self.get(&key) {
            return Ok(existing);
        }

        let created = factory(&key)?;
        Ok(self.entries.entry(key).or_insert(created).value().clone())
    }

    /// At-most-once variant: the factory runs under the shard lock for `key`.
    ///
    /// The factory must not touch this cache again.
    pub fn get_or_try_create_once<F, E>(&self, key: K, factory: F) -> Result<V, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        if let Some(existing) = self.get(&key) {
            return Ok(existing);
        }

        match self.entries.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Ok(entry.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let created = factory(entry.key())?;
                Ok(entry.insert(created).value().clone())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }
}

impl<K, V> Default for TypeKeyedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
