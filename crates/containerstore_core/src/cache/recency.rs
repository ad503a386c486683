//! Fixed-capacity least-recently-used cache.
//!
//! # Responsibility
//! - Hold up to `capacity` keyed values and evict the stalest entry first.
//! - Track recency with monotonically increasing access stamps.
//!
//! # Invariants
//! - `entries` and `recency` describe the same key set: every key has exactly
//!   one stamp and every stamp names exactly one key.
//! - `len() <= capacity()` after every operation.
//! - The cache never frees anything itself: values leave through return
//!   values or are dropped, and the value type decides what dropping means.

use std::collections::{BTreeMap, HashMap};

/// Capacity used when callers do not pick one.
pub const DEFAULT_CACHE_CAPACITY: usize = 200;

#[derive(Debug)]
struct Slot<V> {
    value: V,
    stamp: u64,
}

/// LRU cache keyed by container id.
#[derive(Debug)]
pub struct RecencyCache<V> {
    capacity: usize,
    entries: HashMap<String, Slot<V>>,
    recency: BTreeMap<u64, String>,
    clock: u64,
}

impl<V> RecencyCache<V> {
    /// Creates an empty cache. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            clock: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts or replaces `key` and marks it most recently used.
    ///
    /// Returns the evicted least-recently-used entry when a new key had to
    /// make room. Replacing a present key never evicts; the old value is
    /// dropped.
    pub fn insert(&mut self, key: String, value: V) -> Option<(String, V)> {
        let stamp = self.next_stamp();
        if let Some(slot) = self.entries.get_mut(&key) {
            self.recency.remove(&slot.stamp);
            slot.value = value;
            slot.stamp = stamp;
            self.recency.insert(stamp, key);
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.pop_stalest()
        } else {
            None
        };

        self.recency.insert(stamp, key.clone());
        self.entries.insert(key, Slot { value, stamp });
        evicted
    }

    /// Returns the value and promotes it to most recently used.
    pub fn get(&mut self, key: &str) -> Option<&mut V> {
        let stamp = self.next_stamp();
        let slot = self.entries.get_mut(key)?;
        let previous = std::mem::replace(&mut slot.stamp, stamp);
        if let Some(owned_key) = self.recency.remove(&previous) {
            self.recency.insert(stamp, owned_key);
        }
        Some(&mut slot.value)
    }

    /// Returns the value without touching recency.
    pub fn peek(&self, key: &str) -> Option<&V> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let slot = self.entries.remove(key)?;
        self.recency.remove(&slot.stamp);
        Some(slot.value)
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    /// Keys ordered most recently used first.
    pub fn keys(&self) -> Vec<String> {
        self.recency.values().rev().cloned().collect()
    }

    /// Entries ordered most recently used first, without promotion.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> + '_ {
        self.recency.values().rev().filter_map(|key| {
            self.entries
                .get(key)
                .map(|slot| (key.as_str(), &slot.value))
        })
    }

    /// Changes the capacity, evicting stalest entries beyond it immediately.
    pub fn resize(&mut self, capacity: usize) -> Vec<(String, V)> {
        self.capacity = capacity.max(1);
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            match self.pop_stalest() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    fn pop_stalest(&mut self) -> Option<(String, V)> {
        let (_, key) = self.recency.pop_first()?;
        let slot = self.entries.remove(&key)?;
        Some((key, slot.value))
    }

    fn next_stamp(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

impl<V> Default for RecencyCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
