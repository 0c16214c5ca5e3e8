//! Consistent-hash ring used to pick which consumer owns a sticky key.
//!
//! A ring slices `u64` hash space into a fixed number of virtual nodes per
//! consumer. Looking up a key walks clockwise from the key's hash to the
//! first virtual node. Adding or removing a consumer only touches the
//! virtual nodes that belonged to that consumer — every other consumer's
//! slots are left alone, which is the whole point of using a ring instead
//! of `hash(key) % n`.

use ahash::AHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Number of virtual nodes placed on the ring per consumer.
///
/// Higher spreads load more evenly across consumers at the cost of a
/// bigger `vnodes` map; 128 is a reasonable default for subscriptions with
/// up to a few hundred consumers.
pub const DEFAULT_VNODES_PER_CONSUMER: usize = 128;

/// Maps sticky-key bytes to the consumer that currently owns them.
///
/// `T` is an opaque consumer handle — the ring never inspects it beyond
/// hashing and equality, so callers are free to use a small `Copy` id
/// rather than the consumer object itself.
#[derive(Debug, Clone)]
pub struct ConsistentHashRing<T> {
    vnodes: BTreeMap<u64, T>,
    vnodes_per_consumer: usize,
    consumer_count: usize,
}

impl<T> Default for ConsistentHashRing<T> {
    fn default() -> Self {
        Self::new(DEFAULT_VNODES_PER_CONSUMER)
    }
}

impl<T: Clone + Eq + Hash> ConsistentHashRing<T> {
    pub fn new(vnodes_per_consumer: usize) -> Self {
        Self {
            vnodes: BTreeMap::new(),
            vnodes_per_consumer: vnodes_per_consumer.max(1),
            consumer_count: 0,
        }
    }

    /// Adds `consumer`'s virtual nodes to the ring. No-op if already present
    /// (detected by hashing identically, so callers shouldn't call this
    /// twice for the same handle).
    pub fn add(&mut self, consumer: T) {
        let mut added_any = false;
        for vnode in 0..self.vnodes_per_consumer {
            let slot = vnode_hash(&consumer, vnode);
            if self.vnodes.insert(slot, consumer.clone()).is_none() {
                added_any = true;
            }
        }
        if added_any {
            self.consumer_count += 1;
        }
    }

    /// Removes every virtual node belonging to `consumer`.
    pub fn remove(&mut self, consumer: &T) {
        let mut removed_any = false;
        for vnode in 0..self.vnodes_per_consumer {
            let slot = vnode_hash(consumer, vnode);
            if self.vnodes.remove(&slot).is_some() {
                removed_any = true;
            }
        }
        if removed_any {
            self.consumer_count = self.consumer_count.saturating_sub(1);
        }
    }

    /// Returns the consumer that owns `key`'s slot, or `None` if the ring
    /// has no consumers.
    pub fn select(&self, key: &[u8]) -> Option<&T> {
        if self.vnodes.is_empty() {
            return None;
        }
        let key_hash = hash_bytes(key);
        self.vnodes
            .range(key_hash..)
            .next()
            .or_else(|| self.vnodes.iter().next())
            .map(|(_, consumer)| consumer)
    }

    pub fn is_empty(&self) -> bool {
        self.consumer_count == 0
    }

    pub fn len(&self) -> usize {
        self.consumer_count
    }
}

fn vnode_hash<T: Hash>(consumer: &T, vnode: usize) -> u64 {
    let mut hasher = AHasher::default();
    consumer.hash(&mut hasher);
    vnode.hash(&mut hasher);
    hasher.finish()
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = AHasher::default();
    bytes.hash(&mut hasher);
    hasher.finish()
}
