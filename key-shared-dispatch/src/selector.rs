//! Maps a sticky key to the consumer currently owning its hash slot.

use crate::consumer::ConsumerId;
use stable_ring::ConsistentHashRing;

/// The dispatcher treats a selector as a pure function of current
/// membership: it never caches a selection across entries, and every
/// reshape (`add_consumer`/`remove_consumer`) happens while the caller
/// holds the dispatcher lock, so `select` needs no internal locking of its
/// own.
pub trait ConsumerSelector: Send {
    fn select(&self, sticky_key: &[u8]) -> Option<ConsumerId>;
    fn add_consumer(&mut self, id: ConsumerId);
    fn remove_consumer(&mut self, id: &ConsumerId);
}

/// The default selector: a consistent-hash ring over [`ConsumerId`]s.
#[derive(Debug, Default, Clone)]
pub struct RingSelector {
    ring: ConsistentHashRing<ConsumerId>,
}

impl RingSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vnodes_per_consumer(vnodes: usize) -> Self {
        Self {
            ring: ConsistentHashRing::new(vnodes),
        }
    }
}

impl ConsumerSelector for RingSelector {
    fn select(&self, sticky_key: &[u8]) -> Option<ConsumerId> {
        self.ring.select(sticky_key).copied()
    }

    fn add_consumer(&mut self, id: ConsumerId) {
        self.ring.add(id);
    }

    fn remove_consumer(&mut self, id: &ConsumerId) {
        self.ring.remove(id);
    }
}
