//! Per-consumer join snapshots used to enforce the ordering filter.

use crate::consumer::ConsumerId;
use crate::position::Position;
use std::collections::HashMap;

/// Maps a recently-joined consumer to the `readPosition` snapshot taken
/// when it joined a non-empty backlog. While a consumer has an entry here,
/// the dispatch engine's ordering filter (§4.3.1) withholds any entry
/// positioned at or past the snapshot, so the newcomer can't overtake
/// messages for the same sticky key that were already in flight to another
/// consumer when it joined.
#[derive(Debug, Default, Clone)]
pub struct RecentlyJoinedTable {
    snapshots: HashMap<ConsumerId, Position>,
}

impl RecentlyJoinedTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ConsumerId, snapshot: Position) {
        self.snapshots.insert(id, snapshot);
    }

    pub fn remove(&mut self, id: &ConsumerId) -> Option<Position> {
        self.snapshots.remove(id)
    }

    pub fn get(&self, id: &ConsumerId) -> Option<Position> {
        self.snapshots.get(id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Drops every consumer whose join barrier the mark-delete has now
    /// passed (`barrier <= mark_delete_next`).
    pub fn retain_unresolved(&mut self, mark_delete_next: Position) {
        self.snapshots.retain(|_, barrier| *barrier > mark_delete_next);
    }
}
