//! The in-memory set of positions awaiting re-dispatch.

use crate::position::Position;
use std::collections::BTreeSet;
use std::ops::RangeBounds;

/// An ordered set of positions to be re-read before fresh entries.
///
/// Ordered so that [`peek_up_to`](RedeliverySet::peek_up_to) hands back the
/// oldest pending positions first, and so the mark-delete cleanup in
/// [`drop_up_to`](RedeliverySet::drop_up_to) is a cheap split rather than a
/// scan. Duplicates collapse, matching the spec's set semantics.
#[derive(Debug, Default, Clone)]
pub struct RedeliverySet {
    positions: BTreeSet<Position>,
}

impl RedeliverySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, position: Position) -> bool {
        self.positions.insert(position)
    }

    pub fn remove(&mut self, position: &Position) -> bool {
        self.positions.remove(position)
    }

    pub fn contains(&self, position: &Position) -> bool {
        self.positions.contains(position)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn range(&self, range: impl RangeBounds<Position>) -> impl Iterator<Item = &Position> {
        self.positions.range(range)
    }

    /// Returns up to `max` of the oldest pending positions, without
    /// removing them — they're only removed once actually handed to a
    /// transport (see the dispatch engine's replay handling).
    pub fn peek_up_to(&self, max: usize) -> Vec<Position> {
        self.positions.iter().take(max).copied().collect()
    }

    /// Drops every position `<= mark_delete`, maintaining the invariant
    /// that the redelivery set never contains an already-acknowledged
    /// position.
    pub fn drop_up_to(&mut self, mark_delete: Position) {
        self.positions = self.positions.split_off(&mark_delete.next());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn duplicates_collapse() {
        let mut set = RedeliverySet::new();
        assert!(set.add(Position::new(1, 1)));
        assert!(!set.add(Position::new(1, 1)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn peek_does_not_remove() {
        let mut set = RedeliverySet::new();
        set.add(Position::new(1, 1));
        set.add(Position::new(1, 2));
        let peeked = set.peek_up_to(1);
        assert_eq!(peeked, vec![Position::new(1, 1)]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn drop_up_to_clears_acknowledged_positions() {
        let mut set = RedeliverySet::new();
        set.add(Position::new(1, 1));
        set.add(Position::new(1, 2));
        set.add(Position::new(1, 3));
        set.drop_up_to(Position::new(1, 2));
        assert!(!set.contains(&Position::new(1, 1)));
        assert!(!set.contains(&Position::new(1, 2)));
        assert!(set.contains(&Position::new(1, 3)));
    }
}
