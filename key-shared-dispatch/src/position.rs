//! Totally ordered log coordinates.

use std::ops::{Bound, RangeBounds};

/// A coordinate into the durable log: which ledger, and which entry within
/// it. Ordered lexicographically by `(ledger_id, entry_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub ledger_id: u64,
    pub entry_id: u64,
}

impl Position {
    pub const fn new(ledger_id: u64, entry_id: u64) -> Self {
        Self {
            ledger_id,
            entry_id,
        }
    }

    /// The earliest possible position, used as a sentinel mark-delete value
    /// for a subscription that has acknowledged nothing yet.
    pub const fn earliest() -> Self {
        Self::new(0, 0)
    }

    /// The position immediately following this one within the same ledger.
    ///
    /// This deliberately does not know about ledger rollover: a `Position`
    /// alone can't tell whether `entry_id + 1` exists, since that depends on
    /// whether the ledger has been sealed. Cursors that track ledger
    /// boundaries should advance to [`Position::first_of_next_ledger`]
    /// themselves when they seal a ledger, rather than asking a bare
    /// `Position` to guess.
    pub const fn next(&self) -> Self {
        Self::new(self.ledger_id, self.entry_id + 1)
    }

    /// The first position of the ledger following this one.
    pub const fn first_of_next_ledger(&self) -> Self {
        Self::new(self.ledger_id + 1, 0)
    }
}

/// A half-open range of positions, `[start, end)`, usable directly as a
/// `BTreeSet::range` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRange {
    pub start: Position,
    pub end: Position,
}

impl PositionRange {
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn contains_position(&self, position: &Position) -> bool {
        *position >= self.start && *position < self.end
    }
}

impl RangeBounds<Position> for PositionRange {
    fn start_bound(&self) -> Bound<&Position> {
        Bound::Included(&self.start)
    }

    fn end_bound(&self) -> Bound<&Position> {
        Bound::Excluded(&self.end)
    }
}
