//! The contract the dispatcher consumes for reading and acknowledging a
//! durable log, plus the error kinds that contract can surface.

use crate::entry::Entry;
use crate::position::Position;
use async_trait::async_trait;

/// Tags which read path produced a batch of entries.
///
/// The dispatcher needs to tell these apart: entries arriving as `Replay`
/// must have their positions cleared from the redelivery set once
/// successfully sent, while `Normal` entries never entered it in the first
/// place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadType {
    Normal,
    Replay,
}

/// Errors a cursor read or replay can surface; these drive the dispatcher's
/// own escalation rules below.
#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    /// No entries available right now. Transient: the dispatcher pauses
    /// reading and waits for a later ack or consumer addition to retrigger
    /// a read.
    #[error("no more entries available yet")]
    NoMoreEntries,
    /// The managed ledger behind this cursor has been terminated.
    #[error("managed ledger terminated")]
    ManagedLedgerTerminated,
    /// The cursor itself has been closed.
    #[error("cursor closed")]
    CursorClosed,
}

impl CursorError {
    /// `NoMoreEntries` is the only transient kind; everything else stops
    /// the dispatcher for good.
    pub fn is_transient(&self) -> bool {
        matches!(self, CursorError::NoMoreEntries)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_transient()
    }
}

/// A stateful reader over the durable log, as the dispatcher sees it.
///
/// Implementations own the real read/mark-delete bookkeeping; this crate
/// never persists cursor state itself — that's the managed-log layer's job.
/// On restart, the redelivery set is rebuilt from the gap between
/// mark-delete and read-position, not from anything this crate wrote down.
#[async_trait]
pub trait ManagedCursor: Send {
    /// Reads up to `max` entries, advancing `read_position`.
    async fn read_entries(&mut self, max: usize) -> Result<Vec<Entry>, CursorError>;

    /// Re-delivers entries at `positions` that are still present in the
    /// log. Positions already deleted are silently dropped; the returned
    /// entries are exactly the accepted subset.
    async fn replay(&mut self, positions: Vec<Position>) -> Result<Vec<Entry>, CursorError>;

    /// Resets `read_position` to `mark_deleted_position().next()`. Used
    /// when the dispatcher has no live consumers and must discard a batch
    /// rather than hold onto it.
    fn rewind(&mut self);

    fn read_position(&self) -> Position;

    fn mark_deleted_position(&self) -> Position;

    fn number_of_entries_since_first_not_acked_message(&self) -> i64;

    fn is_active(&self) -> bool;
}
