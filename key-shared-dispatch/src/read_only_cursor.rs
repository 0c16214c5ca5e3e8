//! A read cursor with frozen write state, used by passive readers that
//! never acknowledge anything.

use crate::position::Position;

/// What a read-only cursor needs to know about the log it's reading, to
/// seed its initial position and consumed-message counter. A real
/// implementation is backed by the managed log; this crate only consumes
/// it through this narrow trait, matching the "log format is out of scope"
/// non-goal.
pub trait LogTail {
    /// The virtual marker immediately before the first real entry.
    fn head_position(&self) -> Position;
    /// The position that would be assigned to the next entry written.
    fn tail_position(&self) -> Position;
    /// Number of entries strictly between `from` (exclusive) and `to`
    /// (exclusive).
    fn entries_between(&self, from: Position, to: Position) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOnlyCursorState {
    NoLedger,
    Open,
    Closed,
}

/// A cursor variant that refuses writes: no mark-delete, no
/// acknowledgement, just a `readPosition` and a counter of how much is
/// left to consume.
pub struct ReadOnlyCursor {
    state: ReadOnlyCursorState,
    read_position: Position,
    /// Sign convention: negative while there's more to read, climbing
    /// toward zero as entries are consumed via [`skip_entries`]. Kept this
    /// way (rather than a plain remaining-count) so a downstream
    /// "has more to read" check is just `counter < 0`, uniformly, even if
    /// the underlying representation changes.
    messages_consumed_counter: i64,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl ReadOnlyCursor {
    /// Constructs a cursor that reads from the very start of the log.
    pub fn from_earliest(log: &impl LogTail) -> Self {
        let read_position = log.head_position().next();
        Self::at_position(log, read_position)
    }

    /// Constructs a cursor that reads from a caller-supplied position.
    pub fn at_position(log: &impl LogTail, read_position: Position) -> Self {
        let tail = log.tail_position();
        let messages_consumed_counter = if tail == log.head_position() {
            0
        } else {
            -(log.entries_between(read_position, tail) as i64)
        };
        Self {
            state: ReadOnlyCursorState::NoLedger,
            read_position,
            messages_consumed_counter,
            on_close: None,
        }
    }

    pub fn with_close_callback(mut self, on_close: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(on_close));
        self
    }

    pub fn state(&self) -> ReadOnlyCursorState {
        self.state
    }

    pub fn read_position(&self) -> Position {
        self.read_position
    }

    pub fn has_more_to_read(&self) -> bool {
        self.messages_consumed_counter < 0
    }

    /// Advances `read_position` by `n`, exclusive of the current position,
    /// via repeated application of the position-arithmetic `next()`
    /// routine.
    pub fn skip_entries(&mut self, n: u64) {
        for _ in 0..n {
            self.read_position = self.read_position.next();
        }
        self.messages_consumed_counter = (self.messages_consumed_counter + n as i64).min(0);
        self.state = ReadOnlyCursorState::Open;
    }

    /// Synchronously closes the cursor and invokes the completion callback
    /// immediately — there's no persistent state to flush first.
    pub fn close(&mut self) {
        self.state = ReadOnlyCursorState::Closed;
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }
}
