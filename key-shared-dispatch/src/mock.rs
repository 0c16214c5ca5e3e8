//! In-memory stand-ins for the managed-log cursor and consumer transport
//! contracts. Both are external collaborator infrastructure the dispatcher
//! only ever sees through a trait; this module exists only so it can be
//! driven end-to-end by the test suite and the demo binary.

use crate::consumer::{ConsumerTransport, DispatchedBatch};
use crate::cursor::{CursorError, ManagedCursor};
use crate::entry::Entry;
use crate::error::SendError;
use crate::position::Position;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

const DEFAULT_LEDGER: u64 = 1;

struct LogState {
    entries: BTreeMap<Position, Entry>,
    read_position: Position,
    mark_delete: Position,
    next_entry_id: u64,
    active: bool,
    closed: bool,
}

/// An append-only in-memory log: a map of [`Position`] to [`Entry`], shared
/// between whatever is driving the scenario (a test, or the demo binary)
/// and the [`InMemoryCursor`] handed to a dispatcher.
///
/// Cloning an `InMemoryLog` shares the same backing state (it's a handle,
/// like `Entry`), so a test can append entries and advance mark-delete
/// through one handle while the dispatcher reads through a cursor obtained
/// from another.
#[derive(Clone)]
pub struct InMemoryLog(Arc<Mutex<LogState>>);

impl InMemoryLog {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(LogState {
            entries: BTreeMap::new(),
            read_position: Position::earliest(),
            mark_delete: Position::earliest(),
            next_entry_id: 1,
            active: true,
            closed: false,
        })))
    }

    /// Appends one entry at the next auto-assigned position on the default
    /// ledger. Convenient for demo seeding where exact positions don't
    /// matter.
    pub fn append_one(&self, sticky_key: impl Into<Bytes>, payload: impl Into<Bytes>) -> Position {
        let mut state = self.0.lock().unwrap();
        let position = Position::new(DEFAULT_LEDGER, state.next_entry_id);
        state.next_entry_id += 1;
        state
            .entries
            .insert(position, Entry::new(position, payload.into(), sticky_key.into()));
        position
    }

    /// Appends an entry at a caller-chosen position, for scenarios that
    /// need exact control over positions (e.g. the join-barrier tests).
    pub fn append_at(
        &self,
        position: Position,
        sticky_key: impl Into<Bytes>,
        payload: impl Into<Bytes>,
    ) {
        let mut state = self.0.lock().unwrap();
        state
            .entries
            .insert(position, Entry::new(position, payload.into(), sticky_key.into()));
    }

    /// Advances mark-delete to `position`, simulating a consumer's
    /// cumulative acknowledgement. A no-op if `position` is behind the
    /// current mark-delete (acknowledgement only ever moves forward).
    pub fn ack_through(&self, position: Position) {
        let mut state = self.0.lock().unwrap();
        if position > state.mark_delete {
            state.mark_delete = position;
        }
    }

    pub fn mark_delete(&self) -> Position {
        self.0.lock().unwrap().mark_delete
    }

    pub fn read_position(&self) -> Position {
        self.0.lock().unwrap().read_position
    }

    pub fn set_active(&self, active: bool) {
        self.0.lock().unwrap().active = active;
    }

    /// Closes the log for reads, so the next `read_entries`/`replay` call
    /// returns [`CursorError::CursorClosed`].
    pub fn close(&self) {
        self.0.lock().unwrap().closed = true;
    }

    /// Hands out a fresh [`ManagedCursor`] sharing this log's state.
    pub fn cursor(&self) -> InMemoryCursor {
        InMemoryCursor(self.0.clone())
    }
}

impl Default for InMemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`ManagedCursor`] over an [`InMemoryLog`].
pub struct InMemoryCursor(Arc<Mutex<LogState>>);

#[async_trait]
impl ManagedCursor for InMemoryCursor {
    async fn read_entries(&mut self, max: usize) -> Result<Vec<Entry>, CursorError> {
        let mut state = self.0.lock().unwrap();
        if state.closed {
            return Err(CursorError::CursorClosed);
        }
        let from = state.read_position;
        let batch: Vec<Entry> = state
            .entries
            .range(from..)
            .take(max)
            .map(|(_, entry)| entry.clone())
            .collect();
        if batch.is_empty() {
            return Err(CursorError::NoMoreEntries);
        }
        state.read_position = batch.last().expect("checked non-empty").position().next();
        Ok(batch)
    }

    async fn replay(&mut self, positions: Vec<Position>) -> Result<Vec<Entry>, CursorError> {
        let state = self.0.lock().unwrap();
        if state.closed {
            return Err(CursorError::CursorClosed);
        }
        Ok(positions
            .into_iter()
            .filter_map(|position| state.entries.get(&position).cloned())
            .collect())
    }

    fn rewind(&mut self) {
        let mut state = self.0.lock().unwrap();
        state.read_position = state.mark_delete.next();
    }

    fn read_position(&self) -> Position {
        self.0.lock().unwrap().read_position
    }

    fn mark_deleted_position(&self) -> Position {
        self.0.lock().unwrap().mark_delete
    }

    fn number_of_entries_since_first_not_acked_message(&self) -> i64 {
        let state = self.0.lock().unwrap();
        state.entries.range(state.mark_delete.next()..).count() as i64
    }

    fn is_active(&self) -> bool {
        self.0.lock().unwrap().active
    }
}

/// A consumer transport stand-in: tracks permits and records every batch it
/// receives, for test assertions. Can be primed to fail its next send, to
/// exercise the disconnect-during-send path.
pub struct MockConsumerTransport {
    name: String,
    permits: AtomicI64,
    received: Mutex<Vec<Entry>>,
    fail_next: AtomicBool,
}

impl MockConsumerTransport {
    pub fn new(name: impl Into<String>, permits: i64) -> Self {
        Self {
            name: name.into(),
            permits: AtomicI64::new(permits),
            received: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Restores `n` permits, simulating the consumer acking earlier sends.
    pub fn add_permits(&self, n: i64) {
        self.permits.fetch_add(n, Ordering::SeqCst);
    }

    /// Makes the next `send` call fail once, as if the consumer disconnected
    /// mid-send.
    pub fn fail_next_send(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<Entry> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_positions(&self) -> Vec<Position> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(Entry::position)
            .collect()
    }
}

#[async_trait]
impl ConsumerTransport for MockConsumerTransport {
    fn consumer_name(&self) -> &str {
        &self.name
    }

    fn available_permits(&self) -> i64 {
        self.permits.load(Ordering::SeqCst)
    }

    async fn send(&self, batch: DispatchedBatch) -> Result<(), SendError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SendError::ConsumerDisconnected(self.name.clone()));
        }
        self.permits
            .fetch_sub(batch.total_messages as i64, Ordering::SeqCst);
        self.received.lock().unwrap().extend(batch.entries);
        Ok(())
    }
}
