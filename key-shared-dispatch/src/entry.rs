//! Reference-counted log entries as they flow through the dispatcher.

use crate::position::Position;
use bytes::Bytes;
use std::sync::Arc;

struct EntryData {
    position: Position,
    payload: Bytes,
    sticky_key: Bytes,
}

/// A single record read off the cursor.
///
/// Cloning an `Entry` is cheap (it bumps a refcount); it does not duplicate
/// the payload. Every `Entry` the dispatcher pulls off the cursor must end
/// up either handed to exactly one consumer's transport, or explicitly
/// [`release`](Entry::release)d — the redelivery set remembers its position
/// either way, so no entry is silently forgotten.
#[derive(Clone)]
pub struct Entry(Arc<EntryData>);

impl Entry {
    pub fn new(position: Position, payload: Bytes, sticky_key: Bytes) -> Self {
        Self(Arc::new(EntryData {
            position,
            payload,
            sticky_key,
        }))
    }

    pub fn position(&self) -> Position {
        self.0.position
    }

    /// The sticky key, peeked without consuming the entry.
    pub fn sticky_key(&self) -> &[u8] {
        &self.0.sticky_key
    }

    pub fn payload(&self) -> &Bytes {
        &self.0.payload
    }

    pub fn payload_len(&self) -> usize {
        self.0.payload.len()
    }

    /// Explicitly gives up this entry's share of ownership. Equivalent to
    /// dropping it, but named for the call sites where the dispatcher is
    /// refusing to deliver an entry rather than finishing with one it sent.
    pub fn release(self) {
        drop(self);
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("position", &self.0.position)
            .field("payload_len", &self.0.payload.len())
            .field("sticky_key", &self.0.sticky_key)
            .finish()
    }
}
