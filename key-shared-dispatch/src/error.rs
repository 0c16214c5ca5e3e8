//! Error kinds surfaced across the dispatcher's public API.
//!
//! Most failure modes here are absorbed internally rather than escalated:
//! a selector with no live consumers isn't an error, permit exhaustion
//! just defers entries to the redelivery set, and a consumer disconnect
//! during a send is handled by returning those entries to the redelivery
//! set rather than by surfacing anything to the caller. `DispatchError`
//! only carries the cases that actually stop the dispatcher.

pub use crate::cursor::CursorError;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("consumer {0:?} disconnected before completing send")]
    ConsumerDisconnected(String),
}

/// Raised when the ingress `fail()` closure is invoked under the
/// `EffectivelyOnce` processing guarantee. This is the one ingress-side
/// failure that's fatal rather than a no-op relying on unack-timeout
/// redelivery.
#[derive(Debug, thiserror::Error)]
#[error("ingress record on topic {topic:?} failed under effectively-once processing: {reason}")]
pub struct SourceFatalError {
    pub topic: String,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The cursor hit a terminal error (`CursorClosed` or
    /// `ManagedLedgerTerminated`): the dispatcher stops reading for good.
    #[error("dispatcher stopped: {0}")]
    Cursor(#[from] CursorError),
}
