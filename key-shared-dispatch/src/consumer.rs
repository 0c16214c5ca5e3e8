//! Consumer identity and the transport contract the dispatcher sends through.

use crate::entry::Entry;
use crate::error::SendError;
use async_trait::async_trait;
use std::sync::Arc;

/// Referentially-unique consumer identity.
///
/// Consumers are modeled as handles indexed by id rather than shared
/// objects: the dispatcher's consumer table is the only place that owns an
/// `Arc<Consumer>`, while the selector and the recently-joined table refer
/// to consumers only by `ConsumerId`. That keeps deregistration a matter of
/// removing an id from three maps instead of chasing shared references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConsumerId(pub u64);

/// What the dispatcher hands to a consumer transport for one send.
pub struct DispatchedBatch {
    pub entries: Vec<Entry>,
    pub total_messages: usize,
    pub total_bytes: usize,
}

/// The send-side interface of a consumer connection.
///
/// Implementations live outside this crate in a real deployment (they're
/// the broker's actual network connection to a consumer); the engine only
/// needs permit accounting and a way to push a batch out.
#[async_trait]
pub trait ConsumerTransport: Send + Sync {
    fn consumer_name(&self) -> &str;

    /// Non-negative remaining send credit. The dispatcher never sends more
    /// messages to a consumer in one cycle than this reports.
    fn available_permits(&self) -> i64;

    async fn send(&self, batch: DispatchedBatch) -> Result<(), SendError>;
}

/// A registered consumer: an id plus the transport used to reach it.
pub struct Consumer {
    id: ConsumerId,
    transport: Arc<dyn ConsumerTransport>,
}

impl Consumer {
    pub fn new(id: ConsumerId, transport: Arc<dyn ConsumerTransport>) -> Self {
        Self { id, transport }
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.transport.consumer_name()
    }

    pub fn available_permits(&self) -> i64 {
        self.transport.available_permits()
    }

    pub async fn send(&self, batch: DispatchedBatch) -> Result<(), SendError> {
        self.transport.send(batch).await
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("available_permits", &self.available_permits())
            .finish()
    }
}
