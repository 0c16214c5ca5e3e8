//! Configuration options the dispatcher recognizes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingGuarantees {
    AtMostOnce,
    AtLeastOnce,
    EffectivelyOnce,
}

/// The subscription type this dispatcher implements. Reported for
/// introspection; there's only one variant because this crate only
/// implements the key-shared dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionType {
    KeyShared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub processing_guarantees: ProcessingGuarantees,
    pub subscription_type: SubscriptionType,
    /// Enables rate limiting for consumers that have no backlog (are
    /// caught up to the log tail).
    pub dispatch_throttling_on_non_backlog_consumer_enabled: bool,
    /// Cursor-level ceiling that gates reads; the dispatcher itself never
    /// counts unacked messages, it just documents that it relies on the
    /// cursor/subscription layer to refuse further reads once this is hit.
    pub max_unacked_messages_per_subscription: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            processing_guarantees: ProcessingGuarantees::AtLeastOnce,
            subscription_type: SubscriptionType::KeyShared,
            dispatch_throttling_on_non_backlog_consumer_enabled: false,
            max_unacked_messages_per_subscription: 50_000,
        }
    }
}
