//! The ingress side: how externally produced records enter the topic.

use crate::config::ProcessingGuarantees;
use crate::error::SourceFatalError;
use bytes::Bytes;

/// Whether a source acknowledges cumulatively or one record at a time.
/// `EffectivelyOnce` needs cumulative acknowledgement so that a single
/// mark-delete advance covers every record up to it; weaker guarantees
/// acknowledge individually since redelivery on failure is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    Cumulative,
    Individual,
}

pub fn ack_mode_for(guarantees: ProcessingGuarantees) -> AckMode {
    match guarantees {
        ProcessingGuarantees::EffectivelyOnce => AckMode::Cumulative,
        ProcessingGuarantees::AtLeastOnce | ProcessingGuarantees::AtMostOnce => {
            AckMode::Individual
        }
    }
}

/// One record handed up from a pluggable source, with its ack/fail
/// closures already bound to whatever bookkeeping the source needs to do.
pub struct IngressRecord {
    pub payload: Bytes,
    pub topic: String,
    guarantees: ProcessingGuarantees,
    ack: Box<dyn FnOnce() + Send>,
    fail: Box<dyn FnOnce(&str) + Send>,
}

impl IngressRecord {
    pub fn new(
        payload: Bytes,
        topic: String,
        guarantees: ProcessingGuarantees,
        ack: impl FnOnce() + Send + 'static,
        fail: impl FnOnce(&str) + Send + 'static,
    ) -> Self {
        Self {
            payload,
            topic,
            guarantees,
            ack: Box::new(ack),
            fail: Box::new(fail),
        }
    }

    pub fn ack_mode(&self) -> AckMode {
        ack_mode_for(self.guarantees)
    }

    pub fn ack(self) {
        (self.ack)();
    }

    /// Under `EffectivelyOnce`, failing a record halts its progress for
    /// good; under weaker guarantees it's a no-op and the broker's unack
    /// timeout will redeliver the message instead.
    pub fn fail(self, reason: impl Into<String>) -> Result<(), SourceFatalError> {
        let reason = reason.into();
        match self.guarantees {
            ProcessingGuarantees::EffectivelyOnce => {
                let topic = self.topic.clone();
                (self.fail)(&reason);
                Err(SourceFatalError { topic, reason })
            }
            ProcessingGuarantees::AtLeastOnce | ProcessingGuarantees::AtMostOnce => {
                (self.fail)(&reason);
                Ok(())
            }
        }
    }
}

/// Resolves the topic name a record should be attributed to: the envelope
/// topic when the source multiplexes multiple topics, else the
/// subscription's own topic.
pub fn resolve_topic(envelope_topic: Option<&str>, subscription_topic: &str) -> String {
    envelope_topic.unwrap_or(subscription_topic).to_string()
}

/// A pluggable source delivering externally produced records into the
/// topic. Implementations resolve pattern subscriptions to their expanded
/// topic list for introspection.
pub trait SourceConnector: Send {
    fn input_topics(&self) -> Vec<String>;
}
