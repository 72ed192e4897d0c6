//! Sink side: where finished flow records go
//!
//! `FlowSink` is what the batch processor calls once per record. `TopicSink`
//! implements it by queueing records for a per-topic producer worker owned by
//! `ProducerRegistry`, which encodes them and publishes through a
//! `PublisherBackend`. The Kafka backend is behind the `kafka` feature.

pub mod backend;
pub mod jsonl_publisher;
#[cfg(feature = "kafka")]
pub mod kafka_publisher;
pub mod log_publisher;
pub mod registry;
pub mod retry;
pub mod wire;

pub use backend::{OutboundMessage, PublishError, PublisherBackend};
pub use jsonl_publisher::JsonlPublisher;
#[cfg(feature = "kafka")]
pub use kafka_publisher::KafkaPublisher;
pub use log_publisher::LogPublisher;
pub use registry::{BackendFactory, ProducerRegistry, TopicSink};
pub use retry::{PublishBackoff, RetryPolicy};
pub use wire::{MptcpMessage, PayloadFormat};

use crate::event::FlowRecord;

/// Receives merged flow records. Implementations must return quickly and must
/// not block on I/O; they run on the rotation path.
pub trait FlowSink: Send + Sync {
    fn accept(&self, record: FlowRecord);
}

impl<F> FlowSink for F
where
    F: Fn(FlowRecord) + Send + Sync,
{
    fn accept(&self, record: FlowRecord) {
        self(record)
    }
}
