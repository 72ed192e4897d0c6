use super::backend::{OutboundMessage, PublishError, PublisherBackend};
use super::wire::PayloadFormat;
use crate::config::KafkaConfig;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;

const QUEUE_TIMEOUT: Duration = Duration::from_secs(5);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

impl From<KafkaError> for PublishError {
    fn from(err: KafkaError) -> Self {
        PublishError::Rejected(err.to_string())
    }
}

/// Create the producer shared by every topic
pub fn connect(config: &KafkaConfig) -> Result<FutureProducer, PublishError> {
    let mut client = ClientConfig::new();
    for (key, value) in config.client_properties() {
        client.set(key, value);
    }

    let producer: FutureProducer = client.create()?;

    log::info!(
        "🔗 Kafka producer ready ({} brokers, tls: {}, auth: {:?})",
        config.brokers.len(),
        config.tls,
        config.auth
    );

    Ok(producer)
}

/// Publishes protobuf-encoded records to one Kafka topic
pub struct KafkaPublisher {
    producer: FutureProducer,
}

impl KafkaPublisher {
    pub fn new(producer: FutureProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl PublisherBackend for KafkaPublisher {
    async fn publish(&mut self, message: &OutboundMessage) -> Result<(), PublishError> {
        let record = FutureRecord::to(&message.topic)
            .key(&message.key)
            .payload(&message.payload)
            .timestamp(message.timestamp.saturating_mul(1000));

        self.producer
            .send(record, Timeout::After(QUEUE_TIMEOUT))
            .await
            .map(|_| ())
            .map_err(|(e, _)| PublishError::from(e))
    }

    async fn flush(&mut self) -> Result<(), PublishError> {
        self.producer.flush(Timeout::After(FLUSH_TIMEOUT))?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "KAFKA"
    }

    fn payload_format(&self) -> PayloadFormat {
        PayloadFormat::Protobuf
    }
}
