use super::wire::PayloadFormat;
use crate::event::FlowRecord;
use async_trait::async_trait;

#[derive(Debug)]
pub enum PublishError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Rejected(String),
}

impl From<std::io::Error> for PublishError {
    fn from(err: std::io::Error) -> Self {
        PublishError::Io(err)
    }
}

impl From<serde_json::Error> for PublishError {
    fn from(err: serde_json::Error) -> Self {
        PublishError::Serialization(err)
    }
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::Io(e) => write!(f, "IO error: {}", e),
            PublishError::Serialization(e) => write!(f, "Serialization error: {}", e),
            PublishError::Rejected(msg) => write!(f, "Publish rejected: {}", msg),
        }
    }
}

impl std::error::Error for PublishError {}

/// One encoded record addressed to a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    /// Flow key, `src:sport->dst:dport`
    pub key: String,
    /// Capture time of the record, Unix seconds
    pub timestamp: i64,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    pub fn encode(
        topic: &str,
        record: &FlowRecord,
        format: PayloadFormat,
    ) -> Result<Self, PublishError> {
        Ok(Self {
            topic: topic.to_string(),
            key: record.key.to_string(),
            timestamp: record.timestamp_captured,
            payload: format.encode(record)?,
        })
    }
}

#[async_trait]
pub trait PublisherBackend: Send {
    /// Publish a single message
    async fn publish(&mut self, message: &OutboundMessage) -> Result<(), PublishError>;

    /// Flush pending writes
    async fn flush(&mut self) -> Result<(), PublishError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;

    /// Encoding the backend expects in `OutboundMessage::payload`
    fn payload_format(&self) -> PayloadFormat {
        PayloadFormat::Json
    }
}
