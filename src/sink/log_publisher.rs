use super::backend::{OutboundMessage, PublishError, PublisherBackend};
use async_trait::async_trait;

/// Dry-run backend: logs each message instead of shipping it anywhere
#[derive(Debug, Default)]
pub struct LogPublisher {
    published: u64,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> u64 {
        self.published
    }
}

#[async_trait]
impl PublisherBackend for LogPublisher {
    async fn publish(&mut self, message: &OutboundMessage) -> Result<(), PublishError> {
        self.published += 1;
        log::info!(
            "[{}] {} {}",
            message.topic,
            message.key,
            String::from_utf8_lossy(&message.payload)
        );
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), PublishError> {
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "LOG"
    }
}
