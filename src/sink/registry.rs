//! Per-topic producer workers
//!
//! Each topic gets one bounded queue and one worker task, created the first
//! time the topic is asked for. The worker owns its `PublisherBackend`, so a
//! slow or failing backend only backs up its own queue.

use super::backend::{OutboundMessage, PublishError, PublisherBackend};
use super::retry::{PublishBackoff, RetryPolicy};
use super::FlowSink;
use crate::event::FlowRecord;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

/// Builds the backend for a topic
pub type BackendFactory =
    Arc<dyn Fn(&str) -> Result<Box<dyn PublisherBackend>, PublishError> + Send + Sync>;

struct TopicProducer {
    tx: mpsc::Sender<FlowRecord>,
    worker: JoinHandle<()>,
}

pub struct ProducerRegistry {
    factory: BackendFactory,
    queue_capacity: usize,
    retry: RetryPolicy,
    producers: Mutex<HashMap<String, TopicProducer>>,
}

impl ProducerRegistry {
    pub fn new(factory: BackendFactory, queue_capacity: usize, retry: RetryPolicy) -> Self {
        Self {
            factory,
            queue_capacity: queue_capacity.max(1),
            retry,
            producers: Mutex::new(HashMap::new()),
        }
    }

    /// Sender for `topic`, starting its worker on first use.
    ///
    /// Must be called from within a tokio runtime.
    pub fn producer_channel(&self, topic: &str) -> Result<mpsc::Sender<FlowRecord>, PublishError> {
        let mut producers = self.lock_producers();

        if let Some(producer) = producers.get(topic) {
            return Ok(producer.tx.clone());
        }

        let backend = (self.factory)(topic)?;
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let worker = tokio::spawn(run_topic_worker(
            topic.to_string(),
            rx,
            backend,
            self.retry,
        ));

        producers.insert(
            topic.to_string(),
            TopicProducer {
                tx: tx.clone(),
                worker,
            },
        );

        Ok(tx)
    }

    /// A `FlowSink` feeding `topic`
    pub fn sink(&self, topic: &str, log_records: bool) -> Result<TopicSink, PublishError> {
        Ok(TopicSink {
            topic: topic.to_string(),
            tx: self.producer_channel(topic)?,
            log_records,
            dropped: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn topics(&self) -> Vec<String> {
        self.lock_producers().keys().cloned().collect()
    }

    /// Close every queue and wait for the workers to drain and flush.
    ///
    /// A worker exits once all senders for its topic are gone, so sinks handed
    /// out earlier must be dropped before awaiting this.
    pub async fn shutdown(&self) {
        let producers: Vec<(String, TopicProducer)> = self.lock_producers().drain().collect();

        for (topic, producer) in producers {
            drop(producer.tx);
            if let Err(e) = producer.worker.await {
                log::error!("❌ Producer for topic {} ended abnormally: {}", topic, e);
            }
        }
    }

    fn lock_producers(&self) -> MutexGuard<'_, HashMap<String, TopicProducer>> {
        self.producers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_topic_worker(
    topic: String,
    mut rx: mpsc::Receiver<FlowRecord>,
    mut backend: Box<dyn PublisherBackend>,
    retry: RetryPolicy,
) {
    log::info!("📤 Producer for topic {} started ({})", topic, backend.backend_type());

    let mut published = 0u64;
    let mut dropped = 0u64;

    while let Some(record) = rx.recv().await {
        let message = match OutboundMessage::encode(&topic, &record, backend.payload_format()) {
            Ok(message) => message,
            Err(e) => {
                log::error!("❌ Could not encode record for topic {}: {}", topic, e);
                dropped += 1;
                continue;
            }
        };

        match publish_with_retry(backend.as_mut(), &message, retry).await {
            Ok(()) => published += 1,
            Err(e) => {
                log::error!("❌ Dropping record {} for topic {}: {}", message.key, topic, e);
                dropped += 1;
            }
        }
    }

    if let Err(e) = backend.flush().await {
        log::error!("❌ Final flush for topic {} failed: {}", topic, e);
    }

    log::info!(
        "Producer for topic {} terminated, channel closed ({} published, {} dropped)",
        topic,
        published,
        dropped
    );
}

async fn publish_with_retry(
    backend: &mut dyn PublisherBackend,
    message: &OutboundMessage,
    retry: RetryPolicy,
) -> Result<(), PublishError> {
    let mut backoff = PublishBackoff::new(retry);

    loop {
        match backend.publish(message).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                log::warn!("⚠️  Publish to {} failed: {}", message.topic, e);
                if backoff.sleep().await.is_err() {
                    return Err(e);
                }
            }
        }
    }
}

/// Hands records to one topic's producer queue without waiting.
///
/// A full or closed queue drops the record with a warning.
#[derive(Clone)]
pub struct TopicSink {
    topic: String,
    tx: mpsc::Sender<FlowRecord>,
    log_records: bool,
    /// Shared by clones
    dropped: Arc<AtomicU64>,
}

impl TopicSink {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Records refused because the queue was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FlowSink for TopicSink {
    fn accept(&self, record: FlowRecord) {
        if self.log_records {
            let options: Vec<&str> = record.mptcp_options.iter().map(|o| o.as_str()).collect();
            log::info!(
                "Flow {} seq={} options=[{}] packets={}",
                record.key,
                record.seq_num,
                options.join(","),
                record.packet_count
            );
        }

        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "⚠️  Producer queue for {} full, dropping flow {}",
                    self.topic,
                    record.key
                );
            }
            Err(TrySendError::Closed(record)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "⚠️  Producer for {} closed, dropping flow {}",
                    self.topic,
                    record.key
                );
            }
        }
    }
}
