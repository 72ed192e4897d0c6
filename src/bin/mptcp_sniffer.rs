//! MPTCP sniffer runtime
//!
//! Captures on one interface, aggregates MPTCP option usage per flow and
//! window, and publishes the records to a topic.
//!
//! ## Usage
//!
//! ```bash
//! sudo cargo run --release --bin mptcp_sniffer -- --interface eth0 --backend jsonl
//! sudo cargo run --release --features kafka --bin mptcp_sniffer -- --backend kafka
//! ```
//!
//! See `SnifferConfig::from_env` for the environment variables.

use mptcpflow::batch::BatchProcessor;
use mptcpflow::capture::{run_source, CaptureError, LiveCapture};
use mptcpflow::config::{BackendType, SnifferConfig};
use mptcpflow::logging;
use mptcpflow::sink::{
    BackendFactory, FlowSink, JsonlPublisher, LogPublisher, ProducerRegistry, PublishError,
    PublisherBackend, RetryPolicy,
};
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let config = SnifferConfig::from_env()?;

    if let Err(e) = logging::init(&config.rust_log, config.log_file.as_deref()) {
        eprintln!("Error opening log file {:?}: {}", config.log_file, e);
        return Err(e.into());
    }

    log::info!("🚀 Starting MPTCP sniffer");
    log::info!("   Interface: {}", config.interface);
    log::info!("   Interval: {}s", config.interval_secs);
    log::info!("   Topic: {}", config.out_topic);
    log::info!("   Backend: {:?}", config.backend);
    if let Some(path) = &config.log_file {
        log::info!("   Log file: {}", path.display());
    }

    let factory = backend_factory(&config)?;
    let registry = ProducerRegistry::new(factory, config.queue_capacity, RetryPolicy::default());
    let sink: Arc<dyn FlowSink> = Arc::new(registry.sink(&config.out_topic, config.log_packets)?);

    let processor = Arc::new(BatchProcessor::new());
    let rotation = processor.start(config.interval(), Arc::clone(&sink));

    let stop = Arc::new(AtomicBool::new(false));
    let mut source = LiveCapture::open(&config.interface)?;
    let capture_processor = Arc::clone(&processor);
    let capture_stop = Arc::clone(&stop);
    let mut capture = tokio::task::spawn_blocking(move || {
        run_source(&mut source, &capture_processor, &capture_stop)
    });

    log::info!("✅ Pipeline configured, capturing...");

    let outcome = tokio::select! {
        result = &mut capture => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("🛑 Interrupt received, shutting down");
            stop.store(true, Ordering::Relaxed);
            capture.await
        }
    };

    // reported after the pipeline is drained
    let failure = capture_failure(outcome);

    if let Err(e) = rotation.shutdown().await {
        log::error!("❌ Rotation timer task ended abnormally: {}", e);
    }

    // last partial window
    let final_sink = Arc::clone(&sink);
    let final_processor = Arc::clone(&processor);
    let summary =
        tokio::task::spawn_blocking(move || final_processor.rotate(final_sink.as_ref())).await?;
    log::info!(
        "🔄 Final flush: {} events, {} flows",
        summary.events,
        summary.flows
    );

    drop(sink);
    registry.shutdown().await;

    match failure {
        Some(e) => Err(e),
        None => {
            log::info!("✅ MPTCP sniffer stopped");
            Ok(())
        }
    }
}

/// The error the process should exit with, if capture did not end cleanly
fn capture_failure(
    outcome: Result<Result<u64, CaptureError>, JoinError>,
) -> Option<Box<dyn Error>> {
    match outcome {
        Ok(Ok(count)) => {
            log::info!("Capture ended after {} events", count);
            None
        }
        Ok(Err(e)) => {
            log::error!("❌ Capture failed: {}", e);
            Some(e.into())
        }
        Err(e) => {
            log::error!("❌ Capture task failed: {}", e);
            Some(e.into())
        }
    }
}

fn backend_factory(config: &SnifferConfig) -> Result<BackendFactory, PublishError> {
    match config.backend {
        BackendType::Jsonl => {
            let dir = config.output_dir.clone();
            let max_size_mb = config.output_max_size_mb;
            let max_rotations = config.output_max_rotations;
            Ok(Arc::new(
                move |topic: &str| -> Result<Box<dyn PublisherBackend>, PublishError> {
                    let publisher = JsonlPublisher::for_topic(&dir, topic, max_size_mb, max_rotations)?;
                    log::info!("📊 Topic {} → {}", topic, publisher.path().display());
                    Ok(Box::new(publisher))
                },
            ))
        }
        BackendType::Log => Ok(Arc::new(
            |_topic: &str| -> Result<Box<dyn PublisherBackend>, PublishError> {
                Ok(Box::new(LogPublisher::new()))
            },
        )),
        BackendType::Kafka => kafka_factory(config),
    }
}

#[cfg(feature = "kafka")]
fn kafka_factory(config: &SnifferConfig) -> Result<BackendFactory, PublishError> {
    use mptcpflow::sink::kafka_publisher::{connect, KafkaPublisher};

    let producer = connect(&config.kafka)?;
    Ok(Arc::new(
        move |topic: &str| -> Result<Box<dyn PublisherBackend>, PublishError> {
            log::info!("📊 Topic {} → Kafka", topic);
            Ok(Box::new(KafkaPublisher::new(producer.clone())))
        },
    ))
}

#[cfg(not(feature = "kafka"))]
fn kafka_factory(_config: &SnifferConfig) -> Result<BackendFactory, PublishError> {
    Err(PublishError::Rejected(
        "kafka backend requested but this build lacks the `kafka` feature".to_string(),
    ))
}
