//! Multipath TCP flow sniffer
//!
//! Captures TCP segments carrying MPTCP options, batches them into fixed
//! windows, merges each window per directional flow and publishes one record
//! per flow and window to a topic.
//!
//! ```text
//! LiveCapture → decode_frame → BatchProcessor::insert
//!                                   │ every interval
//!                                   ▼
//!                     rotate → merge_window → TopicSink
//!                                               │
//!                        ProducerRegistry worker → PublisherBackend
//! ```

pub mod batch;
pub mod capture;
pub mod config;
pub mod event;
pub mod logging;
pub mod option;
pub mod sink;

pub use batch::{BatchProcessor, RotationHandle, RotationSummary};
pub use config::SnifferConfig;
pub use event::{CapturedEvent, FlowKey, FlowRecord};
pub use option::{decode_subtype, MptcpSubtype};
pub use sink::FlowSink;
