//! Source side: turning captured frames into events for the batch processor

pub mod decode;
pub mod live;

pub use decode::decode_frame;
pub use live::LiveCapture;

use crate::batch::BatchProcessor;
use crate::event::CapturedEvent;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub enum CaptureError {
    InterfaceNotFound(String),
    UnsupportedChannel(String),
    Io(std::io::Error),
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err)
    }
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::InterfaceNotFound(name) => write!(f, "Network interface not found: {}", name),
            CaptureError::UnsupportedChannel(name) => {
                write!(f, "Interface {} does not provide an Ethernet channel", name)
            }
            CaptureError::Io(e) => write!(f, "Capture IO error: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Result of polling a source once
#[derive(Debug)]
pub enum SourceItem {
    Event(CapturedEvent),
    /// A frame was consumed (or the read timed out) without a qualifying event
    Skipped,
    /// The source has no more frames
    Exhausted,
}

/// A feed of decoded events, in capture order
pub trait EventSource {
    fn next_event(&mut self) -> Result<SourceItem, CaptureError>;
}

/// Replays pre-recorded frames through the decoder
#[derive(Debug, Default)]
pub struct FrameReplay {
    frames: VecDeque<Vec<u8>>,
}

impl FrameReplay {
    pub fn new(frames: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl EventSource for FrameReplay {
    fn next_event(&mut self) -> Result<SourceItem, CaptureError> {
        match self.frames.pop_front() {
            Some(frame) => Ok(decode_frame(&frame).map_or(SourceItem::Skipped, SourceItem::Event)),
            None => Ok(SourceItem::Exhausted),
        }
    }
}

/// Feed `source` into `processor` until the source is exhausted or `stop` is set.
///
/// Blocking; run it on a dedicated thread. Returns the number of events inserted.
pub fn run_source<S>(
    source: &mut S,
    processor: &BatchProcessor,
    stop: &AtomicBool,
) -> Result<u64, CaptureError>
where
    S: EventSource + ?Sized,
{
    let mut inserted = 0u64;

    while !stop.load(Ordering::Relaxed) {
        match source.next_event()? {
            SourceItem::Event(event) => {
                if inserted == 0 {
                    log::info!(
                        "📥 First MPTCP packet: {} options={:?}",
                        event.flow_key(),
                        event.options()
                    );
                }
                processor.insert(event);
                inserted += 1;
            }
            SourceItem::Skipped => continue,
            SourceItem::Exhausted => {
                log::info!("Capture source exhausted after {} events", inserted);
                break;
            }
        }
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::decode::tests::ipv4_frame;
    use super::*;
    use crate::event::FlowRecord;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_replay_feeds_processor() {
        let frames = vec![
            ipv4_frame([10, 0, 0, 1], [10, 0, 0, 2], 40000, 443, 1, &[30, 4, 0x00, 0x81]),
            ipv4_frame([10, 0, 0, 1], [10, 0, 0, 2], 40000, 443, 2, &[2, 4, 0x05, 0xb4]),
            ipv4_frame([10, 0, 0, 1], [10, 0, 0, 2], 40000, 443, 3, &[30, 4, 0x20, 0x01]),
        ];
        let mut source = FrameReplay::new(frames);
        let processor = BatchProcessor::new();
        let stop = AtomicBool::new(false);

        let inserted = run_source(&mut source, &processor, &stop).unwrap();
        assert_eq!(inserted, 2);

        let records = Arc::new(Mutex::new(Vec::new()));
        let sink_records = Arc::clone(&records);
        processor.rotate(&move |record: FlowRecord| sink_records.lock().unwrap().push(record));

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].packet_count, 2);
        assert_eq!(records[0].seq_num, 3);
    }

    #[test]
    fn test_stop_flag_halts_feed() {
        let frames = vec![ipv4_frame([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, 3, &[30, 4, 0x00, 0x81])];
        let mut source = FrameReplay::new(frames);
        let processor = BatchProcessor::new();
        let stop = AtomicBool::new(true);

        assert_eq!(run_source(&mut source, &processor, &stop).unwrap(), 0);
        assert_eq!(processor.pending(), 0);
    }
}
