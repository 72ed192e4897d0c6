use super::{decode_frame, CaptureError, EventSource, SourceItem};
use pnet::datalink::{self, Channel, Config, DataLinkReceiver};
use std::io::ErrorKind;
use std::time::Duration;

/// Read timeout so the capture loop gets to check its stop flag on idle links
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Live, promiscuous capture on one network interface
pub struct LiveCapture {
    interface: String,
    rx: Box<dyn DataLinkReceiver>,
    frames_seen: u64,
}

impl LiveCapture {
    pub fn open(interface: &str) -> Result<Self, CaptureError> {
        let iface = datalink::interfaces()
            .into_iter()
            .find(|candidate| candidate.name == interface)
            .ok_or_else(|| CaptureError::InterfaceNotFound(interface.to_string()))?;

        let config = Config {
            read_timeout: Some(READ_TIMEOUT),
            promiscuous: true,
            ..Default::default()
        };

        let rx = match datalink::channel(&iface, config)? {
            Channel::Ethernet(_tx, rx) => rx,
            _ => return Err(CaptureError::UnsupportedChannel(interface.to_string())),
        };

        log::info!("🔌 Capturing on {} (promiscuous)", interface);

        Ok(Self {
            interface: interface.to_string(),
            rx,
            frames_seen: 0,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl EventSource for LiveCapture {
    fn next_event(&mut self) -> Result<SourceItem, CaptureError> {
        match self.rx.next() {
            Ok(frame) => {
                self.frames_seen += 1;
                Ok(decode_frame(frame).map_or(SourceItem::Skipped, SourceItem::Event))
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(SourceItem::Skipped)
            }
            Err(e) => Err(CaptureError::Io(e)),
        }
    }
}
