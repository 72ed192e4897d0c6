use crate::option::MptcpSubtype;
use serde::{Deserialize, Serialize};

/// One qualifying packet: a TCP segment carrying at least one recognized MPTCP option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    src_addr: String,
    dst_addr: String,
    src_port: u16,
    dst_port: u16,
    seq_num: u32,
    captured_at: i64,
    options: Vec<MptcpSubtype>,
}

impl CapturedEvent {
    /// Build an event stamped with the current time.
    ///
    /// Returns `None` when `options` is empty; such packets never reach the aggregator.
    pub fn new(
        src_addr: impl Into<String>,
        dst_addr: impl Into<String>,
        src_port: u16,
        dst_port: u16,
        seq_num: u32,
        options: impl IntoIterator<Item = MptcpSubtype>,
    ) -> Option<Self> {
        Self::with_timestamp(
            src_addr,
            dst_addr,
            src_port,
            dst_port,
            seq_num,
            current_timestamp(),
            options,
        )
    }

    pub fn with_timestamp(
        src_addr: impl Into<String>,
        dst_addr: impl Into<String>,
        src_port: u16,
        dst_port: u16,
        seq_num: u32,
        captured_at: i64,
        options: impl IntoIterator<Item = MptcpSubtype>,
    ) -> Option<Self> {
        let mut unique = Vec::new();
        for option in options {
            if !unique.contains(&option) {
                unique.push(option);
            }
        }

        if unique.is_empty() {
            return None;
        }

        Some(Self {
            src_addr: src_addr.into(),
            dst_addr: dst_addr.into(),
            src_port,
            dst_port,
            seq_num,
            captured_at,
            options: unique,
        })
    }

    pub fn src_addr(&self) -> &str {
        &self.src_addr
    }

    pub fn dst_addr(&self) -> &str {
        &self.dst_addr
    }

    pub fn src_port(&self) -> u16 {
        self.src_port
    }

    pub fn dst_port(&self) -> u16 {
        self.dst_port
    }

    pub fn seq_num(&self) -> u32 {
        self.seq_num
    }

    pub fn captured_at(&self) -> i64 {
        self.captured_at
    }

    /// Option subtypes in order of first occurrence, without duplicates
    pub fn options(&self) -> &[MptcpSubtype] {
        &self.options
    }

    pub fn flow_key(&self) -> FlowKey {
        FlowKey {
            src_addr: self.src_addr.clone(),
            src_port: self.src_port,
            dst_addr: self.dst_addr.clone(),
            dst_port: self.dst_port,
        }
    }
}

/// Directional 4-tuple. The reverse direction of a connection is a different key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub src_addr: String,
    pub src_port: u16,
    pub dst_addr: String,
    pub dst_port: u16,
}

impl FlowKey {
    /// True if `event` belongs to this flow
    pub fn matches(&self, event: &CapturedEvent) -> bool {
        self.src_port == event.src_port
            && self.dst_port == event.dst_port
            && self.src_addr == event.src_addr
            && self.dst_addr == event.dst_addr
    }
}

impl std::fmt::Display for FlowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}->{}:{}",
            self.src_addr, self.src_port, self.dst_addr, self.dst_port
        )
    }
}

/// Per-window summary of one flow, handed to the sink once and then dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    #[serde(flatten)]
    pub key: FlowKey,
    /// Sequence number of the event that opened this record
    pub seq_num: u32,
    /// Capture time of the event that opened this record
    pub timestamp_captured: i64,
    pub mptcp_options: Vec<MptcpSubtype>,
    /// Number of events merged into this record
    pub packet_count: u64,
}

impl FlowRecord {
    pub fn from_event(event: CapturedEvent) -> Self {
        let key = event.flow_key();
        Self {
            key,
            seq_num: event.seq_num,
            timestamp_captured: event.captured_at,
            mptcp_options: event.options,
            packet_count: 1,
        }
    }

    /// Fold a later event of the same flow into this record.
    ///
    /// Options not yet present are appended; sequence number and timestamp stay
    /// those of the opening event.
    pub fn absorb(&mut self, event: &CapturedEvent) {
        for option in &event.options {
            if !self.mptcp_options.contains(option) {
                self.mptcp_options.push(*option);
            }
        }
        self.packet_count += 1;
    }
}

/// Current Unix timestamp in seconds
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_dedups_options_in_order() {
        let event = CapturedEvent::with_timestamp(
            "10.0.0.1",
            "10.0.0.2",
            1000,
            2000,
            7,
            1_700_000_000,
            [
                MptcpSubtype::Dss,
                MptcpSubtype::MpJoin,
                MptcpSubtype::Dss,
                MptcpSubtype::MpJoin,
            ],
        )
        .unwrap();

        assert_eq!(event.options(), &[MptcpSubtype::Dss, MptcpSubtype::MpJoin]);
        assert_eq!(event.captured_at(), 1_700_000_000);
    }

    #[test]
    fn test_event_without_options_is_not_built() {
        let event = CapturedEvent::new("10.0.0.1", "10.0.0.2", 1000, 2000, 7, []);
        assert!(event.is_none());
    }

    #[test]
    fn test_flow_key_is_directional() {
        let forward =
            CapturedEvent::new("10.0.0.1", "10.0.0.2", 1000, 2000, 1, [MptcpSubtype::Dss]).unwrap();
        let reverse =
            CapturedEvent::new("10.0.0.2", "10.0.0.1", 2000, 1000, 1, [MptcpSubtype::Dss]).unwrap();

        assert_ne!(forward.flow_key(), reverse.flow_key());
        assert!(forward.flow_key().matches(&forward));
        assert!(!forward.flow_key().matches(&reverse));
        assert_eq!(forward.flow_key().to_string(), "10.0.0.1:1000->10.0.0.2:2000");
    }

    #[test]
    fn test_record_keeps_opening_seq_and_timestamp() {
        let first = CapturedEvent::with_timestamp(
            "::1", "::2", 80, 443, 100, 10, [MptcpSubtype::MpCapable],
        )
        .unwrap();
        let later = CapturedEvent::with_timestamp(
            "::1", "::2", 80, 443, 900, 20, [MptcpSubtype::MpCapable, MptcpSubtype::Dss],
        )
        .unwrap();

        let mut record = FlowRecord::from_event(first);
        record.absorb(&later);

        assert_eq!(record.seq_num, 100);
        assert_eq!(record.timestamp_captured, 10);
        assert_eq!(
            record.mptcp_options,
            vec![MptcpSubtype::MpCapable, MptcpSubtype::Dss]
        );
        assert_eq!(record.packet_count, 2);
    }

    #[test]
    fn test_record_serializes_flat() {
        let event = CapturedEvent::with_timestamp(
            "192.0.2.1", "192.0.2.2", 80, 443, 5, 42, [MptcpSubtype::AddAddr],
        )
        .unwrap();
        let json = serde_json::to_value(FlowRecord::from_event(event)).unwrap();

        assert_eq!(json["src_addr"], "192.0.2.1");
        assert_eq!(json["dst_port"], 443);
        assert_eq!(json["mptcp_options"][0], "ADD_ADDR");
        assert_eq!(json["packet_count"], 1);
    }
}
