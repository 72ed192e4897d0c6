//! Payload encodings for published flow records
//!
//! Brokers get the binary protobuf form (`MptcpMessage`); file and log
//! backends keep the JSON form so the output stays line-oriented and readable.

use super::backend::PublishError;
use crate::event::FlowRecord;
use prost::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Json,
    Protobuf,
}

impl PayloadFormat {
    pub fn encode(self, record: &FlowRecord) -> Result<Vec<u8>, PublishError> {
        match self {
            PayloadFormat::Json => Ok(serde_json::to_vec(record)?),
            PayloadFormat::Protobuf => Ok(MptcpMessage::from(record).encode_to_vec()),
        }
    }
}

/// Protobuf schema of one flow record
///
/// ```proto
/// message MPTCPMessage {
///   string src_addr = 1;
///   string dst_addr = 2;
///   uint32 src_port = 3;
///   uint32 dst_port = 4;
///   uint32 seq_num = 5;
///   int64 timestamp_captured = 6;
///   repeated string mptcp_options = 7;
///   uint64 packet_count = 8;
/// }
/// ```
#[derive(Clone, PartialEq, Message)]
pub struct MptcpMessage {
    #[prost(string, tag = "1")]
    pub src_addr: String,
    #[prost(string, tag = "2")]
    pub dst_addr: String,
    #[prost(uint32, tag = "3")]
    pub src_port: u32,
    #[prost(uint32, tag = "4")]
    pub dst_port: u32,
    #[prost(uint32, tag = "5")]
    pub seq_num: u32,
    /// Unix seconds
    #[prost(int64, tag = "6")]
    pub timestamp_captured: i64,
    /// Subtype mnemonics, e.g. `MP_CAPABLE`
    #[prost(string, repeated, tag = "7")]
    pub mptcp_options: Vec<String>,
    #[prost(uint64, tag = "8")]
    pub packet_count: u64,
}

impl From<&FlowRecord> for MptcpMessage {
    fn from(record: &FlowRecord) -> Self {
        Self {
            src_addr: record.key.src_addr.clone(),
            dst_addr: record.key.dst_addr.clone(),
            src_port: u32::from(record.key.src_port),
            dst_port: u32::from(record.key.dst_port),
            seq_num: record.seq_num,
            timestamp_captured: record.timestamp_captured,
            mptcp_options: record
                .mptcp_options
                .iter()
                .map(|option| option.as_str().to_string())
                .collect(),
            packet_count: record.packet_count,
        }
    }
}
