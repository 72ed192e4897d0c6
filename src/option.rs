//! MPTCP option subtype decoding (RFC 8684, section 3)

use serde::{Deserialize, Serialize};

/// TCP option kind assigned to Multipath TCP
pub const MPTCP_OPTION_KIND: u8 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MptcpSubtype {
    MpCapable,
    MpJoin,
    Dss,
    AddAddr,
    RemoveAddr,
    MpPrio,
    MpFail,
    MpFastclose,
}

impl MptcpSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            MptcpSubtype::MpCapable => "MP_CAPABLE",
            MptcpSubtype::MpJoin => "MP_JOIN",
            MptcpSubtype::Dss => "DSS",
            MptcpSubtype::AddAddr => "ADD_ADDR",
            MptcpSubtype::RemoveAddr => "REMOVE_ADDR",
            MptcpSubtype::MpPrio => "MP_PRIO",
            MptcpSubtype::MpFail => "MP_FAIL",
            MptcpSubtype::MpFastclose => "MP_FASTCLOSE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "MP_CAPABLE" => Some(MptcpSubtype::MpCapable),
            "MP_JOIN" => Some(MptcpSubtype::MpJoin),
            "DSS" => Some(MptcpSubtype::Dss),
            "ADD_ADDR" => Some(MptcpSubtype::AddAddr),
            "REMOVE_ADDR" => Some(MptcpSubtype::RemoveAddr),
            "MP_PRIO" => Some(MptcpSubtype::MpPrio),
            "MP_FAIL" => Some(MptcpSubtype::MpFail),
            "MP_FASTCLOSE" => Some(MptcpSubtype::MpFastclose),
            _ => None,
        }
    }

    /// The 4-bit subtype value carried in the high nibble of the first option byte
    pub fn code(&self) -> u8 {
        match self {
            MptcpSubtype::MpCapable => 0x0,
            MptcpSubtype::MpJoin => 0x1,
            MptcpSubtype::Dss => 0x2,
            MptcpSubtype::AddAddr => 0x3,
            MptcpSubtype::RemoveAddr => 0x4,
            MptcpSubtype::MpPrio => 0x5,
            MptcpSubtype::MpFail => 0x6,
            MptcpSubtype::MpFastclose => 0x7,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0x0 => Some(MptcpSubtype::MpCapable),
            0x1 => Some(MptcpSubtype::MpJoin),
            0x2 => Some(MptcpSubtype::Dss),
            0x3 => Some(MptcpSubtype::AddAddr),
            0x4 => Some(MptcpSubtype::RemoveAddr),
            0x5 => Some(MptcpSubtype::MpPrio),
            0x6 => Some(MptcpSubtype::MpFail),
            0x7 => Some(MptcpSubtype::MpFastclose),
            _ => None,
        }
    }

    pub fn all() -> [MptcpSubtype; 8] {
        [
            MptcpSubtype::MpCapable,
            MptcpSubtype::MpJoin,
            MptcpSubtype::Dss,
            MptcpSubtype::AddAddr,
            MptcpSubtype::RemoveAddr,
            MptcpSubtype::MpPrio,
            MptcpSubtype::MpFail,
            MptcpSubtype::MpFastclose,
        ]
    }
}

impl std::fmt::Display for MptcpSubtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode the subtype of one MPTCP option occurrence.
///
/// `payload` is the option data following the kind and length bytes. Only the
/// high nibble of the first byte is inspected; the low nibble carries
/// subtype-specific flags. Returns `None` for an empty payload or a subtype
/// outside the eight defined ones, and the caller drops such options.
pub fn decode_subtype(payload: &[u8]) -> Option<MptcpSubtype> {
    let first = *payload.first()?;
    MptcpSubtype::from_code((first & 0xF0) >> 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ignores_low_nibble() {
        assert_eq!(decode_subtype(&[0x00]), Some(MptcpSubtype::MpCapable));
        assert_eq!(decode_subtype(&[0x13]), Some(MptcpSubtype::MpJoin));
        assert_eq!(decode_subtype(&[0x1F, 0xAA]), Some(MptcpSubtype::MpJoin));
        assert_eq!(decode_subtype(&[0x20, 0x01]), Some(MptcpSubtype::Dss));
        assert_eq!(decode_subtype(&[0x7F]), Some(MptcpSubtype::MpFastclose));
    }

    #[test]
    fn test_decode_unrecognized() {
        assert_eq!(decode_subtype(&[]), None);
        assert_eq!(decode_subtype(&[0xF0]), None);
        // MP_TCPRST is outside the tracked set
        assert_eq!(decode_subtype(&[0x80]), None);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let payload = [0x31, 0x05, 0x0a, 0x00, 0x00, 0x01];
        assert_eq!(decode_subtype(&payload), decode_subtype(&payload));
    }

    #[test]
    fn test_code_matches_decoder() {
        for subtype in MptcpSubtype::all() {
            assert_eq!(decode_subtype(&[subtype.code() << 4]), Some(subtype));
            assert_eq!(MptcpSubtype::from_str(subtype.as_str()), Some(subtype));
        }
    }
}
