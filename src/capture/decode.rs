//! Ethernet frame → `CapturedEvent`

use crate::event::CapturedEvent;
use crate::option::{decode_subtype, MPTCP_OPTION_KIND};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::Packet;
use std::net::IpAddr;

/// Decode one link-layer frame.
///
/// Returns an event only for TCP segments (over IPv4 or IPv6) that carry at
/// least one recognized MPTCP option. Everything else, including truncated
/// frames and non-first IPv4 fragments, yields `None`.
pub fn decode_frame(frame: &[u8]) -> Option<CapturedEvent> {
    let ethernet = EthernetPacket::new(frame)?;

    match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => {
            let ip = Ipv4Packet::new(ethernet.payload())?;
            if ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp
                || ip.get_fragment_offset() != 0
            {
                return None;
            }
            decode_segment(
                IpAddr::V4(ip.get_source()),
                IpAddr::V4(ip.get_destination()),
                ip.payload(),
            )
        }
        EtherTypes::Ipv6 => {
            let ip = Ipv6Packet::new(ethernet.payload())?;
            if ip.get_next_header() != IpNextHeaderProtocols::Tcp {
                return None;
            }
            decode_segment(
                IpAddr::V6(ip.get_source()),
                IpAddr::V6(ip.get_destination()),
                ip.payload(),
            )
        }
        _ => None,
    }
}

fn decode_segment(src: IpAddr, dst: IpAddr, segment: &[u8]) -> Option<CapturedEvent> {
    let tcp = TcpPacket::new(segment)?;

    let mut subtypes = Vec::new();
    for option in tcp.get_options_iter() {
        if option.get_number().0 != MPTCP_OPTION_KIND {
            continue;
        }

        let payload = option.payload();
        let declared = option.get_length_raw().first().copied().unwrap_or(0) as usize;
        if payload.len() + 2 < declared {
            log::trace!(
                "Skipping MPTCP option overrunning the header ({} of {} bytes)",
                payload.len() + 2,
                declared
            );
            continue;
        }

        match decode_subtype(payload) {
            Some(subtype) => subtypes.push(subtype),
            None => log::trace!("Skipping unrecognized MPTCP option {}", hex::encode(payload)),
        }
    }

    CapturedEvent::new(
        src.to_string(),
        dst.to_string(),
        tcp.get_source(),
        tcp.get_destination(),
        tcp.get_sequence(),
        subtypes,
    )
}
