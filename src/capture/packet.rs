//! Link-layer frame decoding down to TCP segments.

use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Utc};
use pnet::packet::ethernet::{EtherType, EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::{TcpFlags, TcpPacket};
use pnet::packet::Packet;

use crate::flow::FlowId;

const SLL_HEADER_LEN: usize = 16;
const NULL_HEADER_LEN: usize = 4;
const VLAN_TAG_LEN: usize = 4;

/// Link-layer framing of captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    /// BSD loopback: 4-byte address family, then IP.
    Null,
    /// Linux cooked capture v1.
    LinuxSll,
    /// Bare IPv4 or IPv6.
    Raw,
}

impl LinkType {
    /// Map a pcap LINKTYPE value.
    pub fn from_linktype(value: i32) -> Option<Self> {
        match value {
            0 | 108 => Some(LinkType::Null),
            1 => Some(LinkType::Ethernet),
            12 | 14 | 101 | 228 | 229 => Some(LinkType::Raw),
            113 => Some(LinkType::LinuxSll),
            _ => None,
        }
    }

    /// The pcap LINKTYPE value written for this framing.
    pub fn linktype(&self) -> i32 {
        match self {
            LinkType::Null => 0,
            LinkType::Ethernet => 1,
            LinkType::Raw => 101,
            LinkType::LinuxSll => 113,
        }
    }
}

/// One captured link-layer frame.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub link: LinkType,
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

/// A decoded TCP segment.
#[derive(Debug, Clone)]
pub struct TcpSegment {
    pub flow: FlowId,
    pub seq: u32,
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
    pub payload: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

/// Decode a frame to a TCP segment; `None` for anything else.
pub fn decode_frame(link: LinkType, data: &[u8], timestamp: DateTime<Utc>) -> Option<TcpSegment> {
    match link {
        LinkType::Ethernet => {
            let ethernet = EthernetPacket::new(data)?;
            decode_ethertype(ethernet.get_ethertype(), ethernet.payload(), timestamp)
        }
        LinkType::LinuxSll => {
            let protocol = u16::from_be_bytes([*data.get(14)?, *data.get(15)?]);
            decode_ethertype(EtherType(protocol), data.get(SLL_HEADER_LEN..)?, timestamp)
        }
        LinkType::Null => decode_ip(data.get(NULL_HEADER_LEN..)?, timestamp),
        LinkType::Raw => decode_ip(data, timestamp),
    }
}

fn decode_ethertype(ethertype: EtherType, payload: &[u8], timestamp: DateTime<Utc>) -> Option<TcpSegment> {
    match ethertype {
        EtherTypes::Ipv4 => decode_ipv4(payload, timestamp),
        EtherTypes::Ipv6 => decode_ipv6(payload, timestamp),
        EtherTypes::Vlan => {
            let inner = u16::from_be_bytes([*payload.get(2)?, *payload.get(3)?]);
            decode_ethertype(EtherType(inner), payload.get(VLAN_TAG_LEN..)?, timestamp)
        }
        _ => None,
    }
}

/// IP packet of either version, told apart by the version nibble.
fn decode_ip(data: &[u8], timestamp: DateTime<Utc>) -> Option<TcpSegment> {
    match data.first()? >> 4 {
        4 => decode_ipv4(data, timestamp),
        6 => decode_ipv6(data, timestamp),
        _ => None,
    }
}

fn decode_ipv4(data: &[u8], timestamp: DateTime<Utc>) -> Option<TcpSegment> {
    let ip = Ipv4Packet::new(data)?;
    if ip.get_version() != 4 || ip.get_header_length() < 5 {
        return None;
    }
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
        return None;
    }
    // Fragments are not reassembled.
    let more_fragments = ip.get_flags() & pnet::packet::ipv4::Ipv4Flags::MoreFragments != 0;
    if more_fragments || ip.get_fragment_offset() != 0 {
        return None;
    }
    decode_tcp(
        IpAddr::V4(ip.get_source()),
        IpAddr::V4(ip.get_destination()),
        ip.payload(),
        timestamp,
    )
}

fn decode_ipv6(data: &[u8], timestamp: DateTime<Utc>) -> Option<TcpSegment> {
    let ip = Ipv6Packet::new(data)?;
    // Extension headers are not walked.
    if ip.get_version() != 6 || ip.get_next_header() != IpNextHeaderProtocols::Tcp {
        return None;
    }
    decode_tcp(
        IpAddr::V6(ip.get_source()),
        IpAddr::V6(ip.get_destination()),
        ip.payload(),
        timestamp,
    )
}

fn decode_tcp(src: IpAddr, dst: IpAddr, data: &[u8], timestamp: DateTime<Utc>) -> Option<TcpSegment> {
    let tcp = TcpPacket::new(data)?;
    let header_len = usize::from(tcp.get_data_offset()) * 4;
    if header_len < 20 || header_len > data.len() {
        return None;
    }
    let flags = tcp.get_flags();
    Some(TcpSegment {
        flow: FlowId::new(
            SocketAddr::new(src, tcp.get_source()),
            SocketAddr::new(dst, tcp.get_destination()),
        ),
        seq: tcp.get_sequence(),
        syn: flags & TcpFlags::SYN != 0,
        fin: flags & TcpFlags::FIN != 0,
        rst: flags & TcpFlags::RST != 0,
        payload: data[header_len..].to_vec(),
        timestamp,
    })
}
