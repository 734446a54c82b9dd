//! Zero-copy decoding of captured frames down to the TCP layer.
//!
//! Only what the reassembler needs is decoded: the link header (to find the
//! network layer), IPv4/IPv6 addresses, and the TCP header + payload.

pub mod ethernet;
pub mod ipv4;
pub mod ipv6;
pub mod linux_sll;
pub mod tcp;

use std::fmt;
use std::net::IpAddr;

/// EtherType of the layer after the link header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    Ipv4,
    Ipv6,
    VlanTagged,
    Unknown(u16),
}

impl From<u16> for EtherType {
    fn from(value: u16) -> Self {
        match value {
            0x0800 => EtherType::Ipv4,
            0x86DD => EtherType::Ipv6,
            0x8100 => EtherType::VlanTagged,
            other => EtherType::Unknown(other),
        }
    }
}

/// IP protocol number; only TCP is decoded further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    Tcp,
    Other(u8),
}

impl From<u8> for IpProtocol {
    fn from(value: u8) -> Self {
        match value {
            6 => IpProtocol::Tcp,
            other => IpProtocol::Other(other),
        }
    }
}

/// Link-layer framing of a capture source, from the pcap data link type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    /// Linux cooked capture (the Linux `any` pseudo-device).
    LinuxSll,
    /// Bare IPv4/IPv6 packets with no link header.
    Raw,
    /// BSD loopback: 4-byte address family in host byte order.
    Null,
    Unsupported(i32),
}

impl LinkType {
    pub fn from_dlt(dlt: i32) -> Self {
        match dlt {
            1 => LinkType::Ethernet,
            113 => LinkType::LinuxSll,
            12 | 14 | 101 => LinkType::Raw,
            0 | 108 => LinkType::Null,
            other => LinkType::Unsupported(other),
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkType::Ethernet => write!(f, "EN10MB"),
            LinkType::LinuxSll => write!(f, "LINUX_SLL"),
            LinkType::Raw => write!(f, "RAW"),
            LinkType::Null => write!(f, "NULL"),
            LinkType::Unsupported(v) => write!(f, "DLT({})", v),
        }
    }
}

/// Errors from protocol parsing
#[derive(Debug)]
pub enum ParseError {
    /// Not enough bytes to parse the header
    TooShort { expected: usize, actual: usize },
    /// Invalid header values
    InvalidHeader(String),
    /// The capture's link type is not decoded by this tool
    UnsupportedLink(LinkType),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::TooShort { expected, actual } => {
                write!(f, "packet too short: need {} bytes, got {}", expected, actual)
            }
            ParseError::InvalidHeader(msg) => write!(f, "invalid header: {}", msg),
            ParseError::UnsupportedLink(link) => write!(f, "unsupported link type {}", link),
        }
    }
}

impl std::error::Error for ParseError {}

/// A decoded packet, referencing the original byte slice.
///
/// `network`/`tcp` are `None` for traffic the reassembler does not care about
/// (ARP, UDP, IPv4 fragments past the first, ...).
#[derive(Debug)]
pub struct ParsedPacket<'a> {
    pub vlan: Option<VlanTag>,
    pub network: Option<NetworkHeader<'a>>,
    pub tcp: Option<tcp::TcpHeader<'a>>,
}

impl<'a> ParsedPacket<'a> {
    /// TCP payload, or an empty slice when the packet carries no TCP segment.
    pub fn payload(&self) -> &'a [u8] {
        match &self.tcp {
            Some(hdr) => hdr.payload(),
            None => &[],
        }
    }
}

/// VLAN tag (802.1Q)
#[derive(Debug, Clone, Copy)]
pub struct VlanTag {
    pub priority: u8,
    pub dei: bool,
    pub vlan_id: u16,
}

/// Network layer header
#[derive(Debug)]
pub enum NetworkHeader<'a> {
    Ipv4(ipv4::Ipv4Header<'a>),
    Ipv6(ipv6::Ipv6Header<'a>),
}

impl<'a> NetworkHeader<'a> {
    pub fn src_ip(&self) -> IpAddr {
        match self {
            NetworkHeader::Ipv4(h) => IpAddr::V4(h.src_addr()),
            NetworkHeader::Ipv6(h) => IpAddr::V6(h.src_addr()),
        }
    }

    pub fn dst_ip(&self) -> IpAddr {
        match self {
            NetworkHeader::Ipv4(h) => IpAddr::V4(h.dst_addr()),
            NetworkHeader::Ipv6(h) => IpAddr::V6(h.dst_addr()),
        }
    }

    pub fn protocol(&self) -> IpProtocol {
        match self {
            NetworkHeader::Ipv4(h) => h.protocol(),
            NetworkHeader::Ipv6(h) => h.next_header(),
        }
    }

    fn payload(&self) -> &'a [u8] {
        match self {
            NetworkHeader::Ipv4(h) => h.payload(),
            NetworkHeader::Ipv6(h) => h.payload(),
        }
    }

    /// Non-first IPv4 fragments carry no TCP header.
    fn is_trailing_fragment(&self) -> bool {
        match self {
            NetworkHeader::Ipv4(h) => h.fragment_offset() != 0,
            NetworkHeader::Ipv6(_) => false,
        }
    }
}

/// Parse a captured frame of the given link type down to the TCP layer.
pub fn parse_packet(data: &[u8], link: LinkType) -> Result<ParsedPacket<'_>, ParseError> {
    // Layer 2
    let (ether_type, mut remaining) = match link {
        LinkType::Ethernet => {
            let eth = ethernet::EthernetHeader::parse(data)?;
            (eth.ether_type(), eth.payload())
        }
        LinkType::LinuxSll => {
            let sll = linux_sll::LinuxSllHeader::parse(data)?;
            (sll.protocol(), sll.payload())
        }
        LinkType::Raw => (raw_ether_type(data), data),
        LinkType::Null => {
            if data.len() < 4 {
                return Err(ParseError::TooShort {
                    expected: 4,
                    actual: data.len(),
                });
            }
            let family = u32::from_ne_bytes([data[0], data[1], data[2], data[3]]);
            let ether_type = match family {
                2 => EtherType::Ipv4,
                24 | 28 | 30 => EtherType::Ipv6,
                other => EtherType::Unknown(other as u16),
            };
            (ether_type, &data[4..])
        }
        LinkType::Unsupported(_) => return Err(ParseError::UnsupportedLink(link)),
    };

    // Handle VLAN tagging (802.1Q)
    let mut ether_type = ether_type;
    let mut vlan = None;
    if ether_type == EtherType::VlanTagged {
        if remaining.len() < 4 {
            return Err(ParseError::TooShort {
                expected: 4,
                actual: remaining.len(),
            });
        }
        let tci = u16::from_be_bytes([remaining[0], remaining[1]]);
        vlan = Some(VlanTag {
            priority: (tci >> 13) as u8,
            dei: (tci >> 12) & 1 == 1,
            vlan_id: tci & 0x0FFF,
        });
        ether_type = EtherType::from(u16::from_be_bytes([remaining[2], remaining[3]]));
        remaining = &remaining[4..];
    }

    // Layer 3
    let network = match ether_type {
        EtherType::Ipv4 => NetworkHeader::Ipv4(ipv4::Ipv4Header::parse(remaining)?),
        EtherType::Ipv6 => NetworkHeader::Ipv6(ipv6::Ipv6Header::parse(remaining)?),
        _ => {
            return Ok(ParsedPacket {
                vlan,
                network: None,
                tcp: None,
            })
        }
    };

    // Layer 4
    let tcp = if network.protocol() == IpProtocol::Tcp && !network.is_trailing_fragment() {
        Some(tcp::TcpHeader::parse(network.payload())?)
    } else {
        None
    };

    Ok(ParsedPacket {
        vlan,
        network: Some(network),
        tcp,
    })
}

/// Raw captures carry no EtherType; the IP version nibble decides.
fn raw_ether_type(data: &[u8]) -> EtherType {
    match data.first().map(|b| b >> 4) {
        Some(4) => EtherType::Ipv4,
        Some(6) => EtherType::Ipv6,
        _ => EtherType::Unknown(0),
    }
}

#[cfg(test)]
pub(crate) mod test_frames {
    //! Frame builders shared by parser and assembler tests.

    use super::tcp::flags;

    pub struct TcpFrame<'a> {
        pub src_ip: [u8; 4],
        pub dst_ip: [u8; 4],
        pub src_port: u16,
        pub dst_port: u16,
        pub seq: u32,
        pub ack: u32,
        pub flags: u8,
        pub payload: &'a [u8],
    }

    impl<'a> Default for TcpFrame<'a> {
        fn default() -> Self {
            TcpFrame {
                src_ip: [10, 0, 0, 1],
                dst_ip: [10, 0, 0, 2],
                src_port: 49152,
                dst_port: 80,
                seq: 1000,
                ack: 0,
                flags: flags::ACK,
                payload: &[],
            }
        }
    }

    /// IPv4 + TCP, no link header.
    pub fn ipv4_tcp(frame: &TcpFrame<'_>) -> Vec<u8> {
        let total_len = 20 + 20 + frame.payload.len();
        let mut pkt = vec![0u8; 40];
        pkt[0] = 0x45;
        pkt[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
        pkt[6] = 0x40; // DF
        pkt[8] = 64;
        pkt[9] = 6;
        pkt[12..16].copy_from_slice(&frame.src_ip);
        pkt[16..20].copy_from_slice(&frame.dst_ip);
        let tcp = &mut pkt[20..40];
        tcp[0..2].copy_from_slice(&frame.src_port.to_be_bytes());
        tcp[2..4].copy_from_slice(&frame.dst_port.to_be_bytes());
        tcp[4..8].copy_from_slice(&frame.seq.to_be_bytes());
        tcp[8..12].copy_from_slice(&frame.ack.to_be_bytes());
        tcp[12] = 0x50;
        tcp[13] = frame.flags;
        tcp[14..16].copy_from_slice(&65535u16.to_be_bytes());
        pkt.extend_from_slice(frame.payload);
        pkt
    }

    /// Ethernet + IPv4 + TCP, padded to the 60-byte Ethernet minimum.
    pub fn ethernet_tcp(frame: &TcpFrame<'_>) -> Vec<u8> {
        let mut pkt = vec![0u8; 14];
        pkt[0..6].copy_from_slice(&[0xff; 6]);
        pkt[6..12].copy_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        pkt[12] = 0x08;
        pkt[13] = 0x00;
        pkt.extend_from_slice(&ipv4_tcp(frame));
        if pkt.len() < 60 {
            pkt.resize(60, 0);
        }
        pkt
    }
}
