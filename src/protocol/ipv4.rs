//! Zero-copy IPv4 header parser.
//!
//! IPv4 header layout (20-60 bytes):
//!   0                   1                   2                   3
//!   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |Version|  IHL  |Type of Service|          Total Length         |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |         Identification        |Flags|      Fragment Offset    |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |  Time to Live |    Protocol   |         Header Checksum       |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                       Source Address                          |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                    Destination Address                        |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+

use super::{IpProtocol, ParseError};
use std::fmt;
use std::net::Ipv4Addr;

/// Minimum IPv4 header length (no options)
pub const IPV4_MIN_HEADER_LEN: usize = 20;

#[derive(Debug)]
pub struct Ipv4Header<'a> {
    data: &'a [u8],
    header_len: usize,
}

impl<'a> Ipv4Header<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, ParseError> {
        if data.len() < IPV4_MIN_HEADER_LEN {
            return Err(ParseError::TooShort {
                expected: IPV4_MIN_HEADER_LEN,
                actual: data.len(),
            });
        }

        let version = data[0] >> 4;
        if version != 4 {
            return Err(ParseError::InvalidHeader(format!(
                "expected IPv4 (version 4), got version {}",
                version
            )));
        }

        let header_len = (data[0] & 0x0F) as usize * 4;
        if header_len < IPV4_MIN_HEADER_LEN {
            return Err(ParseError::InvalidHeader(format!(
                "IHL too small: {} (min 5)",
                header_len / 4
            )));
        }
        if data.len() < header_len {
            return Err(ParseError::TooShort {
                expected: header_len,
                actual: data.len(),
            });
        }

        Ok(Ipv4Header { data, header_len })
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Total length of the IP packet (header + payload) in bytes.
    #[inline]
    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.data[2], self.data[3]])
    }

    /// Fragment offset in 8-byte units.
    #[inline]
    pub fn fragment_offset(&self) -> u16 {
        u16::from_be_bytes([self.data[6] & 0x1F, self.data[7]])
    }

    #[inline]
    pub fn protocol(&self) -> IpProtocol {
        IpProtocol::from(self.data[9])
    }

    #[inline]
    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.data[12], self.data[13], self.data[14], self.data[15])
    }

    #[inline]
    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.data[16], self.data[17], self.data[18], self.data[19])
    }

    /// Payload after the IPv4 header.
    /// Clamped to `total_length - header_len` so Ethernet padding is dropped.
    /// A zero total length (TSO offload on the capturing host) means "to the end".
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let available = self.data.len() - self.header_len;
        let total = self.total_length() as usize;
        let payload_len = if total == 0 {
            available
        } else {
            total.saturating_sub(self.header_len).min(available)
        };
        &self.data[self.header_len..self.header_len + payload_len]
    }
}

impl<'a> fmt::Display for Ipv4Header<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} proto={} len={}",
            self.src_addr(),
            self.dst_addr(),
            self.protocol(),
            self.total_length()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ipv4_header(total_len: u16, captured: usize) -> Vec<u8> {
        let mut pkt = vec![0u8; captured];
        pkt[0] = 0x45;
        pkt[2..4].copy_from_slice(&total_len.to_be_bytes());
        pkt[6] = 0x40;
        pkt[8] = 64;
        pkt[9] = 6;
        pkt[12..16].copy_from_slice(&[192, 168, 1, 100]);
        pkt[16..20].copy_from_slice(&[10, 0, 0, 1]);
        pkt
    }

    #[test]
    fn parse_valid_ipv4() {
        let pkt = make_ipv4_header(40, 40);
        let hdr = Ipv4Header::parse(&pkt).unwrap();
        assert_eq!(hdr.header_len(), 20);
        assert_eq!(hdr.protocol(), IpProtocol::Tcp);
        assert_eq!(hdr.src_addr(), Ipv4Addr::new(192, 168, 1, 100));
        assert_eq!(hdr.dst_addr(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(hdr.fragment_offset(), 0);
        assert_eq!(hdr.payload().len(), 20);
    }

    #[test]
    fn payload_excludes_link_padding() {
        let pkt = make_ipv4_header(40, 46);
        let hdr = Ipv4Header::parse(&pkt).unwrap();
        assert_eq!(hdr.payload().len(), 20);
    }

    #[test]
    fn zero_total_length_takes_everything() {
        let pkt = make_ipv4_header(0, 64);
        let hdr = Ipv4Header::parse(&pkt).unwrap();
        assert_eq!(hdr.payload().len(), 44);
    }

    #[test]
    fn reject_too_short_packet() {
        assert!(Ipv4Header::parse(&[0u8; 19]).is_err());
    }

    #[test]
    fn reject_wrong_version() {
        let mut pkt = [0u8; 20];
        pkt[0] = 0x65;
        assert!(Ipv4Header::parse(&pkt).is_err());
    }
}
