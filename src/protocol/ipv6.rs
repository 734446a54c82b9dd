//! Zero-copy IPv6 header parser.
//!
//! IPv6 fixed header layout (40 bytes):
//!   0                   1                   2                   3
//!   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |Version| Traffic Class |           Flow Label                  |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |         Payload Length        |  Next Header  |   Hop Limit   |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                 Source Address (128 bits)                     |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |              Destination Address (128 bits)                   |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!
//! Extension headers are not walked: a packet whose next header is not TCP is
//! simply not decoded further.

use super::{IpProtocol, ParseError};
use std::fmt;
use std::net::Ipv6Addr;

pub const IPV6_HEADER_LEN: usize = 40;

#[derive(Debug)]
pub struct Ipv6Header<'a> {
    data: &'a [u8],
}

impl<'a> Ipv6Header<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, ParseError> {
        if data.len() < IPV6_HEADER_LEN {
            return Err(ParseError::TooShort {
                expected: IPV6_HEADER_LEN,
                actual: data.len(),
            });
        }

        let version = data[0] >> 4;
        if version != 6 {
            return Err(ParseError::InvalidHeader(format!(
                "expected IPv6 (version 6), got version {}",
                version
            )));
        }

        Ok(Ipv6Header { data })
    }

    /// Payload length (not including the 40-byte fixed header).
    #[inline]
    pub fn payload_length(&self) -> u16 {
        u16::from_be_bytes([self.data[4], self.data[5]])
    }

    #[inline]
    pub fn next_header(&self) -> IpProtocol {
        IpProtocol::from(self.data[6])
    }

    #[inline]
    pub fn src_addr(&self) -> Ipv6Addr {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&self.data[8..24]);
        Ipv6Addr::from(octets)
    }

    #[inline]
    pub fn dst_addr(&self) -> Ipv6Addr {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&self.data[24..40]);
        Ipv6Addr::from(octets)
    }

    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let available = self.data.len() - IPV6_HEADER_LEN;
        let end = IPV6_HEADER_LEN + (self.payload_length() as usize).min(available);
        &self.data[IPV6_HEADER_LEN..end]
    }
}

impl<'a> fmt::Display for Ipv6Header<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} next_hdr={} len={}",
            self.src_addr(),
            self.dst_addr(),
            self.next_header(),
            self.payload_length()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_ipv6() {
        let mut pkt = vec![0u8; 40];
        pkt[0] = 0x60;
        pkt[5] = 0x14; // payload length = 20
        pkt[6] = 6;
        pkt[7] = 64;
        pkt[23] = 1;
        pkt[39] = 2;
        pkt.extend_from_slice(&[0u8; 24]); // 4 bytes of trailer beyond payload length

        let hdr = Ipv6Header::parse(&pkt).unwrap();
        assert_eq!(hdr.next_header(), IpProtocol::Tcp);
        assert_eq!(hdr.src_addr(), Ipv6Addr::LOCALHOST);
        assert_eq!(hdr.dst_addr(), Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 2));
        assert_eq!(hdr.payload().len(), 20);
    }

    #[test]
    fn reject_too_short_ipv6() {
        assert!(Ipv6Header::parse(&[0x60; 39]).is_err());
    }
}
