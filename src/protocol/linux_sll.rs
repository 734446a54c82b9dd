//! Linux cooked capture (LINKTYPE_LINUX_SLL = 113).
//!
//! Produced by libpcap on the Linux `any` pseudo-device. Layout (16 bytes):
//!   - Packet type:        2 bytes
//!   - ARPHRD type:        2 bytes
//!   - Link address len:   2 bytes
//!   - Link address:       8 bytes (zero padded)
//!   - Protocol type:      2 bytes (an EtherType)

use super::{EtherType, ParseError};

pub const LINUX_SLL_HEADER_LEN: usize = 16;

#[derive(Debug)]
pub struct LinuxSllHeader<'a> {
    data: &'a [u8],
}

impl<'a> LinuxSllHeader<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, ParseError> {
        if data.len() < LINUX_SLL_HEADER_LEN {
            return Err(ParseError::TooShort {
                expected: LINUX_SLL_HEADER_LEN,
                actual: data.len(),
            });
        }
        Ok(LinuxSllHeader { data })
    }

    /// 0 = to us, 1 = broadcast, 2 = multicast, 3 = to someone else, 4 = outgoing.
    #[inline]
    pub fn packet_type(&self) -> u16 {
        u16::from_be_bytes([self.data[0], self.data[1]])
    }

    #[inline]
    pub fn protocol(&self) -> EtherType {
        EtherType::from(u16::from_be_bytes([self.data[14], self.data[15]]))
    }

    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.data[LINUX_SLL_HEADER_LEN..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_outgoing_ipv4() {
        let mut pkt = vec![0u8; 16];
        pkt[1] = 4; // outgoing
        pkt[3] = 1; // ARPHRD_ETHER
        pkt[5] = 6;
        pkt[14] = 0x08;
        pkt[15] = 0x00;
        pkt.extend_from_slice(&[0x45, 0, 0, 20]);
        let sll = LinuxSllHeader::parse(&pkt).unwrap();
        assert_eq!(sll.packet_type(), 4);
        assert_eq!(sll.protocol(), EtherType::Ipv4);
        assert_eq!(sll.payload(), &[0x45, 0, 0, 20]);
    }

    #[test]
    fn reject_short_header() {
        assert!(LinuxSllHeader::parse(&[0u8; 15]).is_err());
    }
}
