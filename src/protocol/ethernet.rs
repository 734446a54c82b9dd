//! Zero-copy Ethernet frame parser.
//!
//! An Ethernet frame has the following layout:
//!   - Destination MAC: 6 bytes
//!   - Source MAC:      6 bytes
//!   - EtherType:       2 bytes
//!   - Payload:         variable (46-1500 bytes typically)
//!
//! Total header size: 14 bytes (excluding optional VLAN tags, handled by caller)

use super::{EtherType, ParseError};

/// Ethernet header length (no VLAN tags)
pub const ETH_HEADER_LEN: usize = 14;

/// Zero-copy Ethernet header that borrows from the packet buffer.
#[derive(Debug)]
pub struct EthernetHeader<'a> {
    data: &'a [u8],
}

impl<'a> EthernetHeader<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, ParseError> {
        if data.len() < ETH_HEADER_LEN {
            return Err(ParseError::TooShort {
                expected: ETH_HEADER_LEN,
                actual: data.len(),
            });
        }
        Ok(EthernetHeader { data })
    }

    #[inline]
    pub fn ether_type(&self) -> EtherType {
        EtherType::from(u16::from_be_bytes([self.data[12], self.data[13]]))
    }

    /// The payload after the Ethernet header. May include trailing padding;
    /// the IP layer clamps to its own length field.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.data[ETH_HEADER_LEN..]
    }
}
