use crate::protocol::tcp::TcpHeader;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

impl TcpFlags {
    pub fn from_header(header: &TcpHeader<'_>) -> Self {
        TcpFlags {
            syn: header.syn(),
            ack: header.ack(),
            fin: header.fin(),
            rst: header.rst(),
        }
    }
}

/// One observed TCP segment with an owned copy of its payload.
#[derive(Debug, Clone)]
pub struct Segment {
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub payload: Vec<u8>,
    /// Capture timestamp, seconds since epoch.
    pub ts: f64,
}

impl Segment {
    pub fn from_header(header: &TcpHeader<'_>, ts: f64) -> Self {
        Segment {
            seq: header.sequence_number(),
            ack: header.ack_number(),
            flags: TcpFlags::from_header(header),
            payload: header.payload().to_vec(),
            ts,
        }
    }

    /// Sequence number just past the payload.
    #[inline]
    pub fn end(&self) -> u32 {
        self.seq.wrapping_add(self.payload.len() as u32)
    }
}

const HTTP_METHODS: &[&[u8]] = &[
    b"GET", b"POST", b"PUT", b"DELETE", b"HEAD", b"TRACE", b"OPTIONS", b"PATCH",
];

/// Whether a payload starts like an HTTP/1 request line: a known method
/// followed by a space within the first eight bytes.
pub fn is_http_request_start(payload: &[u8]) -> bool {
    if payload.len() < 8 {
        return false;
    }
    let head = &payload[..8];
    match head.iter().position(|&b| b == b' ') {
        Some(idx) => HTTP_METHODS.iter().any(|method| *method == &head[..idx]),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tcp::flags;
    use crate::protocol::test_frames::{ipv4_tcp, TcpFrame};

    #[test]
    fn recognizes_request_lines() {
        assert!(is_http_request_start(b"GET / HTTP/1.1\r\n"));
        assert!(is_http_request_start(b"OPTIONS * HTTP/1.1\r\n"));
        assert!(is_http_request_start(b"PATCH /a HTTP/1.1\r\n"));
        assert!(!is_http_request_start(b"HTTP/1.1 200 OK\r\n"));
        assert!(!is_http_request_start(b"GET /"));
        assert!(!is_http_request_start(b"CONNECTX / HTTP/1.1"));
        assert!(!is_http_request_start(b"\x16\x03\x01\x02\x00\x01\x00\x01"));
    }

    #[test]
    fn segment_from_parsed_header() {
        let pkt = ipv4_tcp(&TcpFrame {
            seq: u32::MAX - 1,
            ack: 77,
            flags: flags::ACK | flags::PSH | flags::FIN,
            payload: b"abcd",
            ..TcpFrame::default()
        });
        let header = TcpHeader::parse(&pkt[20..]).unwrap();
        let segment = Segment::from_header(&header, 1.5);
        assert_eq!(segment.payload, b"abcd");
        assert_eq!(segment.ack, 77);
        assert!(segment.flags.ack && segment.flags.fin);
        assert!(!segment.flags.syn);
        assert_eq!(segment.end(), 2);
    }
}
