//! Packet capture using libpcap.
//!
//! `engine` opens live devices and capture files with the BPF filter
//! applied; `source` runs one thread per opened handle and merges their
//! packets into a single channel.

pub mod engine;
pub mod source;

pub use engine::{build_filter, CaptureConfig, CaptureError};
pub use source::{CaptureHandle, CapturedPacket};
