//! HTTP/1 on top of reassembled streams.
//!
//! `message` tokenizes heads and frames bodies, `filter` decides which
//! exchanges are shown, `render` turns an exchange into transcript text and
//! `handler` pairs requests with responses for each connection.

pub mod filter;
pub mod handler;
pub mod message;
pub mod render;

pub use filter::{ExchangeFilter, StatusSet};
pub use handler::HttpConnectionHandler;
pub use render::{Level, RenderOptions};

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum HttpError {
    Io(io::Error),
    /// The stream ended inside a message.
    UnexpectedEof,
    Malformed(String),
    HeadTooLarge(usize),
}

impl HttpError {
    /// Whether the error only means the stream ended early.
    pub fn is_eof(&self) -> bool {
        match self {
            HttpError::UnexpectedEof => true,
            HttpError::Io(err) => err.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::Io(err) => write!(f, "io error: {}", err),
            HttpError::UnexpectedEof => write!(f, "unexpected end of stream"),
            HttpError::Malformed(msg) => write!(f, "malformed message: {}", msg),
            HttpError::HeadTooLarge(limit) => {
                write!(f, "message head exceeds {} bytes", limit)
            }
        }
    }
}

impl std::error::Error for HttpError {}

impl From<io::Error> for HttpError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            HttpError::UnexpectedEof
        } else {
            HttpError::Io(err)
        }
    }
}

impl From<httparse::Error> for HttpError {
    fn from(err: httparse::Error) -> Self {
        HttpError::Malformed(err.to_string())
    }
}
