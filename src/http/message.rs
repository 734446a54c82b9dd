//! HTTP/1 message tokenizer over a buffered byte stream.
//!
//! Heads are collected line by line up to the empty line and parsed with
//! `httparse`. Bodies are not read here: the caller gets a [`BodyKind`] and
//! wraps the same reader in a [`BodyReader`], so the stream position after
//! the body is exactly the start of the next message.

use super::HttpError;
use std::io::{self, BufRead, Read};

/// Largest accepted request/status line plus headers.
pub const MAX_HEAD_LEN: usize = 64 * 1024;
const MAX_HEADERS: usize = 128;
const MAX_CHUNK_LINE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct Headers(Vec<Header>);

impl Headers {
    fn from_parsed(parsed: &[httparse::Header<'_>]) -> Self {
        Headers(
            parsed
                .iter()
                .map(|h| Header {
                    name: h.name.to_string(),
                    value: String::from_utf8_lossy(h.value).into_owned(),
                })
                .collect(),
        )
    }

    /// First value of a header, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Whether any comma-separated value of `name` equals `token`, ignoring case.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.0
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case(name))
            .flat_map(|h| h.value.split(','))
            .any(|v| v.trim().eq_ignore_ascii_case(token))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// How the body following a head is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Empty,
    Length(u64),
    Chunked,
    /// Everything until the stream ends.
    UntilClose,
}

impl BodyKind {
    pub fn is_empty(&self) -> bool {
        matches!(self, BodyKind::Empty | BodyKind::Length(0))
    }
}

#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: String,
    pub uri: String,
    /// Minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    pub version: u8,
    pub headers: Headers,
    pub body: BodyKind,
}

impl RequestHead {
    pub fn request_line(&self) -> String {
        format!("{} {} HTTP/1.{}", self.method, self.uri, self.version)
    }

    /// Host from the Host header, falling back to an absolute-form URI.
    pub fn host(&self) -> Option<&str> {
        if let Some(host) = self.headers.get("Host") {
            return Some(host.trim());
        }
        let rest = self
            .uri
            .strip_prefix("http://")
            .or_else(|| self.uri.strip_prefix("https://"))?;
        Some(rest.split('/').next().unwrap_or(rest))
    }

    pub fn expects_continue(&self) -> bool {
        self.headers
            .get("Expect")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("100-continue"))
    }

    /// Full URL for display.
    pub fn url(&self) -> String {
        if self.uri.starts_with("http://") || self.uri.starts_with("https://") {
            return self.uri.clone();
        }
        format!("http://{}{}", self.host().unwrap_or(""), self.uri)
    }
}

#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version: u8,
    pub code: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: BodyKind,
}

impl ResponseHead {
    pub fn status_line(&self) -> String {
        if self.reason.is_empty() {
            format!("HTTP/1.{} {}", self.version, self.code)
        } else {
            format!("HTTP/1.{} {} {}", self.version, self.code, self.reason)
        }
    }

    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.code)
    }

    pub fn is_websocket_upgrade(&self) -> bool {
        self.code == 101 && self.headers.has_token("Upgrade", "websocket")
    }
}

/// Read the next request head. `Ok(None)` means the stream ended cleanly
/// before any byte of a new message.
pub fn read_request<R: BufRead>(reader: &mut R) -> Result<Option<RequestHead>, HttpError> {
    let Some(raw) = read_head(reader)? else {
        return Ok(None);
    };
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    match req.parse(&raw)? {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => {
            return Err(HttpError::Malformed("incomplete request head".into()))
        }
    }

    let method = req.method.unwrap_or_default().to_string();
    let uri = req.path.unwrap_or_default().to_string();
    let version = req.version.unwrap_or(1);
    let headers = Headers::from_parsed(req.headers);
    let body = request_body_kind(&headers)?;
    Ok(Some(RequestHead {
        method,
        uri,
        version,
        headers,
        body,
    }))
}

/// Read the next response head. `method` is the request method this
/// response answers; a HEAD response never has a body.
pub fn read_response<R: BufRead>(
    reader: &mut R,
    method: &str,
) -> Result<Option<ResponseHead>, HttpError> {
    let Some(raw) = read_head(reader)? else {
        return Ok(None);
    };
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut res = httparse::Response::new(&mut headers);
    match res.parse(&raw)? {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => {
            return Err(HttpError::Malformed("incomplete response head".into()))
        }
    }

    let code = res.code.unwrap_or_default();
    let reason = res.reason.unwrap_or_default().to_string();
    let version = res.version.unwrap_or(1);
    let headers = Headers::from_parsed(res.headers);
    let body = response_body_kind(&headers, code, method)?;
    Ok(Some(ResponseHead {
        version,
        code,
        reason,
        headers,
        body,
    }))
}

/// Collect bytes up to and including the blank line ending a head.
/// Leading empty lines between messages are skipped.
fn read_head<R: BufRead>(reader: &mut R) -> Result<Option<Vec<u8>>, HttpError> {
    let mut head = Vec::new();
    loop {
        let before = head.len();
        if before >= MAX_HEAD_LEN {
            return Err(HttpError::HeadTooLarge(MAX_HEAD_LEN));
        }
        let n = read_line_limited(reader, &mut head, MAX_HEAD_LEN.saturating_sub(before))?;
        if n == 0 {
            return if head.is_empty() {
                Ok(None)
            } else {
                Err(HttpError::UnexpectedEof)
            };
        }
        if !head.ends_with(b"\n") && head.len() >= MAX_HEAD_LEN {
            return Err(HttpError::HeadTooLarge(MAX_HEAD_LEN));
        }
        let line = &head[before..];
        if line == b"\r\n" || line == b"\n" {
            if before == 0 {
                head.clear();
                continue;
            }
            return Ok(Some(head));
        }
    }
}

/// `read_until(b'\n')` that stops after `limit` bytes.
fn read_line_limited<R: BufRead>(
    reader: &mut R,
    out: &mut Vec<u8>,
    limit: usize,
) -> io::Result<usize> {
    let mut taken = reader.by_ref().take(limit as u64);
    taken.read_until(b'\n', out)
}

fn content_length(headers: &Headers) -> Result<Option<u64>, HttpError> {
    match headers.get("Content-Length") {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| HttpError::Malformed(format!("bad content-length {:?}", value))),
    }
}

fn is_chunked(headers: &Headers) -> bool {
    headers
        .get("Transfer-Encoding")
        .and_then(|v| v.split(',').last())
        .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"))
}

fn request_body_kind(headers: &Headers) -> Result<BodyKind, HttpError> {
    if is_chunked(headers) {
        return Ok(BodyKind::Chunked);
    }
    Ok(match content_length(headers)? {
        Some(0) | None => BodyKind::Empty,
        Some(len) => BodyKind::Length(len),
    })
}

fn response_body_kind(headers: &Headers, code: u16, method: &str) -> Result<BodyKind, HttpError> {
    if method.eq_ignore_ascii_case("HEAD") || (100..200).contains(&code) || code == 204 || code == 304
    {
        return Ok(BodyKind::Empty);
    }
    if is_chunked(headers) {
        return Ok(BodyKind::Chunked);
    }
    Ok(match content_length(headers)? {
        Some(0) => BodyKind::Empty,
        Some(len) => BodyKind::Length(len),
        None => BodyKind::UntilClose,
    })
}

#[derive(Debug, Clone, Copy)]
enum BodyState {
    Remaining(u64),
    ChunkSize,
    ChunkData(u64),
    ChunkEnd,
    UntilClose,
    Done,
}

/// Reads exactly one message body from the shared stream, removing chunked
/// framing. Hitting end-of-stream inside a delimited body is an
/// `UnexpectedEof` I/O error.
pub struct BodyReader<'a, R: BufRead> {
    inner: &'a mut R,
    state: BodyState,
}

impl<'a, R: BufRead> BodyReader<'a, R> {
    pub fn new(inner: &'a mut R, kind: BodyKind) -> Self {
        let state = match kind {
            BodyKind::Empty => BodyState::Done,
            BodyKind::Length(len) => BodyState::Remaining(len),
            BodyKind::Chunked => BodyState::ChunkSize,
            BodyKind::UntilClose => BodyState::UntilClose,
        };
        BodyReader { inner, state }
    }

    /// Read and discard the rest of the body. Returns the byte count.
    pub fn drain(&mut self) -> io::Result<u64> {
        io::copy(self, &mut io::sink())
    }

    fn read_chunk_line(&mut self) -> io::Result<Vec<u8>> {
        let mut line = Vec::new();
        let n = read_line_limited(&mut *self.inner, &mut line, MAX_CHUNK_LINE)?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(line)
    }

    fn read_trailers(&mut self) -> io::Result<()> {
        loop {
            let mut line = Vec::new();
            let n = read_line_limited(&mut *self.inner, &mut line, MAX_CHUNK_LINE)?;
            if n == 0 || line == b"\r\n" || line == b"\n" {
                return Ok(());
            }
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> io::Result<u64> {
    let text = String::from_utf8_lossy(line);
    let size = text.split(';').next().unwrap_or("").trim();
    u64::from_str_radix(size, 16).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad chunk size {:?}", size),
        )
    })
}

impl<'a, R: BufRead> Read for BodyReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.state {
                BodyState::Done => return Ok(0),
                BodyState::UntilClose => {
                    let n = self.inner.read(buf)?;
                    if n == 0 {
                        self.state = BodyState::Done;
                    }
                    return Ok(n);
                }
                BodyState::Remaining(0) => self.state = BodyState::Done,
                BodyState::Remaining(left) => {
                    let want = buf.len().min(left.min(usize::MAX as u64) as usize);
                    let n = self.inner.read(&mut buf[..want])?;
                    if n == 0 {
                        return Err(io::ErrorKind::UnexpectedEof.into());
                    }
                    self.state = BodyState::Remaining(left - n as u64);
                    return Ok(n);
                }
                BodyState::ChunkSize => {
                    let line = self.read_chunk_line()?;
                    match parse_chunk_size(&line)? {
                        0 => {
                            self.read_trailers()?;
                            self.state = BodyState::Done;
                        }
                        size => self.state = BodyState::ChunkData(size),
                    }
                }
                BodyState::ChunkData(left) => {
                    let want = buf.len().min(left.min(usize::MAX as u64) as usize);
                    let n = self.inner.read(&mut buf[..want])?;
                    if n == 0 {
                        return Err(io::ErrorKind::UnexpectedEof.into());
                    }
                    let left = left - n as u64;
                    self.state = if left == 0 {
                        BodyState::ChunkEnd
                    } else {
                        BodyState::ChunkData(left)
                    };
                    return Ok(n);
                }
                BodyState::ChunkEnd => {
                    self.read_chunk_line()?;
                    self.state = BodyState::ChunkSize;
                }
            }
        }
    }
}
