//! Transcript rendering.
//!
//! A [`Transcript`] collects the text of one exchange: an endpoint banner,
//! the request, any interim responses and the final response. What is shown
//! depends on [`Level`]; bodies at [`Level::All`] go through content decoding
//! (gzip/deflate), charset decoding and optional JSON pretty-printing. Decode
//! failures are written inline and never abort the exchange.

use super::message::{Headers, RequestHead, ResponseHead};
use crate::flow::Endpoint;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read};

/// How much of each exchange is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// One line per exchange: method and URL.
    Url,
    /// Request and response heads, with body sizes.
    #[default]
    Header,
    /// Heads and decoded bodies.
    All,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Url => write!(f, "url"),
            Level::Header => write!(f, "header"),
            Level::All => write!(f, "all"),
        }
    }
}

/// Body bytes kept for rendering; the rest is read and discarded.
pub const DEFAULT_MAX_BODY: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub level: Level,
    /// Also render each request as a curl command.
    pub curl: bool,
    /// Pretty-print JSON bodies.
    pub pretty: bool,
    /// Print bodies of unrecognized, non-binary content types.
    pub force: bool,
    /// Largest body kept in memory for rendering.
    pub max_body: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            level: Level::Header,
            curl: false,
            pretty: false,
            force: false,
            max_body: DEFAULT_MAX_BODY,
        }
    }
}

pub struct Transcript<'a> {
    options: &'a RenderOptions,
    text: String,
}

impl<'a> Transcript<'a> {
    pub fn new(options: &'a RenderOptions) -> Self {
        Transcript {
            options,
            text: String::new(),
        }
    }

    pub fn request_head(&mut self, src: Endpoint, dst: Endpoint, ts: Option<f64>, head: &RequestHead) {
        if self.options.level == Level::Url {
            self.line(&format!("{} {}", head.method, head.url()));
            return;
        }
        let at = ts.map(|ts| format!(" [{}]", format_timestamp(ts))).unwrap_or_default();
        self.line(&format!(
            "********** {} -----> {}{} **********",
            src, dst, at
        ));
        self.line(&head.request_line());
        self.headers(&head.headers);
    }

    /// Consume the request body and render it, plus the curl command if
    /// enabled. On a read error the error is noted inline and returned.
    pub fn request_body<R: Read>(&mut self, head: &RequestHead, body: &mut R) -> io::Result<()> {
        let keep = self.options.level == Level::All || self.options.curl;
        let result = self.body(&head.headers, !head.body.is_empty(), keep, body);
        if self.options.curl {
            let data = result.as_ref().ok().and_then(|data| data.as_deref());
            self.line(&curl_command(head, data));
            self.line("");
        }
        result.map(|_| ())
    }

    /// Render a 1xx response that precedes the final one.
    pub fn interim(&mut self, head: &ResponseHead) {
        if self.options.level == Level::Url {
            return;
        }
        self.line("");
        self.line(&head.status_line());
        self.headers(&head.headers);
    }

    pub fn response<R: Read>(&mut self, head: &ResponseHead, body: &mut R) -> io::Result<()> {
        if self.options.level == Level::Url {
            io::copy(body, &mut io::sink())?;
            return Ok(());
        }
        self.line("");
        self.line(&head.status_line());
        self.headers(&head.headers);
        let keep = self.options.level == Level::All;
        self.body(&head.headers, !head.body.is_empty(), keep, body)
            .map(|_| ())
    }

    pub fn into_string(self) -> String {
        self.text
    }

    fn line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
    }

    fn headers(&mut self, headers: &Headers) {
        for header in headers.iter() {
            self.line(&format!("{}: {}", header.name, header.value));
        }
    }

    /// Read a body to its end. With `keep` the bytes are returned (and
    /// rendered at `Level::All`); otherwise they are counted and discarded.
    /// At most `max_body` bytes are kept, and a truncated body is not returned.
    fn body<R: Read>(
        &mut self,
        headers: &Headers,
        declared: bool,
        keep: bool,
        body: &mut R,
    ) -> io::Result<Option<Vec<u8>>> {
        let mut truncated = false;
        let (size, data) = if keep {
            let limit = self.options.max_body as u64;
            let mut data = Vec::new();
            let kept = body.by_ref().take(limit).read_to_end(&mut data);
            let rest = kept.and_then(|_| io::copy(body, &mut io::sink()));
            match rest {
                Ok(rest) => {
                    truncated = rest > 0;
                    (data.len() as u64 + rest, Some(data))
                }
                Err(err) => {
                    self.line(&format!("{{Read body failed: {}, len: {}}}", err, data.len()));
                    return Err(err);
                }
            }
        } else {
            match io::copy(body, &mut io::sink()) {
                Ok(n) => (n, None),
                Err(err) => {
                    self.line(&format!("{{Read body failed: {}}}", err));
                    return Err(err);
                }
            }
        };

        if self.options.level != Level::All {
            if declared || size > 0 {
                self.line("");
                self.line(&format!(
                    "{{body size: {}, set [level = all] to display http body}}",
                    size
                ));
            }
            return Ok(data.filter(|_| !truncated));
        }
        if size > 0 {
            if let Some(raw) = &data {
                self.line("");
                let rendered = render_body(headers, raw, self.options);
                self.line(&rendered);
                if truncated {
                    self.line(&format!(
                        "{{Body truncated: showing {} of {} bytes}}",
                        raw.len(),
                        size
                    ));
                }
            }
        }
        Ok(data.filter(|_| !truncated))
    }
}

/// Seconds since the epoch as `HH:MM:SS.micros` (UTC).
pub fn format_timestamp(ts: f64) -> String {
    let secs = ts as u64;
    let micros = ((ts - secs as f64) * 1_000_000.0) as u32;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}:{:02}.{:06}", hours, minutes, seconds, micros)
}

/// Decode and format a body for display. Never fails; problems come back as
/// a `{...}` note.
pub fn render_body(headers: &Headers, raw: &[u8], options: &RenderOptions) -> String {
    let encoding = headers
        .get("Content-Encoding")
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();
    let data = match decode_content(&encoding, raw) {
        Ok(data) => data,
        Err(note) => return note,
    };

    let content_type = headers.get("Content-Type").unwrap_or("").trim();
    let (mime, charset) = parse_content_type(content_type);
    let kind = if content_type.is_empty() { sniff(&data) } else { mime.kind() };
    let printable = kind == BodyClass::Text || (options.force && kind == BodyClass::Unknown);
    if !printable {
        return format!(
            "{{Non-text body, content-type: {}, len: {}}}",
            content_type,
            data.len()
        );
    }

    let (mut text, note) = decode_charset(&data, charset.as_deref());
    if options.pretty && (mime.sub == "json" || mime.suffix.as_deref() == Some("json") || looks_like_json(&text)) {
        if let Some(pretty) = pretty_json(&text) {
            text = pretty;
        }
    }
    match note {
        Some(note) => format!("{}\n{}", note, text),
        None => text,
    }
}

fn decode_content(encoding: &str, raw: &[u8]) -> Result<Vec<u8>, String> {
    match encoding {
        "" | "identity" => Ok(raw.to_vec()),
        "gzip" | "x-gzip" => {
            let mut out = Vec::new();
            GzDecoder::new(raw)
                .read_to_end(&mut out)
                .map_err(|err| format!("{{Decompress gzip failed: {}, len: {}}}", err, raw.len()))?;
            Ok(out)
        }
        "deflate" => {
            // Usually zlib-wrapped, but some servers send raw deflate.
            let mut out = Vec::new();
            if ZlibDecoder::new(raw).read_to_end(&mut out).is_ok() {
                return Ok(out);
            }
            out.clear();
            DeflateDecoder::new(raw)
                .read_to_end(&mut out)
                .map_err(|err| format!("{{Decompress deflate failed: {}, len: {}}}", err, raw.len()))?;
            Ok(out)
        }
        other => Err(format!(
            "{{Unsupported Content-Encoding: {}, len: {}}}",
            other,
            raw.len()
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyClass {
    Text,
    Binary,
    Unknown,
}

#[derive(Debug, Default)]
struct MimeType {
    top: String,
    /// Subtype without `x-`/`vnd.` prefixes and without a `+suffix`.
    sub: String,
    suffix: Option<String>,
}

const TEXT_SUBTYPES: &[&str] = &[
    "json",
    "ndjson",
    "xml",
    "html",
    "xhtml",
    "javascript",
    "ecmascript",
    "www-form-urlencoded",
    "yaml",
    "csv",
    "graphql",
    "sql",
    "plain",
];

const BINARY_SUBTYPES: &[&str] = &[
    "octet-stream",
    "pdf",
    "zip",
    "gzip",
    "tar",
    "rar",
    "7z-compressed",
    "protobuf",
    "msgpack",
    "wasm",
    "ogg",
    "shockwave-flash",
    "font-woff",
    "font-ttf",
    "ms-excel",
    "ms-powerpoint",
    "msword",
];

impl MimeType {
    fn parse(value: &str) -> MimeType {
        let value = value.trim().to_ascii_lowercase();
        let Some((top, sub)) = value.split_once('/') else {
            return MimeType {
                top: value,
                ..MimeType::default()
            };
        };
        let (sub, suffix) = match sub.split_once('+') {
            Some((sub, suffix)) => (sub, Some(suffix.to_string())),
            None => (sub, None),
        };
        let sub = sub.strip_prefix("x-").unwrap_or(sub);
        let sub = sub.strip_prefix("vnd.").unwrap_or(sub);
        MimeType {
            top: top.to_string(),
            sub: sub.to_string(),
            suffix,
        }
    }

    fn kind(&self) -> BodyClass {
        match self.top.as_str() {
            "text" => return BodyClass::Text,
            "image" | "audio" | "video" | "font" => return BodyClass::Binary,
            _ => {}
        }
        if matches!(self.suffix.as_deref(), Some("json") | Some("xml")) {
            return BodyClass::Text;
        }
        if TEXT_SUBTYPES.contains(&self.sub.as_str()) {
            BodyClass::Text
        } else if BINARY_SUBTYPES.contains(&self.sub.as_str()) {
            BodyClass::Binary
        } else {
            BodyClass::Unknown
        }
    }
}

/// Split `type/subtype; charset=x` into the mime type and the charset.
fn parse_content_type(value: &str) -> (MimeType, Option<String>) {
    let mut parts = value.split(';');
    let mime = MimeType::parse(parts.next().unwrap_or(""));
    let charset = parts.find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_ascii_lowercase())
        } else {
            None
        }
    });
    (mime, charset)
}

fn decode_charset(data: &[u8], charset: Option<&str>) -> (String, Option<String>) {
    match charset {
        None | Some("utf-8") | Some("utf8") | Some("us-ascii") | Some("ascii") => {
            (String::from_utf8_lossy(data).into_owned(), None)
        }
        Some("iso-8859-1") | Some("latin1") | Some("latin-1") | Some("l1") => {
            (data.iter().map(|&b| b as char).collect(), None)
        }
        Some(other) => (
            String::from_utf8_lossy(data).into_owned(),
            Some(format!("{{Unsupported charset: {}, shown as utf-8}}", other)),
        ),
    }
}

/// Classify an untyped body: valid UTF-8 without control bytes is text.
fn sniff(data: &[u8]) -> BodyClass {
    match std::str::from_utf8(data) {
        Ok(text) if !text.chars().any(|c| c.is_control() && !c.is_whitespace()) => BodyClass::Text,
        _ => BodyClass::Unknown,
    }
}

fn looks_like_json(text: &str) -> bool {
    let text = text.trim();
    (text.starts_with('{') && text.ends_with('}')) || (text.starts_with('[') && text.ends_with(']'))
}

fn pretty_json(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    serde_json::to_string_pretty(&value).ok()
}

const CURL_SKIPPED_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "transfer-encoding",
    "connection",
    "keep-alive",
    "proxy-connection",
    "upgrade",
    "te",
    "trailer",
    "expect",
    "accept-encoding",
];

/// Equivalent curl command line for a request. `body` is the request body
/// (after chunked framing is removed), if it was read.
pub fn curl_command(head: &RequestHead, body: Option<&[u8]>) -> String {
    let mut cmd = String::from("curl");
    if head.method != "GET" {
        cmd.push_str(&format!(" -X {}", head.method));
    }
    cmd.push_str(&format!(" {}", shell_quote(&head.url())));

    for header in head.headers.iter() {
        if CURL_SKIPPED_HEADERS
            .iter()
            .any(|name| header.name.eq_ignore_ascii_case(name))
        {
            continue;
        }
        cmd.push_str(&format!(
            " \\\n  -H {}",
            shell_quote(&format!("{}: {}", header.name, header.value))
        ));
    }

    let compressed = head.headers.get("Accept-Encoding").is_some_and(|v| {
        let v = v.to_ascii_lowercase();
        v.contains("gzip") || v.contains("deflate")
    });
    if compressed {
        cmd.push_str(" \\\n  --compressed");
    }

    if let Some(body) = body.filter(|b| !b.is_empty()) {
        match std::str::from_utf8(body) {
            Ok(text) if !text.contains('\0') => {
                cmd.push_str(&format!(" \\\n  --data-binary {}", shell_quote(text)));
            }
            _ => {
                cmd.push_str(&format!("\n{{curl: binary request body of {} bytes omitted}}", body.len()));
            }
        }
    }
    cmd
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r#"'\''"#))
}
