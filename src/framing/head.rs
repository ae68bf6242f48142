//! Message head parsing (start line + header block) using httparse.

use httparse::{Status, EMPTY_HEADER};

use crate::framing::error::FrameError;
use crate::message::{Headers, MessageKind};

/// Maximum number of headers accepted per message.
pub const MAX_HEADERS: usize = 100;

/// Maximum size of a head before it is treated as garbage.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Parsed start line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request { method: String, target: String },
    Response { code: u16, reason: String },
}

/// Start line, minor version and headers of one message.
#[derive(Debug, Clone)]
pub struct MessageHead {
    pub start: StartLine,
    pub version: u8,
    pub headers: Headers,
}

impl MessageHead {
    pub fn kind(&self) -> MessageKind {
        match self.start {
            StartLine::Request { .. } => MessageKind::Request,
            StartLine::Response { .. } => MessageKind::Response,
        }
    }

    /// Protocol string as it appears on the wire, e.g. `HTTP/1.1`.
    pub fn protocol(&self) -> String {
        format!("HTTP/1.{}", self.version)
    }
}

/// Try to parse a head of the given kind from the front of `buf`.
///
/// Returns the head and the number of bytes it occupies, `Ok(None)` if more
/// bytes are needed.
pub fn parse_head(kind: MessageKind, buf: &[u8]) -> Result<Option<(MessageHead, usize)>, FrameError> {
    let parsed = match kind {
        MessageKind::Request => parse_request(buf)?,
        MessageKind::Response => parse_response(buf)?,
    };
    match parsed {
        Some(done) => Ok(Some(done)),
        None if buf.len() > MAX_HEAD_BYTES => Err(FrameError::HeadTooLarge {
            limit: MAX_HEAD_BYTES,
        }),
        None => Ok(None),
    }
}

fn parse_request(buf: &[u8]) -> Result<Option<(MessageHead, usize)>, FrameError> {
    let mut headers = [EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    match req.parse(buf)? {
        Status::Complete(len) => {
            let head = MessageHead {
                start: StartLine::Request {
                    method: req.method.unwrap_or_default().to_string(),
                    target: req.path.unwrap_or_default().to_string(),
                },
                version: req.version.unwrap_or(1),
                headers: collect_headers(req.headers),
            };
            Ok(Some((head, len)))
        }
        Status::Partial => Ok(None),
    }
}

fn parse_response(buf: &[u8]) -> Result<Option<(MessageHead, usize)>, FrameError> {
    let mut headers = [EMPTY_HEADER; MAX_HEADERS];
    let mut res = httparse::Response::new(&mut headers);
    match res.parse(buf)? {
        Status::Complete(len) => {
            let head = MessageHead {
                start: StartLine::Response {
                    code: res.code.unwrap_or_default(),
                    reason: res.reason.unwrap_or_default().to_string(),
                },
                version: res.version.unwrap_or(1),
                headers: collect_headers(res.headers),
            };
            Ok(Some((head, len)))
        }
        Status::Partial => Ok(None),
    }
}

fn collect_headers(raw: &[httparse::Header<'_>]) -> Headers {
    let mut headers = Headers::new();
    for header in raw.iter().filter(|h| !h.name.is_empty()) {
        let value = String::from_utf8_lossy(header.value);
        headers.append(header.name, value.trim());
    }
    headers
}
