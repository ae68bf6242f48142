//! Body length determination and incremental body decoding.
//!
//! # Responsibilities
//! - Decide how a message body is delimited from its head
//! - Consume body bytes from the flow buffer as they arrive
//! - Reassemble chunked transfer-coding into the plain body

use bytes::{Buf, BytesMut};

use crate::framing::error::FrameError;
use crate::framing::head::{MessageHead, StartLine};

/// Longest chunk-size or trailer line accepted.
const MAX_CHUNK_LINE: usize = 4096;

/// How the body of a message is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// No body at all.
    Empty,
    /// Exactly this many bytes.
    Length(u64),
    /// Chunked transfer-coding.
    Chunked,
    /// Everything until the stream closes.
    UntilClose,
}

impl BodyFraming {
    /// Framing for a parsed head.
    ///
    /// `answers` is the method of the request a response answers, when known.
    /// Precedence: bodiless responses (1xx, 204, 304, any answer to HEAD, a
    /// 2xx answer to CONNECT), then chunked, then Content-Length, then empty
    /// for requests and read-until-close for responses.
    pub fn for_head(head: &MessageHead, answers: Option<&str>) -> Result<Self, FrameError> {
        let is_request = match head.start {
            StartLine::Request { .. } => true,
            StartLine::Response { code, .. } => {
                let bodiless_answer = match answers {
                    Some("HEAD") => true,
                    Some("CONNECT") => (200..300).contains(&code),
                    _ => false,
                };
                if bodiless_answer || (100..200).contains(&code) || code == 204 || code == 304 {
                    return Ok(BodyFraming::Empty);
                }
                false
            }
        };

        if let Some(te) = head.headers.get("transfer-encoding") {
            let last = te.rsplit(',').next().unwrap_or_default().trim();
            if last.eq_ignore_ascii_case("chunked") {
                return Ok(BodyFraming::Chunked);
            }
            if is_request {
                return Err(FrameError::UnsupportedTransferEncoding(te.to_string()));
            }
            return Ok(BodyFraming::UntilClose);
        }

        if let Some(raw) = head.headers.get("content-length") {
            return parse_content_length(raw).map(|len| match len {
                0 => BodyFraming::Empty,
                n => BodyFraming::Length(n),
            });
        }

        Ok(if is_request {
            BodyFraming::Empty
        } else {
            BodyFraming::UntilClose
        })
    }
}

/// Parse a (possibly joined) Content-Length value; repeated values must agree.
fn parse_content_length(raw: &str) -> Result<u64, FrameError> {
    let mut length = None;
    for part in raw.split(',').map(str::trim) {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FrameError::InvalidContentLength(raw.to_string()));
        }
        let value: u64 = part
            .parse()
            .map_err(|_| FrameError::InvalidContentLength(raw.to_string()))?;
        match length {
            Some(prev) if prev != value => {
                return Err(FrameError::InvalidContentLength(raw.to_string()))
            }
            _ => length = Some(value),
        }
    }
    length.ok_or_else(|| FrameError::InvalidContentLength(raw.to_string()))
}

/// Progress of a body read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyProgress {
    Complete,
    NeedMore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data(u64),
    DataEnd,
    Trailers,
}

/// Incremental body reader for one message.
#[derive(Debug)]
pub struct BodyReader {
    framing: BodyFraming,
    remaining: u64,
    chunk: ChunkState,
    body: BytesMut,
}

impl BodyReader {
    pub fn new(framing: BodyFraming) -> Self {
        let remaining = match framing {
            BodyFraming::Length(n) => n,
            _ => 0,
        };
        Self {
            framing,
            remaining,
            chunk: ChunkState::Size,
            body: BytesMut::new(),
        }
    }

    pub fn framing(&self) -> BodyFraming {
        self.framing
    }

    /// Move body bytes out of `buf`, leaving anything past the body in place.
    pub fn read(&mut self, buf: &mut BytesMut) -> Result<BodyProgress, FrameError> {
        match self.framing {
            BodyFraming::Empty => Ok(BodyProgress::Complete),
            BodyFraming::Length(_) => {
                let take = (self.remaining.min(buf.len() as u64)) as usize;
                self.body.extend_from_slice(&buf.split_to(take));
                self.remaining -= take as u64;
                Ok(if self.remaining == 0 {
                    BodyProgress::Complete
                } else {
                    BodyProgress::NeedMore
                })
            }
            BodyFraming::Chunked => self.read_chunked(buf),
            BodyFraming::UntilClose => {
                self.body.extend_from_slice(&buf.split());
                Ok(BodyProgress::NeedMore)
            }
        }
    }

    /// Called at end of stream. Only a read-until-close body can end here.
    pub fn finish(&mut self) -> Result<(), FrameError> {
        match self.framing {
            BodyFraming::Empty | BodyFraming::UntilClose => Ok(()),
            BodyFraming::Length(_) if self.remaining == 0 => Ok(()),
            _ => Err(FrameError::Truncated("body")),
        }
    }

    pub fn into_body(self) -> bytes::Bytes {
        self.body.freeze()
    }

    fn read_chunked(&mut self, buf: &mut BytesMut) -> Result<BodyProgress, FrameError> {
        loop {
            match self.chunk {
                ChunkState::Size => {
                    let Some(line) = take_line(buf)? else {
                        return Ok(BodyProgress::NeedMore);
                    };
                    let text = String::from_utf8_lossy(&line);
                    let size = text.split(';').next().unwrap_or_default().trim();
                    let size = u64::from_str_radix(size, 16)
                        .map_err(|_| FrameError::InvalidChunkSize(text.to_string()))?;
                    self.chunk = if size == 0 {
                        ChunkState::Trailers
                    } else {
                        ChunkState::Data(size)
                    };
                }
                ChunkState::Data(remaining) => {
                    if buf.is_empty() {
                        return Ok(BodyProgress::NeedMore);
                    }
                    let take = (remaining.min(buf.len() as u64)) as usize;
                    self.body.extend_from_slice(&buf.split_to(take));
                    let left = remaining - take as u64;
                    self.chunk = if left == 0 {
                        ChunkState::DataEnd
                    } else {
                        ChunkState::Data(left)
                    };
                }
                ChunkState::DataEnd => match buf.first().copied() {
                    None => return Ok(BodyProgress::NeedMore),
                    Some(b'\n') => {
                        buf.advance(1);
                        self.chunk = ChunkState::Size;
                    }
                    Some(b'\r') => {
                        if buf.len() < 2 {
                            return Ok(BodyProgress::NeedMore);
                        }
                        if buf[1] != b'\n' {
                            return Err(FrameError::MalformedChunk);
                        }
                        buf.advance(2);
                        self.chunk = ChunkState::Size;
                    }
                    Some(_) => return Err(FrameError::MalformedChunk),
                },
                ChunkState::Trailers => {
                    let Some(line) = take_line(buf)? else {
                        return Ok(BodyProgress::NeedMore);
                    };
                    if line.is_empty() {
                        return Ok(BodyProgress::Complete);
                    }
                }
            }
        }
    }
}

/// Remove one LF-terminated line from `buf`, returning it without CR/LF.
fn take_line(buf: &mut BytesMut) -> Result<Option<BytesMut>, FrameError> {
    match buf.iter().position(|&b| b == b'\n') {
        Some(end) => {
            let mut line = buf.split_to(end + 1);
            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(end - 1);
            }
            Ok(Some(line))
        }
        None if buf.len() > MAX_CHUNK_LINE => Err(FrameError::InvalidChunkSize(
            String::from_utf8_lossy(&buf[..32]).into_owned(),
        )),
        None => Ok(None),
    }
}
