//! Per-flow framing state machine.
//!
//! # Responsibilities
//! - Buffer the flow's bytes between chunks
//! - Skip lines until one classifies as a request or status line
//! - Parse the head, then read the body to completion
//! - Resynchronize after any parse error
//!
//! # States
//! ```text
//! Scanning ──classified line──▶ Head ──head parsed──▶ Body ──complete──▶ Scanning
//!    ▲                            │                     │
//!    └────── parse error ─────────┴─────────────────────┘
//! ```

use std::collections::VecDeque;

use bytes::{Buf, BytesMut};
use chrono::{DateTime, Utc};

use crate::flow::{FlowChunk, FlowId};
use crate::framing::body::{BodyFraming, BodyProgress, BodyReader};
use crate::framing::classify::classify_line;
use crate::framing::error::FrameError;
use crate::framing::head::{parse_head, MessageHead, StartLine, MAX_HEAD_BYTES};
use crate::message::{CapturedMessage, MessageKind};

/// Longest unterminated line kept while scanning for a start line.
const MAX_SCAN_LINE: usize = MAX_HEAD_BYTES;
/// Requests remembered while their responses are outstanding.
const MAX_AWAITING: usize = 64;

#[derive(Debug)]
enum State {
    Scanning,
    Head {
        kind: MessageKind,
        started: DateTime<Utc>,
    },
    Body {
        head: MessageHead,
        started: DateTime<Utc>,
        reader: BodyReader,
    },
}

/// Extracts HTTP messages from one flow's ordered byte stream.
#[derive(Debug)]
pub struct Framer {
    flow: FlowId,
    buf: BytesMut,
    state: State,
    /// Total bytes pushed; the front of `buf` sits at `received - buf.len()`.
    received: u64,
    /// Stream offset and capture time of each chunk still in `buf`.
    stamps: VecDeque<(u64, DateTime<Utc>)>,
    /// Methods of requests seen in the opposite direction, oldest first.
    awaiting: VecDeque<String>,
}

impl Framer {
    pub fn new(flow: FlowId) -> Self {
        Self {
            flow,
            buf: BytesMut::new(),
            state: State::Scanning,
            received: 0,
            stamps: VecDeque::new(),
            awaiting: VecDeque::new(),
        }
    }

    pub fn flow(&self) -> &FlowId {
        &self.flow
    }

    /// Bytes received but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Append a chunk of the stream.
    pub fn push(&mut self, chunk: FlowChunk) {
        if chunk.data.is_empty() {
            return;
        }
        self.stamps.push_back((self.received, chunk.timestamp));
        self.received += chunk.data.len() as u64;
        self.buf.extend_from_slice(&chunk.data);
    }

    /// Record a request sent in the opposite direction.
    ///
    /// Responses pop these in order, so the response to `HEAD` (or a 2xx to
    /// `CONNECT`) is framed without a body.
    pub fn expect_response(&mut self, method: &str) {
        if self.awaiting.len() == MAX_AWAITING {
            self.awaiting.pop_front();
        }
        self.awaiting.push_back(method.to_string());
    }

    /// Next complete message or parse error, `None` when more bytes are needed.
    pub fn next_message(&mut self) -> Option<Result<CapturedMessage, FrameError>> {
        loop {
            match std::mem::replace(&mut self.state, State::Scanning) {
                State::Scanning => {
                    let Some(end) = self.buf.iter().position(|&b| b == b'\n') else {
                        if self.buf.len() > MAX_SCAN_LINE {
                            tracing::trace!(flow = %self.flow, dropped = self.buf.len(), "Dropping unterminated junk");
                            self.buf.clear();
                        }
                        return None;
                    };
                    let line = trim_cr(&self.buf[..end]);
                    match classify_line(line) {
                        Some(kind) => {
                            self.state = State::Head {
                                kind,
                                started: self.front_timestamp(),
                            };
                        }
                        None => self.buf.advance(end + 1),
                    }
                }
                State::Head { kind, started } => match parse_head(kind, &self.buf) {
                    Ok(Some((head, len))) => {
                        self.buf.advance(len);
                        let answers = match head.start {
                            // Interim responses precede the final answer.
                            StartLine::Response { code, .. } if code >= 200 || code == 101 => {
                                self.awaiting.pop_front()
                            }
                            _ => None,
                        };
                        match BodyFraming::for_head(&head, answers.as_deref()) {
                            Ok(framing) => {
                                self.state = State::Body {
                                    head,
                                    started,
                                    reader: BodyReader::new(framing),
                                };
                            }
                            Err(e) => return Some(Err(e)),
                        }
                    }
                    Ok(None) => {
                        self.state = State::Head { kind, started };
                        return None;
                    }
                    Err(e) => {
                        self.skip_line();
                        return Some(Err(e));
                    }
                },
                State::Body {
                    head,
                    started,
                    mut reader,
                } => match reader.read(&mut self.buf) {
                    Ok(BodyProgress::Complete) => {
                        return Some(Ok(self.build(head, started, reader)));
                    }
                    Ok(BodyProgress::NeedMore) => {
                        self.state = State::Body {
                            head,
                            started,
                            reader,
                        };
                        return None;
                    }
                    Err(e) => return Some(Err(e)),
                },
            }
        }
    }

    /// Flush at end of stream.
    ///
    /// Completes a read-until-close body and reports a message cut short by
    /// the end of the stream. Call after `next_message` has returned `None`.
    pub fn finish(&mut self) -> Option<Result<CapturedMessage, FrameError>> {
        let state = std::mem::replace(&mut self.state, State::Scanning);
        let result = match state {
            State::Scanning => None,
            State::Head { .. } => Some(Err(FrameError::Truncated("head"))),
            State::Body {
                head,
                started,
                mut reader,
            } => Some(
                reader
                    .finish()
                    .map(|()| self.build(head, started, reader)),
            ),
        };
        self.buf.clear();
        result
    }

    fn build(&self, head: MessageHead, started: DateTime<Utc>, reader: BodyReader) -> CapturedMessage {
        let protocol = head.protocol();
        let body = reader.into_body();
        match head.start {
            StartLine::Request { method, target } => CapturedMessage::request(
                &self.flow,
                started,
                method,
                target,
                protocol,
                head.headers,
                body,
            ),
            StartLine::Response { code, reason } => CapturedMessage::response(
                &self.flow,
                started,
                code,
                &reason,
                protocol,
                head.headers,
                body,
            ),
        }
    }

    /// Capture time of the chunk holding the first buffered byte.
    fn front_timestamp(&mut self) -> DateTime<Utc> {
        let front = self.received - self.buf.len() as u64;
        while self.stamps.len() > 1 && self.stamps[1].0 <= front {
            self.stamps.pop_front();
        }
        self.stamps.front().map_or_else(Utc::now, |&(_, at)| at)
    }

    /// Drop the current (start) line so scanning resumes after it.
    fn skip_line(&mut self) {
        match self.buf.iter().position(|&b| b == b'\n') {
            Some(end) => self.buf.advance(end + 1),
            None => self.buf.clear(),
        }
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}
