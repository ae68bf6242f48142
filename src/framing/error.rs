//! Framing errors.

use thiserror::Error;

/// Why a message attempt was abandoned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Start line or header block rejected by the parser.
    #[error("malformed message head: {0}")]
    MalformedHead(#[from] httparse::Error),

    /// Header block grew past the limit without a terminating empty line.
    #[error("message head exceeds {limit} bytes")]
    HeadTooLarge { limit: usize },

    /// Content-Length missing digits, overflowing, or conflicting.
    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    /// A request with a transfer coding other than chunked last.
    #[error("unsupported request Transfer-Encoding: {0:?}")]
    UnsupportedTransferEncoding(String),

    /// Chunk size line is not hexadecimal.
    #[error("invalid chunk size line: {0:?}")]
    InvalidChunkSize(String),

    /// Chunk data not followed by CRLF.
    #[error("chunk data not terminated by CRLF")]
    MalformedChunk,

    /// Stream ended before the message was complete.
    #[error("stream ended inside the message {0}")]
    Truncated(&'static str),
}
