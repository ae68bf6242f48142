//! Flow identity and the per-flow byte stream contract.
//!
//! # Data Flow
//! ```text
//! capture (decoded TCP segment)
//!     → FlowId (directed src → dst)
//!     → reassembly (ordered payload)
//!     → FlowEvent::Data(FlowId, FlowChunk) over the connection's mpsc channel
//!     → framing (one task per PairKey, one framer per FlowId)
//! ```
//!
//! # Design Decisions
//! - A TCP connection is two flows, one per direction, each framed separately
//! - Both directions of a connection share one `PairKey` and one channel, so
//!   messages reach the store in capture order
//! - `Closed` ends one direction; the sender closing ends the connection

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;

/// One direction of a TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowId {
    pub src: SocketAddr,
    pub dst: SocketAddr,
}

impl FlowId {
    pub fn new(src: SocketAddr, dst: SocketAddr) -> Self {
        Self { src, dst }
    }

    /// The opposite direction of the same connection.
    pub fn reverse(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }

    /// Direction-independent key shared by both legs of an exchange.
    pub fn pair_key(&self) -> PairKey {
        PairKey::new(self.src, self.dst)
    }

    /// True if either endpoint uses `port`.
    pub fn touches_port(&self, port: u16) -> bool {
        self.src.port() == port || self.dst.port() == port
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

/// Normalized endpoint pair of a connection.
///
/// The endpoints are stored sorted, so `PairKey::new(a, b) == PairKey::new(b, a)`.
/// Pairing under this key assumes a connection carries at most one
/// unmatched exchange at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    low: SocketAddr,
    high: SocketAddr,
}

impl PairKey {
    pub fn new(a: SocketAddr, b: SocketAddr) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn endpoints(&self) -> (SocketAddr, SocketAddr) {
        (self.low, self.high)
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.low, self.high)
    }
}

impl Serialize for PairKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A run of in-order payload bytes together with its capture time.
#[derive(Debug, Clone)]
pub struct FlowChunk {
    pub data: Bytes,
    pub timestamp: DateTime<Utc>,
}

impl FlowChunk {
    pub fn new(data: impl Into<Bytes>, timestamp: DateTime<Utc>) -> Self {
        Self {
            data: data.into(),
            timestamp,
        }
    }
}

/// Failure reported by the stream producer in place of more bytes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// Reassembly gave up waiting for a missing range of the sequence space.
    #[error("{missing} bytes lost in reassembly")]
    DataLost { missing: u32 },
}

/// Item delivered on a connection's channel, tagged with its direction.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    Data(FlowId, FlowChunk),
    /// The direction's stream broke; no more data follows for it.
    Error(FlowId, StreamError),
    /// The direction ended normally (FIN, RST, idle or end of capture).
    Closed(FlowId),
}

impl FlowEvent {
    pub fn flow(&self) -> FlowId {
        match self {
            FlowEvent::Data(flow, _) | FlowEvent::Error(flow, _) | FlowEvent::Closed(flow) => *flow,
        }
    }
}
