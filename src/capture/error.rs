//! Capture error types.

use thiserror::Error;

/// Failure of a frame source. Fatal to the capture loop.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("interface {0} does not deliver Ethernet frames")]
    UnsupportedChannel(String),

    #[error("unsupported link type {0}")]
    UnsupportedLinkType(i32),

    #[error("pcap read failed: {0}")]
    Pcap(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
