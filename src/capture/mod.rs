//! Passive packet capture subsystem.
//!
//! # Data Flow
//! ```text
//! source.rs (LiveSource: pnet datalink | PcapFileSource: pcap-parser)
//!     → RawFrame
//!     → packet.rs decode_frame (Ethernet / null / SLL / raw → IPv4 / IPv6 → TCP)
//!     → TcpSegment
//!     → assembler.rs (port filter, flow table)
//!         → reassembly.rs StreamBuffer (ordering, retransmits)
//!     → FlowEvent over the connection's channel
//!     → framing task
//! ```
//!
//! # Design Decisions
//! - Capture runs on one blocking thread; sources block with a short read timeout
//! - The stop flag is polled between reads, so shutdown latency is one timeout
//! - Source failures end capture; frames that fail to decode are skipped

pub mod assembler;
pub mod error;
pub mod packet;
pub mod reassembly;
pub mod source;

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

pub use assembler::{Assembler, AssemblerConfig};
pub use error::CaptureError;
pub use packet::{decode_frame, LinkType, RawFrame, TcpSegment};
pub use source::{FrameSource, LiveSource, PcapFileSource, SourceEvent};

/// Counters for one capture run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames: u64,
    pub segments: u64,
}

/// Pump frames from `source` into `assembler` until the source ends or
/// `stop` is set.
pub fn run_capture(
    source: &mut dyn FrameSource,
    assembler: &mut Assembler,
    stop: &AtomicBool,
) -> Result<CaptureStats, CaptureError> {
    let mut stats = CaptureStats::default();
    while !stop.load(Ordering::Relaxed) {
        match source.next_frame()? {
            SourceEvent::Frame(frame) => {
                stats.frames += 1;
                if let Some(segment) = decode_frame(frame.link, &frame.data, frame.timestamp) {
                    stats.segments += 1;
                    assembler.handle_segment(segment);
                }
            }
            SourceEvent::Idle => assembler.expire_idle(Utc::now()),
            SourceEvent::End => break,
        }
    }
    Ok(stats)
}
