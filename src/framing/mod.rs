//! HTTP/1.x message framing over a flow's byte stream.
//!
//! # Data Flow
//! ```text
//! FlowEvent::Data(flow, chunk)
//!     → framer.rs (buffer, state machine)
//!         Scanning: find a line, classify.rs decides request/response/skip
//!         Head:     head.rs parses start line + headers (httparse)
//!         Body:     body.rs reads Content-Length / chunked / until-close
//!     → CapturedMessage
//!     → task.rs (one per connection, a framer per direction) hands it to the CorrelationStore
//! ```
//!
//! # Design Decisions
//! - The state machine is synchronous and owns its buffer; the async task only feeds it
//! - Classification never consumes the start line, so head parsing sees it intact
//! - A parse error drops the start line and resumes scanning; it never ends the flow
//! - Chunked beats Content-Length when both are present (RFC 9112 §6.3)

pub mod body;
pub mod classify;
pub mod error;
pub mod framer;
pub mod head;
pub mod task;

pub use classify::classify_line;
pub use error::FrameError;
pub use framer::Framer;
pub use task::run_connection;
