//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config resolved → Metrics → Store → Dashboard listener → Capture thread
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop flag + broadcast → Capture loop exits
//!     → Flows closed, framers drained → Dashboard stops accepting → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Ordered shutdown: stop capture, drain framers, close dashboard
//! - Shutdown latency is bounded by the capture read timeout

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, CaptureMode};
