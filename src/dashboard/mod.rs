//! Dashboard subsystem: web page and JSON API over the store.
//!
//! # Data Flow
//! ```text
//! Browser / CLI
//!     → server.rs (Axum router, trace + timeout layers)
//!     → handlers.rs (read a Snapshot, apply PairFilter, serialize)
//!     → page.rs (static page, polls /api/pairs)
//! ```
//!
//! # Design Decisions
//! - Handlers only see the `Snapshot` trait, never the store's lock
//! - The page renders pairs client-side; the server holds no view state
//! - Clearing is available as a JSON POST and as a plain link for the page

pub mod handlers;
pub mod page;
pub mod server;

pub use server::{AppState, DashboardServer};
