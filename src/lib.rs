//! Passive HTTP/1.x traffic inspector library.

pub mod capture;
pub mod config;
pub mod dashboard;
pub mod flow;
pub mod framing;
pub mod lifecycle;
pub mod message;
pub mod observability;
pub mod store;

pub use config::InspectorConfig;
pub use dashboard::DashboardServer;
pub use lifecycle::Shutdown;
pub use message::CapturedMessage;
pub use store::{CorrelationStore, PacketPair, Snapshot};
