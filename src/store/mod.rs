//! Correlation store subsystem.
//!
//! # Data Flow
//! ```text
//! framer task (one per flow)
//!     → correlation.rs add(): assign id, append to history, pair by PairKey, evict
//!
//! dashboard handlers
//!     → snapshot.rs Snapshot trait (cloned, newest-first views)
//!     → PairFilter narrows pairs for the UI
//! ```
//!
//! # Design Decisions
//! - One `RwLock` around one state struct: insert, pairing and eviction are atomic together
//! - Readers get clones; nothing borrowed escapes the lock
//! - Completed pairs leave the open index, so keep-alive exchanges pair separately
//! - Ids are monotonic for the process lifetime and survive `clear`

pub mod correlation;
pub mod pair;
pub mod snapshot;

pub use correlation::{CorrelationStore, DEFAULT_MAX_SIZE};
pub use pair::PacketPair;
pub use snapshot::{PairFilter, Snapshot, SnapshotStats};
