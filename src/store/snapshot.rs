//! Read-side view of the store consumed by the dashboard.

use serde::{Deserialize, Serialize};

use crate::message::CapturedMessage;
use crate::store::correlation::CorrelationStore;
use crate::store::pair::PacketPair;

/// Point-in-time copies of the store's contents.
///
/// Every call reflects the latest committed state; nothing is cached.
pub trait Snapshot: Send + Sync {
    /// Messages, newest first.
    fn messages(&self) -> Vec<CapturedMessage>;

    /// Pairs, newest first.
    fn pairs(&self) -> Vec<PacketPair>;

    fn clear(&self);

    fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            messages: self.messages().len(),
            pairs: self.pairs().len(),
        }
    }
}

/// Current counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapshotStats {
    pub messages: usize,
    pub pairs: usize,
}

impl Snapshot for CorrelationStore {
    fn messages(&self) -> Vec<CapturedMessage> {
        self.get_all()
    }

    fn pairs(&self) -> Vec<PacketPair> {
        self.get_pairs()
    }

    fn clear(&self) {
        CorrelationStore::clear(self)
    }

    fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            messages: self.len(),
            pairs: self.pair_count(),
        }
    }
}

/// Narrowing applied to a pair snapshot, deserialized from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PairFilter {
    /// Case-insensitive substring of the request URL.
    pub q: Option<String>,
    pub limit: Option<usize>,
}

impl PairFilter {
    /// Apply to a newest-first pair list.
    ///
    /// A non-empty query keeps only pairs whose request URL contains it,
    /// so response-only pairs are excluded.
    pub fn apply(&self, pairs: Vec<PacketPair>) -> Vec<PacketPair> {
        let needle = self
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);
        let limit = self.limit.unwrap_or(usize::MAX);

        pairs
            .into_iter()
            .filter(|pair| match &needle {
                Some(needle) => pair
                    .url()
                    .is_some_and(|url| url.to_lowercase().contains(needle.as_str())),
                None => true,
            })
            .take(limit)
            .collect()
    }
}
