//! Bounded message history and request/response correlation.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::flow::PairKey;
use crate::message::{CapturedMessage, MessageKind};
use crate::observability::metrics;
use crate::store::pair::PacketPair;

/// Default capacity of both the history and the pair list.
pub const DEFAULT_MAX_SIZE: usize = 500;

#[derive(Debug, Default)]
struct StoreState {
    /// Arrival order, oldest at the front.
    messages: VecDeque<CapturedMessage>,
    /// Arrival order of the first leg; ids are consecutive front to back.
    pairs: VecDeque<PacketPair>,
    /// Pairs still waiting for a leg.
    open: HashMap<PairKey, u64>,
    next_message_id: u64,
    next_pair_id: u64,
}

impl StoreState {
    fn pair_mut(&mut self, id: u64) -> Option<&mut PacketPair> {
        let front = self.pairs.front()?.id;
        let index = usize::try_from(id.checked_sub(front)?).ok()?;
        self.pairs.get_mut(index)
    }
}

/// Thread-safe store of captured messages and their pairings.
///
/// Every mutation happens in one write-locked critical section, so readers
/// only ever see fully applied inserts.
#[derive(Debug)]
pub struct CorrelationStore {
    max_size: usize,
    state: RwLock<StoreState>,
}

impl CorrelationStore {
    /// Create a store retaining at most `max_size` messages and `max_size` pairs.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            state: RwLock::new(StoreState {
                next_message_id: 1,
                next_pair_id: 1,
                ..StoreState::default()
            }),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Insert a message, pair it, and evict past capacity.
    ///
    /// Returns the id assigned to the message.
    pub fn add(&self, mut message: CapturedMessage) -> u64 {
        let mut state = self.write();

        let id = state.next_message_id;
        state.next_message_id += 1;
        message.assign_id(id);

        let key = message.pair_key();
        let is_request = message.kind() == MessageKind::Request;
        let open_id = state.open.get(&key).copied();
        let filled = open_id.and_then(|pair_id| {
            let pair = state.pair_mut(pair_id)?;
            // A pair opened by a response answers a request that was never
            // framed; a later request starts its own pair.
            if is_request && pair.response.is_some() {
                return None;
            }
            pair.fill(message.clone());
            Some(pair.is_complete())
        });
        match filled {
            Some(true) => {
                state.open.remove(&key);
            }
            Some(false) => {}
            None => {
                let pair_id = state.next_pair_id;
                state.next_pair_id += 1;
                state.pairs.push_back(PacketPair::open(pair_id, message.clone()));
                state.open.insert(key, pair_id);
            }
        }
        state.messages.push_back(message);

        while state.messages.len() > self.max_size {
            state.messages.pop_front();
            metrics::record_eviction("message");
        }
        while state.pairs.len() > self.max_size {
            if let Some(evicted) = state.pairs.pop_front() {
                if state.open.get(&evicted.pair_key) == Some(&evicted.id) {
                    state.open.remove(&evicted.pair_key);
                }
                tracing::trace!(pair_key = %evicted.pair_key, id = evicted.id, "Evicted pair");
                metrics::record_eviction("pair");
            }
        }

        id
    }

    /// All retained messages, newest first.
    pub fn get_all(&self) -> Vec<CapturedMessage> {
        self.read().messages.iter().rev().cloned().collect()
    }

    /// All retained pairs, newest first.
    pub fn get_pairs(&self) -> Vec<PacketPair> {
        self.read().pairs.iter().rev().cloned().collect()
    }

    /// Drop all messages, pairs and open pairings. Ids keep counting.
    pub fn clear(&self) {
        let mut state = self.write();
        state.messages.clear();
        state.pairs.clear();
        state.open.clear();
    }

    pub fn len(&self) -> usize {
        self.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pair_count(&self) -> usize {
        self.read().pairs.len()
    }

    // A panic while holding the lock cannot leave the state half-written in a
    // way readers would misinterpret, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}
