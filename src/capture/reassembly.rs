//! Per-direction TCP stream reassembly.
//!
//! Sequence numbers are tracked as offsets from the stream anchor (the byte
//! after the SYN, or the first data byte seen when the SYN was missed), so
//! ordering in the pending map is unaffected by sequence wrap-around.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};

use crate::flow::StreamError;

/// Ordered-delivery buffer for one direction of a TCP connection.
#[derive(Debug)]
pub struct StreamBuffer {
    /// Sequence number of stream offset 0.
    anchor: Option<u32>,
    /// Offset of the next byte to deliver.
    next: u32,
    /// Out-of-order segments keyed by offset.
    pending: BTreeMap<u32, Vec<u8>>,
    max_pending: usize,
    pub retransmits: u64,
    pub out_of_order: u64,
}

impl StreamBuffer {
    pub fn new(max_pending: usize) -> Self {
        Self {
            anchor: None,
            next: 0,
            pending: BTreeMap::new(),
            max_pending,
            retransmits: 0,
            out_of_order: 0,
        }
    }

    /// Record the SYN; ignored once the stream is anchored.
    pub fn syn(&mut self, seq: u32) {
        if self.anchor.is_none() {
            self.anchor = Some(seq.wrapping_add(1));
        }
    }

    /// Number of segments waiting for a gap to fill.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Accept a segment's payload.
    ///
    /// Returns the bytes that became contiguous, if any. Fails when the
    /// pending limit is reached while a gap is still open.
    pub fn push(&mut self, seq: u32, data: &[u8]) -> Result<Option<Bytes>, StreamError> {
        if data.is_empty() {
            return Ok(None);
        }
        let anchor = *self.anchor.get_or_insert(seq);
        let offset = seq.wrapping_sub(anchor);
        let delta = offset.wrapping_sub(self.next) as i32;

        let mut out = BytesMut::new();
        if delta > 0 {
            if self.pending.len() >= self.max_pending {
                let gap_end = self.pending.keys().next().map_or(offset, |&k| k.min(offset));
                return Err(StreamError::DataLost {
                    missing: gap_end.wrapping_sub(self.next),
                });
            }
            self.out_of_order += 1;
            let slot = self.pending.entry(offset).or_default();
            if data.len() > slot.len() {
                *slot = data.to_vec();
            }
            return Ok(None);
        }

        if !self.deliver(delta, data, &mut out) {
            self.retransmits += 1;
            return Ok(None);
        }
        while let Some(entry) = self.pending.first_entry() {
            let delta = entry.key().wrapping_sub(self.next) as i32;
            if delta > 0 {
                break;
            }
            let data = entry.remove();
            self.deliver(delta, &data, &mut out);
        }
        Ok(Some(out.freeze()))
    }

    /// Append the part of `data` past `next`; `delta <= 0` is its start relative to `next`.
    fn deliver(&mut self, delta: i32, data: &[u8], out: &mut BytesMut) -> bool {
        let overlap = delta.unsigned_abs() as usize;
        if overlap >= data.len() {
            return false;
        }
        let fresh = &data[overlap..];
        out.extend_from_slice(fresh);
        self.next = self.next.wrapping_add(fresh.len() as u32);
        true
    }
}
