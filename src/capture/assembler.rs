//! Flow table: turns TCP segments into per-flow byte streams.
//!
//! # Responsibilities
//! - Filter segments by the observed port
//! - Track one `StreamBuffer` per flow direction
//! - Spawn one framing task per connection, shared by both directions
//! - Close flows on FIN/RST, on idle expiry, and at end of capture
//!
//! # Design Decisions
//! - The assembler runs on the blocking capture thread and never awaits
//! - Channels are unbounded so a slow framer cannot stall capture
//! - Both directions share the connection channel, so a response is always
//!   stored before the next request on the same connection
//! - After a stream error the flow stays in the table, muted, until it closes,
//!   so its remaining segments do not start a fresh framer mid-message

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;

use crate::capture::packet::TcpSegment;
use crate::capture::reassembly::StreamBuffer;
use crate::flow::{FlowChunk, FlowEvent, FlowId, PairKey};
use crate::framing::run_connection;
use crate::observability::metrics;
use crate::store::CorrelationStore;

/// How often, in capture time, idle flows are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Assembler tuning, taken from the capture and reassembly config.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Observed TCP port; 0 accepts every port.
    pub port: u16,
    pub max_pending_segments: usize,
    pub flow_idle: Duration,
}

struct FlowEntry {
    stream: StreamBuffer,
    /// Set once the stream failed.
    muted: bool,
    last_seen: DateTime<Utc>,
}

/// Owner of every live flow on the capture thread.
pub struct Assembler {
    config: AssemblerConfig,
    store: Arc<CorrelationStore>,
    runtime: Handle,
    flows: HashMap<FlowId, FlowEntry>,
    /// Framing channel of every connection with at least one tracked flow.
    connections: HashMap<PairKey, UnboundedSender<FlowEvent>>,
    tasks: Vec<JoinHandle<()>>,
    last_sweep: Option<DateTime<Utc>>,
}

impl Assembler {
    pub fn new(config: AssemblerConfig, store: Arc<CorrelationStore>, runtime: Handle) -> Self {
        Self {
            config,
            store,
            runtime,
            flows: HashMap::new(),
            connections: HashMap::new(),
            tasks: Vec::new(),
            last_sweep: None,
        }
    }

    /// Flows currently tracked.
    pub fn active_flows(&self) -> usize {
        self.flows.len()
    }

    pub fn handle_segment(&mut self, segment: TcpSegment) {
        if self.config.port != 0 && !segment.flow.touches_port(self.config.port) {
            return;
        }
        self.maybe_sweep(segment.timestamp);

        let flow = segment.flow;
        if !self.flows.contains_key(&flow) {
            // Stray ACKs and resets of unknown flows carry nothing to frame.
            if segment.rst || (!segment.syn && segment.payload.is_empty()) {
                return;
            }
            self.open(flow, segment.timestamp);
        }
        let Some(entry) = self.flows.get_mut(&flow) else {
            return;
        };
        entry.last_seen = segment.timestamp;

        let mut seq = segment.seq;
        if segment.syn {
            entry.stream.syn(seq);
            seq = seq.wrapping_add(1);
        }
        if !entry.muted {
            let event = match entry.stream.push(seq, &segment.payload) {
                Ok(Some(data)) => Some(FlowEvent::Data(flow, FlowChunk::new(data, segment.timestamp))),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(flow = %flow, error = %e, "Reassembly gave up on flow");
                    entry.muted = true;
                    Some(FlowEvent::Error(flow, e))
                }
            };
            if let (Some(event), Some(tx)) = (event, self.connections.get(&flow.pair_key())) {
                if tx.send(event).is_err() {
                    entry.muted = true;
                }
            }
        }

        if segment.fin || segment.rst {
            self.close(&flow, if segment.rst { "reset" } else { "fin" });
        }
    }

    /// Close every flow idle since before `now - flow_idle`.
    pub fn expire_idle(&mut self, now: DateTime<Utc>) {
        let idle = self.config.flow_idle;
        let expired: Vec<FlowId> = self
            .flows
            .iter()
            .filter(|(_, entry)| {
                now.signed_duration_since(entry.last_seen)
                    .to_std()
                    .is_ok_and(|elapsed| elapsed > idle)
            })
            .map(|(flow, _)| *flow)
            .collect();
        for flow in expired {
            self.close(&flow, "idle");
        }
        self.tasks.retain(|task| !task.is_finished());
        self.last_sweep = Some(now);
    }

    /// Close every flow and hand back the framer tasks still running.
    pub fn finish(mut self) -> Vec<JoinHandle<()>> {
        let flows: Vec<FlowId> = self.flows.keys().copied().collect();
        for flow in flows {
            self.close(&flow, "end of capture");
        }
        self.tasks
    }

    fn open(&mut self, flow: FlowId, now: DateTime<Utc>) {
        let key = flow.pair_key();
        if !self.connections.contains_key(&key) {
            let (tx, rx) = mpsc::unbounded_channel();
            let task = self.runtime.spawn(run_connection(key, rx, self.store.clone()));
            self.tasks.push(task);
            self.connections.insert(key, tx);
        }
        self.flows.insert(
            flow,
            FlowEntry {
                stream: StreamBuffer::new(self.config.max_pending_segments),
                muted: false,
                last_seen: now,
            },
        );
        metrics::record_flow_opened();
        tracing::debug!(flow = %flow, "Flow opened");
    }

    fn close(&mut self, flow: &FlowId, reason: &'static str) {
        if let Some(entry) = self.flows.remove(flow) {
            let key = flow.pair_key();
            if !entry.muted {
                if let Some(tx) = self.connections.get(&key) {
                    let _ = tx.send(FlowEvent::Closed(*flow));
                }
            }
            if !self.flows.contains_key(&flow.reverse()) {
                // Last direction gone: dropping the sender ends the task.
                self.connections.remove(&key);
            }
            metrics::record_flow_closed();
            tracing::debug!(
                flow = %flow,
                reason,
                retransmits = entry.stream.retransmits,
                out_of_order = entry.stream.out_of_order,
                "Flow closed"
            );
        }
    }

    fn maybe_sweep(&mut self, now: DateTime<Utc>) {
        let due = match self.last_sweep {
            Some(last) => now.signed_duration_since(last).to_std().is_ok_and(|d| d >= SWEEP_INTERVAL),
            None => {
                self.last_sweep = Some(now);
                false
            }
        };
        if due {
            self.expire_idle(now);
        }
    }
}
