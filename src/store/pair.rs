//! Request/response pairing record.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::flow::PairKey;
use crate::message::{CapturedMessage, MessageKind};

/// A request and its response, correlated by `PairKey`.
///
/// At least one leg is always present.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketPair {
    pub id: u64,
    /// Timestamp of the first leg seen.
    pub timestamp: DateTime<Utc>,
    pub pair_key: PairKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<CapturedMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<CapturedMessage>,
}

impl PacketPair {
    /// Open a pair from its first leg.
    pub fn open(id: u64, message: CapturedMessage) -> Self {
        let mut pair = Self {
            id,
            timestamp: message.timestamp(),
            pair_key: message.pair_key(),
            request: None,
            response: None,
        };
        pair.fill(message);
        pair
    }

    /// Set the leg matching the message kind, replacing any previous value.
    pub fn fill(&mut self, message: CapturedMessage) {
        match message.kind() {
            MessageKind::Request => self.request = Some(message),
            MessageKind::Response => self.response = Some(message),
        }
    }

    /// Both legs present.
    pub fn is_complete(&self) -> bool {
        self.request.is_some() && self.response.is_some()
    }

    /// Request URL, if the request leg is present.
    pub fn url(&self) -> Option<&str> {
        self.request.as_ref().and_then(|r| r.url())
    }
}
