//! Captured HTTP message model.
//!
//! A `CapturedMessage` is built by the framer once a full message (head and
//! complete body) has been read, handed to the store once, and never changed
//! afterwards except for the store-assigned id.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::flow::{FlowId, PairKey};

/// Whether a message is a request or a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific fields. Serialized inline, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageDetail {
    Request {
        method: String,
        url: String,
        host: String,
    },
    #[serde(rename_all = "camelCase")]
    Response { status: String, status_code: u16 },
}

/// Header map with values of repeated names joined by `", "`.
///
/// Names are matched ASCII case-insensitively; the spelling of the first
/// occurrence is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: &str, value: &str) {
        let existing = self
            .0
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v);
        match existing {
            Some(joined) => {
                joined.push_str(", ");
                joined.push_str(value);
            }
            None => {
                self.0.insert(name.to_string(), value.to_string());
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Headers {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

/// One HTTP request or response observed on a flow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedMessage {
    id: u64,
    #[serde(flatten)]
    detail: MessageDetail,
    timestamp: DateTime<Utc>,
    protocol: String,
    connection: String,
    content_type: String,
    body_size: usize,
    #[serde(serialize_with = "serialize_body")]
    body: Bytes,
    headers: Headers,
    pair_key: PairKey,
}

impl CapturedMessage {
    /// Build a request captured on `flow` (client → server).
    pub fn request(
        flow: &FlowId,
        timestamp: DateTime<Utc>,
        method: impl Into<String>,
        url: impl Into<String>,
        protocol: impl Into<String>,
        headers: Headers,
        body: Bytes,
    ) -> Self {
        let url = url.into();
        let host = absolute_authority(&url)
            .or_else(|| headers.get("host").map(str::to_string))
            .unwrap_or_default();
        let detail = MessageDetail::Request {
            method: method.into(),
            url,
            host,
        };
        Self::build(
            detail,
            timestamp,
            protocol.into(),
            format!("{} → {}", flow.src, flow.dst),
            headers,
            body,
            flow.pair_key(),
        )
    }

    /// Build a response captured on `flow` (server → client).
    pub fn response(
        flow: &FlowId,
        timestamp: DateTime<Utc>,
        status_code: u16,
        reason: &str,
        protocol: impl Into<String>,
        headers: Headers,
        body: Bytes,
    ) -> Self {
        let status = if reason.is_empty() {
            status_code.to_string()
        } else {
            format!("{} {}", status_code, reason)
        };
        Self::build(
            MessageDetail::Response {
                status,
                status_code,
            },
            timestamp,
            protocol.into(),
            format!("{} ← {}", flow.dst, flow.src),
            headers,
            body,
            flow.pair_key(),
        )
    }

    fn build(
        detail: MessageDetail,
        timestamp: DateTime<Utc>,
        protocol: String,
        connection: String,
        headers: Headers,
        body: Bytes,
        pair_key: PairKey,
    ) -> Self {
        let content_type = headers.get("content-type").unwrap_or_default().to_string();
        Self {
            id: 0,
            detail,
            timestamp,
            protocol,
            connection,
            content_type,
            body_size: body.len(),
            body,
            headers,
            pair_key,
        }
    }

    pub(crate) fn assign_id(&mut self, id: u64) {
        self.id = id;
    }

    /// Store-assigned id, 0 before insertion.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> MessageKind {
        match self.detail {
            MessageDetail::Request { .. } => MessageKind::Request,
            MessageDetail::Response { .. } => MessageKind::Response,
        }
    }

    pub fn detail(&self) -> &MessageDetail {
        &self.detail
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn connection(&self) -> &str {
        &self.connection
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn body_size(&self) -> usize {
        self.body_size
    }

    pub fn pair_key(&self) -> PairKey {
        self.pair_key
    }

    pub fn method(&self) -> Option<&str> {
        match &self.detail {
            MessageDetail::Request { method, .. } => Some(method),
            MessageDetail::Response { .. } => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match &self.detail {
            MessageDetail::Request { url, .. } => Some(url),
            MessageDetail::Response { .. } => None,
        }
    }

    pub fn host(&self) -> Option<&str> {
        match &self.detail {
            MessageDetail::Request { host, .. } => Some(host),
            MessageDetail::Response { .. } => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match &self.detail {
            MessageDetail::Response { status_code, .. } => Some(*status_code),
            MessageDetail::Request { .. } => None,
        }
    }

    pub fn status(&self) -> Option<&str> {
        match &self.detail {
            MessageDetail::Response { status, .. } => Some(status),
            MessageDetail::Request { .. } => None,
        }
    }
}

/// Host and port of an absolute-form request target.
fn absolute_authority(target: &str) -> Option<String> {
    if target.starts_with('/') || target == "*" {
        return None;
    }
    let url = url::Url::parse(target).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn serialize_body<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(body))
}
