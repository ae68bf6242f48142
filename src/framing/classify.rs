//! Start line classification.

use crate::message::MessageKind;

/// Method tokens recognized as the start of a request line.
pub const METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "TRACE", "CONNECT",
];

const RESPONSE_PREFIX: &[u8] = b"HTTP/";

/// Classify one line (without its terminator).
///
/// Returns `None` for anything that is neither a request line nor a status line;
/// the caller discards such lines.
pub fn classify_line(line: &[u8]) -> Option<MessageKind> {
    if line.starts_with(RESPONSE_PREFIX) {
        return Some(MessageKind::Response);
    }
    let is_request = METHODS.iter().any(|method| {
        let method = method.as_bytes();
        line.len() > method.len() && line.starts_with(method) && line[method.len()] == b' '
    });
    is_request.then_some(MessageKind::Request)
}
