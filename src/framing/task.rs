//! Async driver that frames both directions of one connection.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::flow::{FlowEvent, FlowId, PairKey};
use crate::framing::error::FrameError;
use crate::framing::framer::Framer;
use crate::message::CapturedMessage;
use crate::observability::metrics;
use crate::store::CorrelationStore;

/// Frame every message of the connection `key` into `store` until its
/// channel closes.
///
/// Each direction gets its own `Framer`, created on its first data. Every
/// framed request is announced to the opposite direction's framer so that
/// responses are framed by the method they answer. A
/// direction ends on `Closed` (flushes any read-until-close body) or on a
/// stream error (no flush; the buffered bytes are no longer contiguous, and
/// later data for that direction is ignored). Directions still open when the
/// sender is dropped are finished as if closed.
pub async fn run_connection(key: PairKey, mut rx: UnboundedReceiver<FlowEvent>, store: Arc<CorrelationStore>) {
    let mut framers: Vec<Framer> = Vec::with_capacity(2);
    let mut failed: Vec<FlowId> = Vec::new();
    tracing::debug!(pair_key = %key, "Framing connection");

    while let Some(event) = rx.recv().await {
        let flow = event.flow();
        match event {
            FlowEvent::Data(_, chunk) => {
                if failed.contains(&flow) {
                    continue;
                }
                let framer = framer_for(&mut framers, flow);
                framer.push(chunk);
                let mut requested = Vec::new();
                while let Some(result) = framer.next_message() {
                    if let Some(method) = result.as_ref().ok().and_then(CapturedMessage::method) {
                        requested.push(method.to_string());
                    }
                    handle(&flow, result, &store);
                }
                let answering = flow.reverse();
                if !requested.is_empty() && !failed.contains(&answering) {
                    let responder = framer_for(&mut framers, answering);
                    for method in &requested {
                        responder.expect_response(method);
                    }
                }
            }
            FlowEvent::Error(_, e) => {
                let buffered = take(&mut framers, &flow).map_or(0, |framer| framer.buffered());
                tracing::warn!(flow = %flow, error = %e, buffered, "Flow stream failed");
                metrics::record_stream_error();
                failed.push(flow);
            }
            FlowEvent::Closed(_) => {
                if let Some(framer) = take(&mut framers, &flow) {
                    finish(framer, &store);
                }
                // A reused port pair starts over.
                failed.retain(|f| *f != flow);
            }
        }
    }

    for framer in framers {
        finish(framer, &store);
    }
    tracing::debug!(pair_key = %key, "Connection closed");
}

fn framer_for(framers: &mut Vec<Framer>, flow: FlowId) -> &mut Framer {
    let index = match framers.iter().position(|f| *f.flow() == flow) {
        Some(index) => index,
        None => {
            framers.push(Framer::new(flow));
            framers.len() - 1
        }
    };
    &mut framers[index]
}

fn take(framers: &mut Vec<Framer>, flow: &FlowId) -> Option<Framer> {
    let index = framers.iter().position(|f| f.flow() == flow)?;
    Some(framers.swap_remove(index))
}

fn finish(mut framer: Framer, store: &CorrelationStore) {
    let flow = *framer.flow();
    if let Some(result) = framer.finish() {
        handle(&flow, result, store);
    }
}

fn handle(flow: &FlowId, result: Result<CapturedMessage, FrameError>, store: &CorrelationStore) {
    match result {
        Ok(message) => {
            let kind = message.kind();
            let id = store.add(message);
            metrics::record_message(kind);
            tracing::debug!(flow = %flow, id, kind = %kind, "Captured message");
        }
        Err(e) => {
            metrics::record_parse_error();
            tracing::debug!(flow = %flow, error = %e, "Dropped unparseable message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FlowChunk, StreamError};
    use chrono::Utc;
    use tokio::sync::mpsc;

    fn client() -> FlowId {
        FlowId::new(
            "127.0.0.1:50500".parse().unwrap(),
            "127.0.0.1:8080".parse().unwrap(),
        )
    }

    fn server() -> FlowId {
        client().reverse()
    }

    fn data(flow: FlowId, bytes: &'static [u8]) -> FlowEvent {
        FlowEvent::Data(flow, FlowChunk::new(bytes, Utc::now()))
    }

    fn spawn(store: &Arc<CorrelationStore>) -> (mpsc::UnboundedSender<FlowEvent>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection(client().pair_key(), rx, store.clone()));
        (tx, task)
    }

    #[tokio::test]
    async fn stores_messages_and_flushes_on_close() {
        let store = Arc::new(CorrelationStore::new(10));
        let (tx, task) = spawn(&store);

        tx.send(data(server(), b"HTTP/1.1 204 No Content\r\n\r\n")).unwrap();
        tx.send(data(server(), b"HTTP/1.0 200 OK\r\n\r\nuntil the end")).unwrap();
        drop(tx);
        task.await.unwrap();

        let messages = store.get_all();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].status_code(), Some(200));
        assert_eq!(&messages[0].body()[..], b"until the end");
        assert_eq!(messages[1].status_code(), Some(204));
    }

    #[tokio::test]
    async fn keep_alive_exchanges_pair_in_capture_order() {
        let store = Arc::new(CorrelationStore::new(10));
        let (tx, task) = spawn(&store);

        tx.send(data(client(), b"GET /one HTTP/1.1\r\n\r\n")).unwrap();
        tx.send(data(server(), b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\n1")).unwrap();
        tx.send(data(client(), b"GET /two HTTP/1.1\r\n\r\n")).unwrap();
        tx.send(data(server(), b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\n2")).unwrap();
        drop(tx);
        task.await.unwrap();

        let pairs = store.get_pairs();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].url(), Some("/two"));
        assert_eq!(&pairs[0].response.as_ref().unwrap().body()[..], b"2");
        assert_eq!(pairs[1].url(), Some("/one"));
        assert_eq!(&pairs[1].response.as_ref().unwrap().body()[..], b"1");
    }

    #[tokio::test]
    async fn closed_direction_is_flushed_immediately() {
        let store = Arc::new(CorrelationStore::new(10));
        let (tx, task) = spawn(&store);

        tx.send(data(server(), b"HTTP/1.0 200 OK\r\n\r\nbody")).unwrap();
        tx.send(FlowEvent::Closed(server())).unwrap();
        tx.send(data(client(), b"GET /after HTTP/1.1\r\n\r\n")).unwrap();
        drop(tx);
        task.await.unwrap();

        let messages = store.get_all();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].status_code(), Some(200));
        assert_eq!(messages[0].url(), Some("/after"));
    }

    #[tokio::test]
    async fn stream_error_drops_only_that_direction() {
        let store = Arc::new(CorrelationStore::new(10));
        let (tx, task) = spawn(&store);

        tx.send(data(server(), b"HTTP/1.0 200 OK\r\n\r\npartial")).unwrap();
        tx.send(FlowEvent::Error(server(), StreamError::DataLost { missing: 40 }))
            .unwrap();
        tx.send(data(server(), b"HTTP/1.1 204 No Content\r\n\r\n")).unwrap();
        tx.send(data(client(), b"GET /still-framed HTTP/1.1\r\n\r\n")).unwrap();
        drop(tx);
        task.await.unwrap();

        let messages = store.get_all();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].url(), Some("/still-framed"));
    }

    #[tokio::test]
    async fn pairs_recover_after_a_lost_request() {
        let store = Arc::new(CorrelationStore::new(10));
        let (tx, task) = spawn(&store);

        tx.send(data(client(), b"GET /bad HTTP/1.1\r\nbroken header\r\n\r\n")).unwrap();
        tx.send(data(server(), b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nbad")).unwrap();
        tx.send(data(client(), b"GET /two HTTP/1.1\r\n\r\n")).unwrap();
        tx.send(data(server(), b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\ntwo")).unwrap();
        tx.send(data(client(), b"GET /three HTTP/1.1\r\n\r\n")).unwrap();
        tx.send(data(server(), b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nthree")).unwrap();
        drop(tx);
        task.await.unwrap();

        let pairs = store.get_pairs();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].url(), Some("/three"));
        assert_eq!(&pairs[0].response.as_ref().unwrap().body()[..], b"three");
        assert_eq!(pairs[1].url(), Some("/two"));
        assert_eq!(&pairs[1].response.as_ref().unwrap().body()[..], b"two");
        assert!(pairs[2].request.is_none());
        assert_eq!(&pairs[2].response.as_ref().unwrap().body()[..], b"bad");
    }

    #[tokio::test]
    async fn head_response_does_not_swallow_the_next_one() {
        let store = Arc::new(CorrelationStore::new(10));
        let (tx, task) = spawn(&store);

        tx.send(data(client(), b"HEAD /file HTTP/1.1\r\n\r\n")).unwrap();
        tx.send(data(server(), b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n")).unwrap();
        tx.send(data(client(), b"GET /next HTTP/1.1\r\n\r\n")).unwrap();
        tx.send(data(server(), b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi")).unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(store.len(), 4);
        let pairs = store.get_pairs();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].url(), Some("/next"));
        assert_eq!(&pairs[0].response.as_ref().unwrap().body()[..], b"hi");
        assert_eq!(pairs[1].request.as_ref().unwrap().method(), Some("HEAD"));
        assert_eq!(pairs[1].response.as_ref().unwrap().body_size(), 0);
    }

    #[tokio::test]
    async fn parse_errors_do_not_stop_the_flow() {
        let store = Arc::new(CorrelationStore::new(10));
        let (tx, task) = spawn(&store);

        tx.send(data(client(), b"GET /a HTTP/1.1\r\nbroken header\r\n\r\n")).unwrap();
        tx.send(data(client(), b"GET /b HTTP/1.1\r\nHost: x\r\n\r\n")).unwrap();
        drop(tx);
        task.await.unwrap();

        let messages = store.get_all();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].url(), Some("/b"));
    }
}
