//! Connection framing tasks feeding one shared store concurrently.

mod common;

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::mpsc;

use common::addr;
use http_inspector::flow::{FlowChunk, FlowEvent, FlowId, StreamError};
use http_inspector::framing::run_connection;
use http_inspector::store::{CorrelationStore, PairFilter, Snapshot};

fn chunk(flow: FlowId, data: &'static [u8]) -> FlowEvent {
    FlowEvent::Data(flow, FlowChunk::new(Bytes::from_static(data), Utc::now()))
}

fn client_flow(port: u16) -> FlowId {
    FlowId::new(addr(&format!("127.0.0.1:{}", port)), addr("127.0.0.1:8080"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_connections_never_mix_pairs() {
    let store = Arc::new(CorrelationStore::new(1_000));
    let mut tasks = Vec::new();

    for port in 40_000u16..40_050 {
        let up = client_flow(port);
        let (tx, rx) = mpsc::unbounded_channel();
        tasks.push(tokio::spawn(run_connection(up.pair_key(), rx, store.clone())));

        tasks.push(tokio::spawn(async move {
            let request = format!("GET /client/{} HTTP/1.1\r\n\r\n", port);
            tx.send(FlowEvent::Data(up, FlowChunk::new(request.into_bytes(), Utc::now())))
                .unwrap();
            tokio::task::yield_now().await;
            let body = port.to_string();
            let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}", body.len(), body);
            tx.send(FlowEvent::Data(
                up.reverse(),
                FlowChunk::new(response.into_bytes(), Utc::now()),
            ))
            .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(store.len(), 100);
    let pairs = store.pairs();
    assert_eq!(pairs.len(), 50);
    for pair in pairs {
        assert!(pair.is_complete());
        let (_, client) = pair.pair_key.endpoints();
        let expected = format!("/client/{}", client.port());
        assert_eq!(pair.url(), Some(expected.as_str()));
        let response = pair.response.as_ref().unwrap();
        assert_eq!(response.body().as_ref(), client.port().to_string().as_bytes());
    }
}

#[tokio::test]
async fn stream_error_drops_the_partial_message() {
    let store = Arc::new(CorrelationStore::default());
    let flow = client_flow(41_000);
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_connection(flow.pair_key(), rx, store.clone()));

    tx.send(chunk(flow, b"GET /done HTTP/1.1\r\n\r\n")).unwrap();
    tx.send(chunk(flow, b"POST /partial HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc"))
        .unwrap();
    tx.send(FlowEvent::Error(flow, StreamError::DataLost { missing: 1200 }))
        .unwrap();
    drop(tx);
    task.await.unwrap();

    let messages = store.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].url(), Some("/done"));
}

/// Frame one exchange on a fresh connection; an empty request leaves a
/// response-only pair.
async fn exchange(store: &Arc<CorrelationStore>, client_port: u16, request: &'static [u8], response: &'static [u8]) {
    let up = client_flow(client_port);
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_connection(up.pair_key(), rx, store.clone()));
    if !request.is_empty() {
        tx.send(chunk(up, request)).unwrap();
    }
    tx.send(chunk(up.reverse(), response)).unwrap();
    drop(tx);
    task.await.unwrap();
}

#[tokio::test]
async fn filter_and_stats_see_framed_traffic() {
    let store = Arc::new(CorrelationStore::default());
    let ok: &'static [u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n";
    exchange(&store, 42000, b"GET /api/orders HTTP/1.1\r\n\r\n", ok).await;
    exchange(&store, 42001, b"GET /static/app.js HTTP/1.1\r\n\r\n", ok).await;
    exchange(&store, 42002, b"", ok).await;

    let stats = store.stats();
    assert_eq!(stats.messages, 5);
    assert_eq!(stats.pairs, 3);

    let filter = PairFilter {
        q: Some("API".to_string()),
        limit: None,
    };
    let matched = filter.apply(store.pairs());
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].url(), Some("/api/orders"));

    let newest = PairFilter {
        q: None,
        limit: Some(1),
    }
    .apply(store.pairs());
    assert!(newest[0].request.is_none());
}
