//! Dashboard API over a real socket, fed by a replayed capture.

mod common;

use std::time::Duration;

use common::{replay, Connection, PcapBuilder, SERVER};
use serde_json::Value;

async fn captured_store() -> std::sync::Arc<http_inspector::CorrelationStore> {
    let mut pcap = PcapBuilder::default();
    let mut conn = Connection::new("127.0.0.1:51500", SERVER);
    conn.open(&mut pcap);
    conn.request(&mut pcap, b"GET /api/users HTTP/1.1\r\nHost: localhost\r\n\r\n", 1500);
    conn.response(
        &mut pcap,
        b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n[]",
        1500,
    );
    conn.request(&mut pcap, b"GET /health HTTP/1.1\r\n\r\n", 1500);
    conn.response(&mut pcap, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok", 1500);
    conn.close(&mut pcap);
    replay(pcap.bytes(), 8080).await
}

#[tokio::test]
async fn serves_captured_traffic() {
    let store = captured_store().await;
    let (addr, shutdown, server) = common::start_dashboard(store, 8080).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let page = client.get(&base).send().await.unwrap();
    assert!(page.status().is_success());
    assert!(page.text().await.unwrap().contains("8080"));

    let packets: Value = client
        .get(format!("{}/api/packets", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(packets.as_array().unwrap().len(), 4);
    assert_eq!(packets[3]["type"], "request");
    assert_eq!(packets[3]["url"], "/api/users");

    let pairs: Value = client
        .get(format!("{}/api/pairs", base))
        .query(&[("q", "users")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let pairs = pairs.as_array().unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0]["pairKey"], "127.0.0.1:8080 <-> 127.0.0.1:51500");
    assert_eq!(pairs[0]["response"]["contentType"], "application/json");

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("dashboard did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn clear_empties_every_view() {
    let store = captured_store().await;
    let (addr, shutdown, _server) = common::start_dashboard(store.clone(), 8080).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let res = client.post(format!("{}/api/clear", base)).send().await.unwrap();
    assert!(res.status().is_success());
    assert!(store.is_empty());

    let status: Value = client
        .get(format!("{}/api/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["messages"], 0);
    assert_eq!(status["pairs"], 0);

    let pairs: Value = client
        .get(format!("{}/api/pairs", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(pairs.as_array().unwrap().is_empty());

    shutdown.trigger();
}
