//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use pnet::packet::ethernet::{EtherTypes, MutableEthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, MutableIpv4Packet};
use pnet::packet::ipv6::MutableIpv6Packet;
use pnet::packet::tcp::{MutableTcpPacket, TcpFlags};
use pnet::util::MacAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use http_inspector::capture::{run_capture, Assembler, AssemblerConfig, PcapFileSource};
use http_inspector::config::DashboardConfig;
use http_inspector::dashboard::DashboardServer;
use http_inspector::lifecycle::Shutdown;
use http_inspector::store::CorrelationStore;

pub const SERVER: &str = "127.0.0.1:8080";

pub fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

/// Ethernet frame carrying one TCP segment, as a loopback device reports it.
pub fn tcp_frame(src: SocketAddr, dst: SocketAddr, seq: u32, flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut tcp_buf = vec![0u8; 20 + payload.len()];
    {
        let mut tcp = MutableTcpPacket::new(&mut tcp_buf).unwrap();
        tcp.set_source(src.port());
        tcp.set_destination(dst.port());
        tcp.set_sequence(seq);
        tcp.set_data_offset(5);
        tcp.set_flags(flags);
        tcp.set_window(65535);
        tcp.set_payload(payload);
    }

    let (ethertype, ip_buf) = match (src.ip(), dst.ip()) {
        (IpAddr::V4(s), IpAddr::V4(d)) => {
            let mut buf = vec![0u8; 20 + tcp_buf.len()];
            {
                let mut ip = MutableIpv4Packet::new(&mut buf).unwrap();
                ip.set_version(4);
                ip.set_header_length(5);
                ip.set_total_length((20 + tcp_buf.len()) as u16);
                ip.set_ttl(64);
                ip.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
                ip.set_source(s);
                ip.set_destination(d);
                ip.set_payload(&tcp_buf);
                let checksum = ipv4::checksum(&ip.to_immutable());
                ip.set_checksum(checksum);
            }
            (EtherTypes::Ipv4, buf)
        }
        (IpAddr::V6(s), IpAddr::V6(d)) => {
            let mut buf = vec![0u8; 40 + tcp_buf.len()];
            {
                let mut ip = MutableIpv6Packet::new(&mut buf).unwrap();
                ip.set_version(6);
                ip.set_payload_length(tcp_buf.len() as u16);
                ip.set_next_header(IpNextHeaderProtocols::Tcp);
                ip.set_hop_limit(64);
                ip.set_source(s);
                ip.set_destination(d);
                ip.set_payload(&tcp_buf);
            }
            (EtherTypes::Ipv6, buf)
        }
        _ => panic!("mixed address families"),
    };

    let mut frame = vec![0u8; 14 + ip_buf.len()];
    {
        let mut eth = MutableEthernetPacket::new(&mut frame).unwrap();
        eth.set_source(MacAddr::zero());
        eth.set_destination(MacAddr::zero());
        eth.set_ethertype(ethertype);
        eth.set_payload(&ip_buf);
    }
    frame
}

/// Legacy pcap (microsecond, Ethernet) writer.
#[derive(Default)]
pub struct PcapBuilder {
    frames: Vec<Vec<u8>>,
}

impl PcapBuilder {
    pub fn push(&mut self, frame: Vec<u8>) -> &mut Self {
        self.frames.push(frame);
        self
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&65535u32.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        for (i, frame) in self.frames.iter().enumerate() {
            out.extend_from_slice(&1_700_000_000u32.to_le_bytes());
            out.extend_from_slice(&(i as u32 * 1000).to_le_bytes());
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(frame);
        }
        out
    }
}

/// One TCP connection between a client and a server, tracking sequence numbers.
pub struct Connection {
    pub client: SocketAddr,
    pub server: SocketAddr,
    client_seq: u32,
    server_seq: u32,
}

impl Connection {
    pub fn new(client: &str, server: &str) -> Self {
        Self {
            client: addr(client),
            server: addr(server),
            client_seq: 1_000,
            server_seq: 50_000,
        }
    }

    /// SYN and SYN-ACK.
    pub fn open(&mut self, pcap: &mut PcapBuilder) {
        pcap.push(tcp_frame(self.client, self.server, self.client_seq, TcpFlags::SYN, b""));
        pcap.push(tcp_frame(
            self.server,
            self.client,
            self.server_seq,
            TcpFlags::SYN | TcpFlags::ACK,
            b"",
        ));
        self.client_seq += 1;
        self.server_seq += 1;
    }

    /// Client data, optionally split into segments of `segment` bytes.
    pub fn request(&mut self, pcap: &mut PcapBuilder, data: &[u8], segment: usize) {
        for chunk in data.chunks(segment) {
            pcap.push(tcp_frame(
                self.client,
                self.server,
                self.client_seq,
                TcpFlags::PSH | TcpFlags::ACK,
                chunk,
            ));
            self.client_seq += chunk.len() as u32;
        }
    }

    /// Server data, optionally split into segments of `segment` bytes.
    pub fn response(&mut self, pcap: &mut PcapBuilder, data: &[u8], segment: usize) {
        for chunk in data.chunks(segment) {
            pcap.push(tcp_frame(
                self.server,
                self.client,
                self.server_seq,
                TcpFlags::PSH | TcpFlags::ACK,
                chunk,
            ));
            self.server_seq += chunk.len() as u32;
        }
    }

    /// FIN from the server, then from the client.
    pub fn close(&mut self, pcap: &mut PcapBuilder) {
        pcap.push(tcp_frame(
            self.server,
            self.client,
            self.server_seq,
            TcpFlags::FIN | TcpFlags::ACK,
            b"",
        ));
        pcap.push(tcp_frame(
            self.client,
            self.server,
            self.client_seq,
            TcpFlags::FIN | TcpFlags::ACK,
            b"",
        ));
    }
}

/// Replay a capture into a fresh store and wait for every framer.
pub async fn replay(pcap: Vec<u8>, port: u16) -> Arc<CorrelationStore> {
    let store = Arc::new(CorrelationStore::new(100));
    let mut source = PcapFileSource::from_reader(std::io::Cursor::new(pcap)).unwrap();
    let mut assembler = Assembler::new(
        AssemblerConfig {
            port,
            max_pending_segments: 64,
            flow_idle: std::time::Duration::from_secs(300),
        },
        store.clone(),
        tokio::runtime::Handle::current(),
    );
    let stop = std::sync::atomic::AtomicBool::new(false);
    run_capture(&mut source, &mut assembler, &stop).unwrap();
    for task in assembler.finish() {
        task.await.unwrap();
    }
    store
}

/// Serve a dashboard over `store` on an ephemeral port.
pub async fn start_dashboard(
    store: Arc<CorrelationStore>,
    capture_port: u16,
) -> (SocketAddr, Shutdown, JoinHandle<std::io::Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = DashboardServer::new(DashboardConfig::default(), store, capture_port);
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));
    (addr, shutdown, handle)
}
