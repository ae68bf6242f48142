//! Passive HTTP Inspector
//!
//! Watches HTTP/1.x traffic on a local port without proxying it, pairs each
//! request with its response, and serves the result on a small dashboard.
//!
//! # Architecture Overview
//!
//! ```text
//!   loopback interface / pcap file
//!              │
//!              ▼
//!   ┌──────────────────────┐   capture thread (spawn_blocking)
//!   │ capture::source      │
//!   │ capture::packet      │── TcpSegment
//!   │ capture::assembler   │
//!   │ capture::reassembly  │
//!   └──────────┬───────────┘
//!              │ FlowEvent (unbounded mpsc, one per connection)
//!              ▼
//!   ┌──────────────────────┐   one tokio task per connection
//!   │ framing::Framer      │── CapturedMessage
//!   └──────────┬───────────┘
//!              ▼
//!   ┌──────────────────────┐
//!   │ store::              │   RwLock: history, pairs, open index
//!   │   CorrelationStore   │
//!   └──────────┬───────────┘
//!              │ Snapshot trait
//!              ▼
//!   ┌──────────────────────┐
//!   │ dashboard (axum)     │── browser, http-inspector-cli
//!   └──────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use http_inspector::config::{resolve_config, Overrides};
use http_inspector::lifecycle::{self, CaptureMode};
use http_inspector::observability::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "http-inspector", version, about = "Passive HTTP/1.x inspector for a local port")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP port to observe (0 = every port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Dashboard port
    #[arg(short, long)]
    dashboard: Option<u16>,

    /// Capture interface
    #[arg(short, long)]
    interface: Option<String>,

    /// Replay a pcap/pcapng file instead of capturing live
    #[arg(short, long, value_name = "FILE")]
    read: Option<PathBuf>,

    /// Messages and pairs retained
    #[arg(long)]
    max_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let overrides = Overrides {
        port: args.port,
        dashboard_port: args.dashboard,
        interface: args.interface,
        max_size: args.max_size,
    };
    let config = resolve_config(args.config.as_ref(), &overrides)?;

    init_logging(&config.observability)?;

    tracing::info!("http-inspector v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        capture_port = config.capture.port,
        interface = %config.capture.interface,
        dashboard = %config.dashboard.bind_address,
        max_size = config.store.max_size,
        "Configuration loaded"
    );

    let mode = match args.read {
        Some(path) => CaptureMode::Replay(path),
        None => CaptureMode::Live,
    };
    lifecycle::run(config, mode).await
}
