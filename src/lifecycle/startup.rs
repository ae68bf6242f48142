//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order (metrics, store, dashboard, capture)
//! - Run capture on a blocking thread
//! - Keep the dashboard serving until a shutdown signal
//!
//! # Design Decisions
//! - Fail fast: any startup error (bind, device open, pcap header) is fatal
//! - A capture failure after startup is logged; the dashboard keeps serving
//! - Replay mode keeps the dashboard up after the file is exhausted

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::capture::{
    run_capture, Assembler, AssemblerConfig, CaptureError, CaptureStats, FrameSource, LiveSource,
    PcapFileSource,
};
use crate::config::InspectorConfig;
use crate::dashboard::DashboardServer;
use crate::lifecycle::signals::shutdown_signal;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::store::CorrelationStore;

type CaptureOutcome = (Result<CaptureStats, CaptureError>, Vec<JoinHandle<()>>);

/// Where frames come from.
#[derive(Debug, Clone)]
pub enum CaptureMode {
    Live,
    Replay(PathBuf),
}

/// Run the inspector until a shutdown signal arrives.
pub async fn run(config: InspectorConfig, mode: CaptureMode) -> Result<(), Box<dyn Error>> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let store = Arc::new(CorrelationStore::new(config.store.max_size));
    let shutdown = Shutdown::new();

    let listener = TcpListener::bind(&config.dashboard.bind_address).await?;
    let local_addr = listener.local_addr()?;
    let dashboard = DashboardServer::new(config.dashboard.clone(), store.clone(), config.capture.port);
    let dashboard_task = tokio::spawn(dashboard.run(listener, shutdown.subscribe()));
    tracing::info!(dashboard = %format!("http://{}", local_addr), "Dashboard ready");

    let mut source = open_source(&config, &mode)?;
    let mut assembler = Assembler::new(
        AssemblerConfig {
            port: config.capture.port,
            max_pending_segments: config.reassembly.max_pending_segments,
            flow_idle: Duration::from_secs(config.reassembly.flow_idle_secs),
        },
        store.clone(),
        Handle::current(),
    );
    let stop = shutdown.stop_flag();
    let mut capture = tokio::task::spawn_blocking(move || {
        let result = run_capture(source.as_mut(), &mut assembler, &stop);
        (result, assembler.finish())
    });

    let finished = tokio::select! {
        _ = shutdown_signal() => None,
        outcome = &mut capture => Some(outcome?),
    };
    match finished {
        Some(outcome) => {
            finish_capture(outcome, &store).await;
            if let CaptureMode::Replay(path) = &mode {
                tracing::info!(file = %path.display(), "Replay complete; dashboard stays up until interrupted");
            }
            shutdown_signal().await;
            shutdown.trigger();
        }
        None => {
            shutdown.trigger();
            finish_capture(capture.await?, &store).await;
        }
    }

    dashboard_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn open_source(config: &InspectorConfig, mode: &CaptureMode) -> Result<Box<dyn FrameSource>, CaptureError> {
    match mode {
        CaptureMode::Live => {
            let source = LiveSource::open(
                &config.capture.interface,
                config.capture.promiscuous,
                Duration::from_millis(config.capture.read_timeout_ms),
            )?;
            tracing::info!(
                interface = %source.interface(),
                port = config.capture.port,
                "Capturing live traffic"
            );
            Ok(Box::new(source))
        }
        CaptureMode::Replay(path) => {
            let source = PcapFileSource::open(path)?;
            tracing::info!(file = %path.display(), port = config.capture.port, "Replaying capture file");
            Ok(Box::new(source))
        }
    }
}

/// Wait for the framers of the finished capture and report how it ended.
async fn finish_capture((result, framers): CaptureOutcome, store: &CorrelationStore) {
    for framer in framers {
        if let Err(e) = framer.await {
            tracing::error!(error = %e, "Framer task failed");
        }
    }
    match result {
        Ok(stats) => tracing::info!(
            frames = stats.frames,
            segments = stats.segments,
            messages = store.len(),
            pairs = store.pair_count(),
            "Capture stopped"
        ),
        Err(e) => tracing::error!(error = %e, "Capture failed; dashboard keeps serving captured traffic"),
    }
}
