//! Dashboard server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request timeout)
//! - Bind server to listener
//! - Stop gracefully on the shutdown broadcast

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::DashboardConfig;
use crate::dashboard::handlers::*;
use crate::store::Snapshot;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub snapshot: Arc<dyn Snapshot>,
    pub capture_port: u16,
    pub refresh_secs: u64,
}

/// HTTP server for the dashboard and its JSON API.
pub struct DashboardServer {
    router: Router,
    config: DashboardConfig,
}

impl DashboardServer {
    /// Create a dashboard over `snapshot` for traffic on `capture_port`.
    pub fn new(config: DashboardConfig, snapshot: Arc<dyn Snapshot>, capture_port: u16) -> Self {
        let state = AppState {
            snapshot,
            capture_port,
            refresh_secs: config.refresh_secs,
        };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &DashboardConfig, state: AppState) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/api/packets", get(get_packets))
            .route("/api/pairs", get(get_pairs))
            .route("/api/status", get(get_status))
            .route("/api/clear", post(post_clear))
            .route("/clear", get(get_clear))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs))),
            )
    }

    /// The router, for serving on a custom listener or in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Run the server until a shutdown signal is broadcast.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "Dashboard listening"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Dashboard stopped");
        Ok(())
    }
}
