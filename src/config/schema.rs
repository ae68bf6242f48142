//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the inspector.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the inspector.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct InspectorConfig {
    /// What to capture and from where.
    pub capture: CaptureConfig,

    /// TCP reassembly limits.
    pub reassembly: ReassemblyConfig,

    /// Correlation store capacity.
    pub store: StoreConfig,

    /// Dashboard listener and UI settings.
    pub dashboard: DashboardConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Capture configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// TCP port to observe; 0 observes every port.
    pub port: u16,

    /// Interface to capture on.
    pub interface: String,

    /// Put the interface in promiscuous mode.
    pub promiscuous: bool,

    /// Read timeout of the capture device, in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            interface: default_loopback().to_string(),
            promiscuous: true,
            read_timeout_ms: 100,
        }
    }
}

/// Name of the loopback interface on this platform.
pub fn default_loopback() -> &'static str {
    if cfg!(target_os = "linux") {
        "lo"
    } else {
        "lo0"
    }
}

/// Reassembly configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReassemblyConfig {
    /// Out-of-order segments held per flow before giving up on a gap.
    pub max_pending_segments: usize,

    /// Seconds without traffic before a flow is closed.
    pub flow_idle_secs: u64,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            max_pending_segments: 1024,
            flow_idle_secs: 300,
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Messages and pairs retained (each).
    pub max_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_size: crate::store::DEFAULT_MAX_SIZE,
        }
    }
}

/// Dashboard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Bind address (e.g., "127.0.0.1:4040").
    pub bind_address: String,

    /// Page refresh interval in seconds.
    pub refresh_secs: u64,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:4040".to_string(),
            refresh_secs: 3,
            request_timeout_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
