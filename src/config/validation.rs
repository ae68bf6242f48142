//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes > 0, intervals > 0)
//! - Validate addresses parse as socket addresses
//! - Detect the dashboard listening on the captured port
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: InspectorConfig → Result<(), Vec<ValidationError>>
//! - Runs after CLI overrides, before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::InspectorConfig;

/// One semantic problem with a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("{field} is not a socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("capture.interface must not be empty")]
    EmptyInterface,

    #[error("dashboard port {0} is the captured port")]
    DashboardOnCapturePort(u16),
}

/// Check every semantic constraint, collecting all failures.
pub fn validate_config(config: &InspectorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.store.max_size == 0 {
        errors.push(ValidationError::MustBePositive {
            field: "store.max_size",
        });
    }
    if config.dashboard.refresh_secs == 0 {
        errors.push(ValidationError::MustBePositive {
            field: "dashboard.refresh_secs",
        });
    }
    if config.dashboard.request_timeout_secs == 0 {
        errors.push(ValidationError::MustBePositive {
            field: "dashboard.request_timeout_secs",
        });
    }
    if config.reassembly.max_pending_segments == 0 {
        errors.push(ValidationError::MustBePositive {
            field: "reassembly.max_pending_segments",
        });
    }
    if config.capture.read_timeout_ms == 0 {
        errors.push(ValidationError::MustBePositive {
            field: "capture.read_timeout_ms",
        });
    }
    if config.capture.interface.trim().is_empty() {
        errors.push(ValidationError::EmptyInterface);
    }

    match config.dashboard.bind_address.parse::<SocketAddr>() {
        Ok(addr) if config.capture.port != 0 && addr.port() == config.capture.port => {
            errors.push(ValidationError::DashboardOnCapturePort(addr.port()));
        }
        Ok(_) => {}
        Err(_) => errors.push(ValidationError::InvalidAddress {
            field: "dashboard.bind_address",
            value: config.dashboard.bind_address.clone(),
        }),
    }
    if config.observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
