//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, defaults for missing fields)
//!     → loader.rs Overrides (command-line values)
//!     → validation.rs (semantic checks, all errors at once)
//!     → InspectorConfig (validated, immutable)
//!     → passed by value to each subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, resolve_config, ConfigError, Overrides};
pub use schema::{
    CaptureConfig, DashboardConfig, InspectorConfig, LogFormat, ObservabilityConfig,
    ReassemblyConfig, StoreConfig,
};
pub use validation::ValidationError;
