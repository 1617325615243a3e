//! Logging infrastructure for the API Hub ingestion tools.
//!
//! This crate provides:
//! - Structured JSON logging for production, pretty output for development
//! - Standard event names and `log_*!` macros for ingestion milestones
//!
//! # Usage
//!
//! ```ignore
//! use apihub_telemetry::{LogFormat, TelemetryConfig};
//!
//! let config = TelemetryConfig::new()
//!     .with_log_level("debug")
//!     .with_log_format(LogFormat::Pretty);
//!
//! apihub_telemetry::init(&config)?;
//! ```

pub mod config;
pub mod logging;

pub use config::{LogFormat, TelemetryConfig};
pub use logging::events;

use thiserror::Error;

/// Telemetry errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
}

/// Install the global subscriber described by `config`.
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    logging::init_logging(config)?;
    tracing::debug!(
        service = %config.service_name,
        log_level = %config.log_level,
        "logging initialized"
    );
    Ok(())
}
