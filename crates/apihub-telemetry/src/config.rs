//! Logging configuration for the ingestion tools.

use std::fmt;

/// How log events are rendered on stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One flattened JSON object per event.
    #[default]
    Json,
    /// Multi-line, human-oriented output with source locations.
    Pretty,
}

impl LogFormat {
    /// Case-insensitive; `None` for anything but `json` or `pretty`.
    pub fn parse(value: &str) -> Option<Self> {
        [Self::Json, Self::Pretty]
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(value))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_SERVICE_NAME: &str = "apihub-ingest";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Subscriber settings; `RUST_LOG` overrides `log_level` when set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// An `EnvFilter` directive such as `info` or `apihub_ingest=debug`.
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::default(),
        }
    }
}

impl TelemetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn with_log_level(mut self, directive: impl Into<String>) -> Self {
        self.log_level = directive.into();
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }
}
