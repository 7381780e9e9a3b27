//! Shared configuration types for the service and its components.

pub use saferet::SecretString;
use serde::Deserialize;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: SecretString,
    pub max_connections: u32,
}

/// Log output format for the console layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub otlp_endpoint: Option<SecretString>,
    pub log_format: LogFormat,
}

/// Upstream vision API configuration.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_url: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

/// Telemetry queue configuration.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryQueueConfig {
    /// Maximum number of pending events before new ones are dropped.
    pub capacity: usize,
    /// Maximum number of events persisted concurrently.
    pub concurrency: usize,
}
