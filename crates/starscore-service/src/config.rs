//! Configuration for starscore-service.

use std::fs;

use chrono::TimeDelta;
use figment::{Figment, providers::Env};
use serde::Deserialize;
use starscore_core::config::{
    DatabaseConfig, LogFormat, ObservabilityConfig, SecretString, TelemetryQueueConfig,
    VisionConfig,
};

/// Keys that may also be read from the file named by `<KEY>_FILE`.
const FILE_BACKED_KEYS: &[&str] = &["database_url", "otel_exporter_endpoint", "vision_api_key"];

/// Configuration for starscore-service, read from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database connection URL.
    pub database_url: SecretString,

    /// Maximum number of database connections.
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    /// OTEL exporter endpoint (optional).
    pub otel_exporter_endpoint: Option<SecretString>,

    /// Console log format: `pretty` or `json`.
    #[serde(default)]
    pub log_format: LogFormat,

    /// Chat-completions endpoint of the vision API.
    #[serde(default = "default_vision_api_url")]
    pub vision_api_url: String,

    /// Vision model identifier.
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    /// Vision API key. Recognition is unavailable without it.
    pub vision_api_key: Option<SecretString>,

    /// Timeout for one vision API call, in seconds.
    #[serde(default = "default_vision_timeout")]
    pub vision_timeout_secs: u64,

    /// Pending telemetry events kept before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub telemetry_queue_capacity: usize,

    /// Telemetry events persisted concurrently.
    #[serde(default = "default_concurrency")]
    pub telemetry_concurrency: usize,

    /// Geolocation cache entries; 0 disables eviction.
    #[serde(default = "default_geo_cache_capacity")]
    pub geo_cache_capacity: usize,

    /// How long an access event is reused for the same session and address.
    /// Unset means no time bound.
    pub session_window_secs: Option<u64>,

    /// Largest request body accepted by the recognize route, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Server host address.
    #[serde(default = "default_host")]
    pub server_host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub server_port: u16,
}

fn default_max_connections() -> u32 {
    10
}

fn default_vision_api_url() -> String {
    "https://api.siliconflow.cn/v1/chat/completions".to_string()
}

fn default_vision_model() -> String {
    "Qwen/Qwen2.5-VL-32B-Instruct".to_string()
}

fn default_vision_timeout() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_concurrency() -> usize {
    8
}

fn default_geo_cache_capacity() -> usize {
    10_000
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Reads the configuration from environment variables.
    ///
    /// Secrets may be given directly or as a path in `<KEY>_FILE`; the direct
    /// variable wins when both are set.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, a value has the
    /// wrong type, or a secret file cannot be read.
    pub fn from_env() -> Result<Self, figment::Error> {
        let mut figment = Figment::new().merge(Env::raw());
        for key in FILE_BACKED_KEYS {
            if figment.contains(key) {
                continue;
            }
            let file_key = format!("{key}_file");
            let Ok(path) = figment.extract_inner::<String>(&file_key) else {
                continue;
            };
            let contents = fs::read_to_string(&path).map_err(|e| {
                figment::Error::from(format!(
                    "failed to read {} from '{path}': {e}",
                    file_key.to_uppercase()
                ))
            })?;
            figment = figment.merge((*key, contents.trim().to_string()));
        }
        figment.extract()
    }

    /// Returns the database configuration.
    #[must_use]
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.database_url.clone(),
            max_connections: self.database_max_connections,
        }
    }

    /// Returns the observability configuration.
    #[must_use]
    pub fn observability_config(&self) -> ObservabilityConfig {
        ObservabilityConfig {
            otlp_endpoint: self.otel_exporter_endpoint.clone(),
            log_format: self.log_format,
        }
    }

    /// Returns the vision API configuration. A blank key counts as unset.
    #[must_use]
    pub fn vision_config(&self) -> VisionConfig {
        VisionConfig {
            api_url: self.vision_api_url.clone(),
            model: self.vision_model.clone(),
            api_key: self
                .vision_api_key
                .clone()
                .filter(|key| !key.expose().trim().is_empty()),
            timeout_secs: self.vision_timeout_secs,
        }
    }

    /// Returns the telemetry queue configuration.
    #[must_use]
    pub fn telemetry_queue_config(&self) -> TelemetryQueueConfig {
        TelemetryQueueConfig {
            capacity: self.telemetry_queue_capacity.max(1),
            concurrency: self.telemetry_concurrency.max(1),
        }
    }

    /// Returns the access-event reuse window, if one is configured.
    #[must_use]
    pub fn session_window(&self) -> Option<TimeDelta> {
        self.session_window_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(TimeDelta::try_seconds)
    }

    /// Returns the server address.
    #[must_use]
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn defaults_apply() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("DATABASE_URL", "postgres://localhost/starscore");

            let config = Config::from_env()?;
            assert_eq!(config.database_url.expose(), "postgres://localhost/starscore");
            assert_eq!(config.database_max_connections, 10);
            assert_eq!(config.server_addr(), "0.0.0.0:3000");
            assert_eq!(config.log_format, LogFormat::Pretty);
            assert!(config.vision_config().api_key.is_none());
            assert!(config.session_window().is_none());
            assert_eq!(config.telemetry_queue_config().capacity, 1024);
            assert_eq!(config.max_body_bytes, 16 * 1024 * 1024);
            Ok(())
        });
    }

    #[test]
    fn overrides_from_environment() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("DATABASE_URL", "postgres://db/starscore");
            jail.set_env("SERVER_PORT", "8088");
            jail.set_env("LOG_FORMAT", "json");
            jail.set_env("VISION_API_KEY", "sk-test");
            jail.set_env("SESSION_WINDOW_SECS", "1800");
            jail.set_env("TELEMETRY_CONCURRENCY", "0");

            let config = Config::from_env()?;
            assert_eq!(config.server_port, 8088);
            assert_eq!(config.log_format, LogFormat::Json);
            assert_eq!(
                config.vision_config().api_key.map(|k| k.expose().to_string()),
                Some("sk-test".to_string())
            );
            assert_eq!(config.session_window(), TimeDelta::try_seconds(1800));
            assert_eq!(config.telemetry_queue_config().concurrency, 1);
            Ok(())
        });
    }

    #[test]
    fn blank_api_key_is_unset() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("DATABASE_URL", "postgres://db/starscore");
            jail.set_env("VISION_API_KEY", " ");

            let config = Config::from_env()?;
            assert!(config.vision_config().api_key.is_none());
            Ok(())
        });
    }

    #[test]
    fn secrets_can_come_from_files() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("database-url", "postgres://file/starscore\n")?;
            jail.create_file("vision-key", "sk-from-file\n")?;
            jail.set_env("DATABASE_URL_FILE", "database-url");
            jail.set_env("VISION_API_KEY_FILE", "vision-key");

            let config = Config::from_env()?;
            assert_eq!(config.database_url.expose(), "postgres://file/starscore");
            assert_eq!(
                config.vision_config().api_key.map(|k| k.expose().to_string()),
                Some("sk-from-file".to_string())
            );
            assert!(config.otel_exporter_endpoint.is_none());
            Ok(())
        });
    }

    #[test]
    fn direct_variable_wins_over_file() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("database-url", "postgres://file/starscore")?;
            jail.set_env("DATABASE_URL", "postgres://env/starscore");
            jail.set_env("DATABASE_URL_FILE", "database-url");

            let config = Config::from_env()?;
            assert_eq!(config.database_url.expose(), "postgres://env/starscore");
            Ok(())
        });
    }

    #[test]
    fn unreadable_secret_file_fails() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("DATABASE_URL_FILE", "does-not-exist");
            assert!(Config::from_env().is_err());
            Ok(())
        });
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("DATABASE_URL", "postgres://user:hunter2@db/starscore");

            let config = Config::from_env()?;
            assert!(!format!("{config:?}").contains("hunter2"));
            Ok(())
        });
    }

    #[test]
    fn missing_database_url_fails() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            assert!(Config::from_env().is_err());
            Ok(())
        });
    }
}
