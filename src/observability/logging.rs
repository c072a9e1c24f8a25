//! # Structured Logging
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` seeded from the configured
//! level (`RUST_LOG` still wins when set), plus either a human-readable or a JSON
//! `fmt` layer. The JSON layer records the current request span so every event
//! carries its `request_id`.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Output format of log events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LogConfig {
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber; a second call keeps the first subscriber
pub fn init_logging(config: &LogConfig) {
    let installed = match config.format {
        LogFormat::Json => Registry::default()
            .with(config.filter())
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(config.filter())
            .with(fmt::layer().with_target(true))
            .try_init(),
    };

    if installed.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
        return;
    }

    info!(level = %config.level, format = ?config.format, "Structured logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_from_yaml() {
        let config: LogConfig = serde_yaml::from_str("level: debug\nformat: json\n").unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);

        let defaulted: LogConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(defaulted, LogConfig::default());
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LogConfig::default();
        init_logging(&config);
        init_logging(&config);
    }
}
