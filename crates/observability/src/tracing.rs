//! Tracing/logging initialization.
//!
//! Filtering follows `RUST_LOG` when set, otherwise the configured default.

use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::TestWriter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

pub const ENV_LOG_FORMAT: &str = "FIELDCRM_LOG_FORMAT";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObservabilityError {
    #[error("invalid log format '{0}' (expected json or pretty)")]
    InvalidFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = ObservabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(ObservabilityError::InvalidFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
    pub format: LogFormat,
    /// Write through libtest's capture instead of straight to stdout.
    pub test_output: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            format: LogFormat::Json,
            test_output: false,
        }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Result<Self, ObservabilityError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ObservabilityError> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_LOG_FORMAT).filter(|v| !v.trim().is_empty()) {
            config.format = raw.parse()?;
        }
        Ok(config)
    }

    /// Human-readable output captured per test; `RUST_LOG` still overrides
    /// the `warn` default.
    pub fn for_tests() -> Self {
        Self {
            default_filter: "warn".to_string(),
            format: LogFormat::Pretty,
            test_output: true,
        }
    }

    pub fn json(&self) -> bool {
        self.format == LogFormat::Json
    }
}

/// Initialize tracing/logging for the process with JSON output.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    init_with(&ObservabilityConfig::default());
}

pub fn init_with(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let writer = if config.test_output {
        BoxMakeWriter::new(TestWriter::new())
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let _ = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_defaults_to_json() {
        let config = ObservabilityConfig::from_lookup(|_| None).unwrap();
        assert!(config.json());
        assert_eq!(config.default_filter, "info");
    }

    #[test]
    fn reads_format_from_env() {
        let config = ObservabilityConfig::from_lookup(|key: &str| {
            (key == ENV_LOG_FORMAT).then(|| "Pretty".to_string())
        })
        .unwrap();
        assert_eq!(config.format, LogFormat::Pretty);

        let err = ObservabilityConfig::from_lookup(|_: &str| Some("xml".to_string())).unwrap_err();
        assert_eq!(err, ObservabilityError::InvalidFormat("xml".to_string()));
    }

    #[test]
    fn deserializes_partial_config() {
        let config: ObservabilityConfig = serde_json::from_str(r#"{"format": "pretty"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.default_filter, "info");
        assert!(!config.test_output);
    }

    #[test]
    fn test_config_is_captured_and_quiet() {
        let config = ObservabilityConfig::for_tests();
        assert!(config.test_output);
        assert_eq!(config.default_filter, "warn");
        assert!(!config.json());
    }

    #[test]
    fn init_twice_is_harmless() {
        init();
        init_with(&ObservabilityConfig::for_tests());
        ::tracing::info!("still logging");
    }
}
