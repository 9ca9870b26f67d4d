//! Runtime configuration for the inventory services.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const ENV_TRANSFER_TTL_SECS: &str = "FIELDCRM_TRANSFER_TTL_SECS";
pub const ENV_RETRY_ON_CONFLICT: &str = "FIELDCRM_RETRY_ON_CONFLICT";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Pending transfers expire after this many seconds. `None` = never.
    pub transfer_ttl_secs: Option<u64>,
    /// Re-run a mutation once after losing an optimistic concurrency race.
    pub retry_on_conflict: bool,
    pub database_url: Option<String>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            transfer_ttl_secs: None,
            retry_on_conflict: true,
            database_url: None,
        }
    }
}

impl InventoryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_TRANSFER_TTL_SECS).filter(|v| !v.trim().is_empty()) {
            let secs: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                key: ENV_TRANSFER_TTL_SECS,
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    key: ENV_TRANSFER_TTL_SECS,
                    value: raw,
                    reason: "must be greater than zero".to_string(),
                });
            }
            config.transfer_ttl_secs = Some(secs);
        }

        if let Some(raw) = lookup(ENV_RETRY_ON_CONFLICT) {
            config.retry_on_conflict = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: ENV_RETRY_ON_CONFLICT,
                        value: raw,
                        reason: "expected a boolean".to_string(),
                    });
                }
            };
        }

        config.database_url = lookup(ENV_DATABASE_URL).filter(|v| !v.trim().is_empty());
        Ok(config)
    }

    pub fn transfer_ttl(&self) -> Option<Duration> {
        self.transfer_ttl_secs.map(Duration::from_secs)
    }

    pub fn with_transfer_ttl(mut self, ttl: Duration) -> Self {
        self.transfer_ttl_secs = Some(ttl.as_secs());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = InventoryConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, InventoryConfig::default());
        assert!(config.retry_on_conflict);
        assert_eq!(config.transfer_ttl(), None);
    }

    #[test]
    fn reads_all_keys() {
        let config = InventoryConfig::from_lookup(lookup(&[
            (ENV_TRANSFER_TTL_SECS, "3600"),
            (ENV_RETRY_ON_CONFLICT, "off"),
            (ENV_DATABASE_URL, "postgres://localhost/fieldcrm"),
        ]))
        .unwrap();

        assert_eq!(config.transfer_ttl(), Some(Duration::from_secs(3600)));
        assert!(!config.retry_on_conflict);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/fieldcrm"));
    }

    #[test]
    fn rejects_malformed_values() {
        let err = InventoryConfig::from_lookup(lookup(&[(ENV_TRANSFER_TTL_SECS, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_TRANSFER_TTL_SECS, .. }));

        assert!(InventoryConfig::from_lookup(lookup(&[(ENV_TRANSFER_TTL_SECS, "0")])).is_err());
        assert!(InventoryConfig::from_lookup(lookup(&[(ENV_RETRY_ON_CONFLICT, "maybe")])).is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: InventoryConfig = serde_json::from_str(r#"{"transfer_ttl_secs": 60}"#).unwrap();
        assert_eq!(config.transfer_ttl_secs, Some(60));
        assert!(config.retry_on_conflict);
    }
}
