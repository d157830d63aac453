//! Client configuration.
//!
//! All values have production defaults; a config file only needs to list
//! the endpoint URLs. Timeouts follow the split the connector protocol
//! expects: a connect timeout, a read timeout, and a much shorter timeout
//! reserved for the health probe.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::endpoint::Endpoint;

/// Configuration for a [`SproxydClient`](crate::SproxydClient).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SproxydConfig {
    /// Endpoint URLs, e.g. `http://storage-1:81/proxy/chord`.
    pub endpoints: Vec<String>,

    /// Connect timeout for object operations, in seconds.
    pub conn_timeout_secs: f64,

    /// Read/request timeout for object operations, in seconds.
    pub proxy_timeout_secs: f64,

    /// Health-check poll interval, in seconds.
    pub ping_interval_secs: f64,

    /// Health-probe timeout, in seconds. Deliberately short: a probe that
    /// cannot answer quickly is as good as down.
    pub ping_timeout_secs: f64,

    /// Maximum pooled idle connections per connector host.
    pub max_idle_per_host: usize,
}

impl Default for SproxydConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            conn_timeout_secs: 10.0,
            proxy_timeout_secs: 3.0,
            ping_interval_secs: 1.0,
            ping_timeout_secs: 1.0,
            max_idle_per_host: 32,
        }
    }
}

impl SproxydConfig {
    pub fn conn_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.conn_timeout_secs)
    }

    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.proxy_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs_f64(self.ping_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.ping_timeout_secs)
    }

    /// Check the configuration, collecting every violation.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.endpoints.is_empty() {
            errors.push("at least one endpoint is required".to_string());
        }
        for raw in &self.endpoints {
            if let Err(e) = Endpoint::parse(raw) {
                errors.push(e.to_string());
            }
        }
        for (name, value) in [
            ("conn_timeout_secs", self.conn_timeout_secs),
            ("proxy_timeout_secs", self.proxy_timeout_secs),
            ("ping_interval_secs", self.ping_interval_secs),
            ("ping_timeout_secs", self.ping_timeout_secs),
        ] {
            if !(value > 0.0) {
                errors.push(format!("{name} must be positive, got {value}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<SproxydConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: SproxydConfig = toml::from_str(&content)?;
    config.validate().map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_values() {
        let config = SproxydConfig::default();
        assert_eq!(config.conn_timeout(), Duration::from_secs(10));
        assert_eq!(config.proxy_timeout(), Duration::from_secs(3));
        assert_eq!(config.ping_interval(), Duration::from_secs(1));
        assert_eq!(config.ping_timeout(), Duration::from_secs(1));
        assert_eq!(config.max_idle_per_host, 32);
    }

    #[test]
    fn validate_collects_all_violations() {
        let config = SproxydConfig {
            endpoints: vec!["http://h:81/p?q=1".to_string()],
            conn_timeout_secs: 0.0,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn empty_endpoint_list_is_rejected() {
        let errors = SproxydConfig::default().validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("at least one endpoint"));
    }

    #[test]
    fn deserializes_from_toml() {
        let config: SproxydConfig = toml::from_str(
            r#"
            endpoints = ["http://storage-1:81/proxy/chord"]
            proxy_timeout_secs = 5.0
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.proxy_timeout(), Duration::from_secs(5));
        assert_eq!(config.conn_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }
}
