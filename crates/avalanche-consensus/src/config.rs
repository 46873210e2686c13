//! Engine configuration loaded from TOML.
//!
//! ```toml
//! query_timeout_ms = 5000
//!
//! [params]
//! k = 20
//! alpha = 15
//!
//! [benchlist]
//! threshold = 10
//! max_portion = 0.5
//! ```
//!
//! Missing keys fall back to their defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::benchlist::BenchlistConfig;
use crate::bootstrapper::BootstrapConfig;
use crate::consensus::snowball::Factory;
use crate::Parameters;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything a chain's consensus engine needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deadline after which unanswered queries count as failed.
    #[serde(rename = "query_timeout_ms", with = "duration_ms")]
    pub query_timeout: Duration,
    /// How often the last accepted block is gossiped. Zero disables gossip.
    #[serde(rename = "gossip_frequency_ms", with = "duration_ms")]
    pub gossip_frequency: Duration,
    /// Peers each gossip round reaches.
    pub gossip_size: usize,
    /// Terminate polls as soon as alpha is reached or unreachable.
    pub early_termination: bool,
    /// Snowball variant deciding between siblings.
    pub factory: Factory,
    pub params: Parameters,
    pub benchlist: BenchlistConfig,
    pub bootstrap: BootstrapConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(5),
            gossip_frequency: Duration::from_secs(10),
            gossip_size: 10,
            early_termination: true,
            factory: Factory::default(),
            params: Parameters::default(),
            benchlist: BenchlistConfig::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.params
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.benchlist.validate()?;
        self.bootstrap.validate()?;
        if self.query_timeout.is_zero() {
            return Err(ConfigError::Invalid("query_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Serializes a [`Duration`] as whole milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_document() {
        let config = EngineConfig::from_toml_str(
            r#"
            query_timeout_ms = 250
            gossip_frequency_ms = 0
            factory = "flat"

            [params]
            k = 5
            alpha = 4
            beta_virtuous = 2
            beta_rogue = 3
            concurrent_repolls = 2
            max_item_processing_time = 1000

            [benchlist]
            threshold = 3
            max_portion = 0.25
            "#,
        )
        .unwrap();

        assert_eq!(config.query_timeout, Duration::from_millis(250));
        assert!(config.gossip_frequency.is_zero());
        assert_eq!(config.gossip_size, EngineConfig::default().gossip_size);
        assert_eq!(config.factory, Factory::Flat);
        assert_eq!(config.params.k, 5);
        assert_eq!(config.params.max_item_processing_time, Duration::from_secs(1));
        assert_eq!(config.params.optimal_processing, Parameters::default().optimal_processing);
        assert_eq!(config.benchlist.threshold, 3);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let err = EngineConfig::from_toml_str(
            r#"
            [params]
            k = 10
            alpha = 5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_invalid_bootstrap_rejected() {
        let err = EngineConfig::from_toml_str(
            r#"
            [bootstrap]
            frontier_sample_size = 4
            frontier_alpha = 5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("frontier_alpha")));
    }

    #[test]
    fn test_malformed_document() {
        let err = EngineConfig::from_toml_str("params = 7").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = EngineConfig::default();
        let encoded = toml::to_string(&config).unwrap();
        assert_eq!(EngineConfig::from_toml_str(&encoded).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::load("/nonexistent/engine.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
