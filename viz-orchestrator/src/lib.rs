//! Viz Orchestrator - stage-by-stage reveal of a sentiment classifier's pipeline
//!
//! This crate provides:
//! - A provider abstraction over the remote `/predict` model server
//! - A normalizer that turns partial responses into a complete display model
//! - A fixed-cadence reveal scheduler with cooperative cancellation
//! - Analysis sessions that tie the two together and drop stale results
//! - A small REST bridge for browser render surfaces

pub mod api;
pub mod display;
pub mod normalizer;
pub mod provider;
pub mod scheduler;
pub mod session;
pub mod stages;

pub use display::DisplayModel;
pub use normalizer::ResultNormalizer;
pub use provider::{ConfidenceScale, HttpPredictProvider, InferenceProvider, RawInferenceResult};
pub use scheduler::{RevealPass, RevealScheduler};
pub use session::{AnalysisSession, SessionHandle, SessionSnapshot};
pub use stages::Stage;

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the viz system
#[derive(Debug, Clone, Deserialize)]
pub struct VizConfig {
    /// Model server settings
    pub endpoint: EndpointConfig,

    /// Bridge API settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Placeholder synthesis settings
    #[serde(default)]
    pub synthesis: SynthesisConfig,
}

/// Where and how to reach the model server
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Base URL; requests go to `{base_url}/predict`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound on one inference request, in seconds (required)
    pub timeout_secs: u64,

    /// Scale the server reports confidence on
    #[serde(default)]
    pub confidence_scale: ConfidenceScale,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address for the bridge API
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SynthesisConfig {
    /// Fixed seed for placeholder values; OS entropy when absent
    pub seed: Option<u64>,
}

impl VizConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: VizConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Config for `base_url` with everything else defaulted
    pub fn for_endpoint(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: EndpointConfig {
                base_url: base_url.into(),
                timeout_secs: timeout.as_secs(),
                confidence_scale: ConfidenceScale::default(),
            },
            server: ServerConfig::default(),
            synthesis: SynthesisConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "endpoint.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.endpoint.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint.base_url is empty".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.endpoint.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config = VizConfig::from_toml_str("[endpoint]\ntimeout_secs = 30\n").unwrap();
        assert_eq!(config.endpoint.base_url, "http://localhost:8000");
        assert_eq!(config.endpoint.confidence_scale, ConfidenceScale::Percent);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.synthesis.seed, None);
    }

    #[test]
    fn test_full_config() {
        let config = VizConfig::from_toml_str(
            r#"
            [endpoint]
            base_url = "http://gpu-box:9000"
            timeout_secs = 12
            confidence_scale = "fraction"

            [server]
            bind = "127.0.0.1:3000"

            [synthesis]
            seed = 42
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoint.base_url, "http://gpu-box:9000");
        assert_eq!(config.endpoint.confidence_scale, ConfidenceScale::Fraction);
        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.synthesis.seed, Some(42));
    }

    #[test]
    fn test_timeout_is_required() {
        let err = VizConfig::from_toml_str("[endpoint]\nbase_url = \"http://x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = VizConfig::from_toml_str("[endpoint]\ntimeout_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_for_endpoint() {
        let config = VizConfig::for_endpoint("http://localhost:8000", Duration::from_secs(10));
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoint.timeout_secs, 10);
    }
}
