//! Runtime configuration.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. `TRIFORM_*` environment variables
//!
//! ```toml
//! capabilities = "fs:read,net:*"
//! format = "jsonl"
//! timeout_ms = 30000
//! max_result_items = 500
//! ```

use crate::router::OutputFormat;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use triform_core::{ENV_PREFIX, SessionId};
use triform_policy::{AllowList, PolicyError};

/// Configuration load error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A source could not be read or extracted
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    /// `capabilities` is not a valid allow-list
    #[error("invalid capability allow-list: {0}")]
    AllowList(#[from] PolicyError),
}

/// Runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Explicit caller identity (`TRIFORM_CALLER`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
    /// Comma separated allow-list; absent disables the policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<String>,
    /// Output format override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    /// Default deadline in milliseconds; 0 means none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Cut array results to this many items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_result_items: Option<usize>,
    /// Session id echoed in every envelope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Environment keys read after the prefix is stripped
const ENV_KEYS: &[&str] = &[
    "caller",
    "capabilities",
    "format",
    "timeout_ms",
    "max_result_items",
    "session_id",
];

impl RuntimeConfig {
    /// Layered figment for an optional config file
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).only(ENV_KEYS))
    }

    /// Load from defaults, an optional file and the environment
    ///
    /// # Errors
    ///
    /// Returns error if a source is malformed
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::extract(Self::figment(path))
    }

    /// Extract from a prepared figment
    ///
    /// # Errors
    ///
    /// Returns error if extraction fails
    pub fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(Box::new)?;
        // Catch a bad allow-list at startup rather than on the first call
        config.allow_list()?;
        Ok(config)
    }

    /// Parsed allow-list; `None` means the policy is disabled
    ///
    /// # Errors
    ///
    /// Returns the first invalid entry
    pub fn allow_list(&self) -> Result<Option<AllowList>, PolicyError> {
        self.capabilities
            .as_deref()
            .map(AllowList::parse)
            .transpose()
    }

    /// Default deadline
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Session id, when configured
    #[must_use]
    pub fn session(&self) -> Option<SessionId> {
        self.session_id.as_deref().and_then(SessionId::from_caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::extract(Figment::from(Serialized::defaults(
            RuntimeConfig::default(),
        )))
        .unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.allow_list().unwrap(), None);
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_toml_file_layer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "capabilities = \"fs:read,net:*\"\nformat = \"jsonl\"\ntimeout_ms = 250\nmax_result_items = 3"
        )
        .unwrap();
        let figment = Figment::new()
            .merge(Serialized::defaults(RuntimeConfig::default()))
            .merge(Toml::file(file.path()));
        let config = RuntimeConfig::extract(figment).unwrap();
        assert_eq!(config.format, Some(OutputFormat::Jsonl));
        assert_eq!(config.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.max_result_items, Some(3));
        assert_eq!(config.allow_list().unwrap().unwrap().len(), 2);
    }

    #[test]
    fn test_later_layer_wins() {
        let figment = Figment::new()
            .merge(Toml::string("format = \"plain\"\ntimeout_ms = 10"))
            .merge(Serialized::default("format", "json"));
        let config = RuntimeConfig::extract(figment).unwrap();
        assert_eq!(config.format, Some(OutputFormat::Json));
        assert_eq!(config.timeout_ms, Some(10));
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let config = RuntimeConfig {
            timeout_ms: Some(0),
            ..RuntimeConfig::default()
        };
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_bad_allow_list_rejected() {
        let figment = Figment::new().merge(Toml::string("capabilities = \"fs:read,oops\""));
        assert!(matches!(
            RuntimeConfig::extract(figment),
            Err(ConfigError::AllowList(_))
        ));
    }

    #[test]
    fn test_core_env_names_are_read() {
        use triform_core::{ENV_CALLER, ENV_CAPABILITIES, ENV_FORMAT};
        for var in [ENV_CALLER, ENV_CAPABILITIES, ENV_FORMAT] {
            let key = var.strip_prefix(ENV_PREFIX).unwrap().to_ascii_lowercase();
            assert!(ENV_KEYS.contains(&key.as_str()), "{var} not read");
        }
    }

    #[test]
    fn test_empty_allow_list_is_not_disabled() {
        let config = RuntimeConfig {
            capabilities: Some(String::new()),
            ..RuntimeConfig::default()
        };
        assert!(config.allow_list().unwrap().unwrap().is_empty());
    }
}
