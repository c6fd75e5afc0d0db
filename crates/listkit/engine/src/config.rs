//! Engine configuration

use std::path::Path;

use listkit_access::AccessDefaults;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Engine configuration.
///
/// Every section is optional in the TOML source; omitted values take their
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fallback access for undeclared rules
    pub access: AccessConfig,

    /// Read limits
    pub query_limits: QueryLimitsConfig,

    /// Write limits
    pub mutations: MutationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Used when a list declares no rule for an operation (default: true)
    pub default_list_access: bool,

    /// Used when a field declares no rule for an operation (default: true)
    pub default_field_access: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            default_list_access: true,
            default_field_access: true,
        }
    }
}

impl From<AccessConfig> for AccessDefaults {
    fn from(config: AccessConfig) -> Self {
        AccessDefaults {
            list: config.default_list_access,
            field: config.default_field_access,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLimitsConfig {
    /// Upper bound on items returned by one list query. Lists may set a
    /// stricter bound of their own.
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Upper bound on items in one batch mutation
    pub max_batch_size: Option<usize>,
}

impl EngineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Self::from_toml_str(&contents)
        } else {
            Ok(Self::default())
        }
    }

    pub fn access_defaults(&self) -> AccessDefaults {
        self.access.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.access.default_list_access);
        assert!(config.access.default_field_access);
        assert!(config.query_limits.max_results.is_none());
        assert!(config.mutations.max_batch_size.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            [access]
            default_list_access = false

            [query_limits]
            max_results = 50
            "#,
        )
        .unwrap();

        assert!(!config.access.default_list_access);
        assert!(config.access.default_field_access);
        assert_eq!(config.query_limits.max_results, Some(50));
        assert_eq!(config.mutations, MutationConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        let err = EngineConfig::from_toml_str("[mutations]\nmax_batch_size = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_config() {
        let config = EngineConfig::load("/nonexistent/path/listkit.toml").unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
