//! Configuration loading for sl-core.
//!
//! Wraps sl-config resolution with loading and semantic validation, and
//! records where the effective configuration came from.

pub use sl_config::{
    AnalyticsConfig, ConfigPaths, ConfigSnapshot, ConfigSource, ValidationError,
};

use sl_config::{resolve_config, validate_config};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::logging::event_names;

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },

    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationError),
}

impl From<&ConfigError> for sl_common::Error {
    fn from(err: &ConfigError) -> Self {
        match err {
            ConfigError::Invalid(ValidationError::VersionMismatch { .. }) => {
                sl_common::Error::SchemaValidation(err.to_string())
            }
            ConfigError::NotFound { .. } => sl_common::Error::Config(err.to_string()),
            _ => sl_common::Error::InvalidConfig(err.to_string()),
        }
    }
}

impl From<ConfigError> for sl_common::Error {
    fn from(err: ConfigError) -> Self {
        sl_common::Error::from(&err)
    }
}

/// Effective configuration with provenance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: AnalyticsConfig,
    pub paths: ConfigPaths,
}

impl ResolvedConfig {
    pub fn defaults() -> Self {
        ResolvedConfig {
            config: AnalyticsConfig::default(),
            paths: ConfigPaths::default(),
        }
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot::new(&self.config, &self.paths)
    }

    pub fn is_default(&self) -> bool {
        self.paths.analytics.is_none()
    }
}

/// Resolve, load and validate the analytics configuration.
///
/// An explicit path that does not exist is an error; otherwise the usual
/// lookup order applies and falls back to built-in defaults.
pub fn load_config(cli_path: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
    if let Some(path) = cli_path {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
    }

    let paths = resolve_config(cli_path);
    let Some(path) = paths.analytics.clone() else {
        tracing::debug!(
            target: event_names::CONFIG_DEFAULT_USED,
            message = "no analytics config found; using built-in defaults",
        );
        return Ok(ResolvedConfig::defaults());
    };

    let config = AnalyticsConfig::from_file(&path).map_err(|source| ConfigError::Load {
        path: path.clone(),
        source,
    })?;
    validate_config(&config)?;

    tracing::debug!(
        target: event_names::CONFIG_LOADED,
        path = %path.display(),
        source = %paths.source,
        message = "analytics config loaded",
    );
    Ok(ResolvedConfig { config, paths })
}
