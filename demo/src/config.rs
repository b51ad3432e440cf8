//! Demo configuration, read from YAML.

use crate::printer::LogFormat;
use mkhook_core::{GestureConfig, Scope, SuppressionPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Scope activated at startup.
    pub scope: Scope,
    pub suppression: SuppressionPolicy,
    pub gesture: GestureConfig,
    pub log_format: LogFormat,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            scope: Scope::Global,
            suppression: SuppressionPolicy::default(),
            gesture: GestureConfig::default(),
            log_format: LogFormat::default(),
        }
    }
}

/// `<config_dir>/mkhook/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join("mkhook").join("config.yaml"))
}

pub fn parse_yaml(content: &str) -> Result<DemoConfig, ConfigError> {
    Ok(serde_yaml::from_str(content)?)
}

pub fn load_yaml(path: impl AsRef<Path>) -> Result<DemoConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_yaml(&content)
}

/// Load the config from `explicit`, else the default location, else defaults.
/// Never fails: problems are logged and defaults used.
pub fn load(explicit: Option<PathBuf>) -> DemoConfig {
    let from_cli = explicit.is_some();
    let Some(path) = explicit.or_else(default_config_path) else {
        debug!("No config directory, using defaults");
        return DemoConfig::default();
    };

    if !path.exists() {
        if from_cli {
            warn!(?path, "Config file not found, using defaults");
        } else {
            debug!(?path, "No config file, using defaults");
        }
        return DemoConfig::default();
    }

    match load_yaml(&path) {
        Ok(config) => {
            info!(?path, "Loaded config");
            config
        }
        Err(e) => {
            warn!(?path, error = %e, "Failed to load config, using defaults");
            DemoConfig::default()
        }
    }
}
