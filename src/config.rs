//! Configuration management for scenarun.
//!
//! Handles loading defaults for the CLI from TOML files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::book::parse_duration;
use crate::error::{Error, Result};

/// Name of the project-local config file.
pub const LOCAL_CONFIG_FILE: &str = "scenarun.toml";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run settings
    pub run: RunConfig,

    /// Report settings
    pub output: OutputConfig,
}

/// Run settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Stop the batch at the first failing scenario
    pub fail_fast: bool,

    /// Print step progress
    pub debug: bool,

    /// Delay between steps (e.g. "500ms"), overriding books
    pub interval: Option<String>,
}

/// Report settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Report format
    pub format: OutputFormat,

    /// Skip the failure listing in text reports
    pub verbose: bool,
}

/// Report format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(Error::config(format!("unknown output format: {other}"))),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// Looks for config in:
    /// 1. `scenarun.toml` in current directory
    /// 2. `~/.config/scenarun/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(config_dir) = Self::config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("scenarun"))
    }

    /// Configured inter-step delay, if any.
    pub fn interval(&self) -> Result<Option<Duration>> {
        self.run.interval.as_deref().map(parse_duration).transpose()
    }
}
