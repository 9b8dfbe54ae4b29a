//! Configuration module for converge
//!
//! Handles loading and merging configuration from multiple sources, lowest
//! precedence first:
//! - Default values
//! - System configuration (/etc/converge/converge.toml)
//! - User configuration (~/.converge.toml)
//! - Project configuration (./converge.toml)
//! - `$CONVERGE_CONFIG` or `--config`
//! - Environment variables
//!
//! Command-line flags are applied on top by the CLI.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Default settings
    pub defaults: Defaults,

    /// Colors and output settings
    pub colors: ColorsConfig,

    pub output: OutputConfig,
}

/// Default configuration values
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Defaults {
    /// Default inventory path
    pub inventory: Option<PathBuf>,

    /// Default number of forks (hosts worked on at once)
    pub forks: usize,

    /// Pause between retries for tasks that set `retries` without `delay`
    pub retry_delay_secs: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            inventory: None,
            forks: 5,
            retry_delay_secs: 1,
        }
    }
}

/// Color settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColorsConfig {
    /// Enable colors
    pub enabled: bool,

    pub ok: String,
    pub changed: String,
    pub failed: String,
    pub unreachable: String,
    pub skipped: String,
    pub diff_add: String,
    pub diff_remove: String,
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ok: "green".to_string(),
            changed: "yellow".to_string(),
            failed: "red".to_string(),
            unreachable: "bright_red".to_string(),
            skipped: "cyan".to_string(),
            diff_add: "green".to_string(),
            diff_remove: "red".to_string(),
        }
    }
}

/// Output format for run results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "human" | "text" | "default" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            other => Err(Error::config(format!("unknown output format '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut merged = serde_json::to_value(Config::default())?;

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                debug!(path = %path.display(), "Loading configuration file");
                deep_merge(&mut merged, Self::read_file(&path)?);
            } else if config_path.is_some_and(|p| p == path) {
                return Err(Error::FileNotFound(path));
            }
        }

        let mut config: Config = serde_json::from_value(merged)
            .map_err(|e| Error::config(format!("invalid configuration: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the list of configuration file paths to check, lowest precedence first
    fn get_config_paths(explicit_path: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/converge/converge.toml")];

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".converge.toml"));
        }

        paths.push(PathBuf::from("converge.toml"));

        if let Some(path) = explicit_path {
            paths.push(path.to_path_buf());
        } else if let Ok(env_config) = std::env::var("CONVERGE_CONFIG") {
            paths.push(PathBuf::from(env_config));
        }

        paths
    }

    /// Parse a file by extension into a generic tree
    fn read_file(path: &Path) -> Result<Value> {
        let content = std::fs::read_to_string(path)?;
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let value = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => {
                let table: toml::Value = toml::from_str(&content)?;
                serde_json::to_value(table)?
            }
        };

        match value {
            Value::Object(_) => Ok(value),
            Value::Null => Ok(Value::Object(Default::default())),
            _ => Err(Error::config(format!(
                "{}: top level must be a table",
                path.display()
            ))),
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(forks) = std::env::var("CONVERGE_FORKS") {
            self.defaults.forks = forks
                .parse()
                .map_err(|_| Error::config(format!("CONVERGE_FORKS: not a number: '{}'", forks)))?;
        }

        if let Ok(path) = std::env::var("CONVERGE_INVENTORY") {
            self.defaults.inventory = Some(PathBuf::from(path));
        }

        if let Ok(delay) = std::env::var("CONVERGE_RETRY_DELAY") {
            self.defaults.retry_delay_secs = delay.parse().map_err(|_| {
                Error::config(format!("CONVERGE_RETRY_DELAY: not a number: '{}'", delay))
            })?;
        }

        if std::env::var_os("NO_COLOR").is_some() || std::env::var_os("CONVERGE_NO_COLOR").is_some()
        {
            self.colors.enabled = false;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.defaults.forks == 0 {
            return Err(Error::config("forks must be at least 1"));
        }
        Ok(())
    }

    /// Get the effective inventory path
    pub fn inventory_path(&self) -> Option<&Path> {
        self.defaults.inventory.as_deref()
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.defaults.retry_delay_secs)
    }

    /// Load from a specific file only, without the standard locations
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut merged = serde_json::to_value(Config::default())?;
        deep_merge(&mut merged, Self::read_file(path.as_ref())?);
        let config: Config = serde_json::from_value(merged)
            .map_err(|e| Error::config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// Overlay `other` onto `base`: tables merge key by key, anything else replaces
fn deep_merge(base: &mut Value, other: Value) {
    match (base, other) {
        (Value::Object(base), Value::Object(other)) => {
            for (key, value) in other {
                match base.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
