//! Configuration management for unused
//!
//! This module provides the optional config file holding the accounts to
//! inventory, output preferences and exporter settings. Command-line flags
//! are layered on top by the binaries.

use crate::disks::SortKey;
use crate::error::{Error, Result};
use crate::provider::ProvidersConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// unused configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Accounts to inventory
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Table/CSV output options
    #[serde(default)]
    pub output: OutputConfig,
    /// Prometheus exporter options
    #[serde(default)]
    pub exporter: ExporterConfig,
}

/// Output configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Show all metadata in a META column
    #[serde(default)]
    pub verbose: bool,
    /// Metadata keys shown as extra columns
    #[serde(default)]
    pub extra_columns: Vec<String>,
    /// Sort key: "provider", "name" or "created"
    #[serde(default)]
    pub sort: SortKey,
}

/// Exporter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Listen address
    #[serde(default = "default_address")]
    pub address: String,
    /// Path serving the metrics
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    /// Seconds between polls
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Per-poll deadline in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_interval_secs() -> u64 {
    300 // 5 minutes
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            metrics_path: default_metrics_path(),
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ExporterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reject settings the exporter cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(Error::Config("collect interval must be positive".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("collect timeout must be positive".to_string()));
        }
        if !self.metrics_path.starts_with('/') {
            return Err(Error::Config(format!(
                "metrics path must start with '/': {}",
                self.metrics_path
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Get the default configuration directory
    ///
    /// Returns `~/.config/unused` on Unix-like systems,
    /// or `%APPDATA%\unused` on Windows.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(windows) {
            std::env::var("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from(".config"))
        };

        Ok(config_dir.join("unused"))
    }

    /// Default configuration file
    pub fn default_file() -> Result<PathBuf> {
        Ok(Self::default_path()?.join("config.toml"))
    }

    /// Load configuration from the default path, or defaults if there is none
    pub fn load() -> Result<Self> {
        let config_file = Self::default_file()?;
        if !config_file.exists() {
            log::debug!("no config file at {}", config_file.display());
            return Ok(Self::default());
        }
        Self::load_from(&config_file)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("reading {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from `path` when given, else from the default location
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        }
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Other(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.providers.is_empty());
        assert!(!config.output.verbose);
        assert_eq!(config.output.sort, SortKey::Provider);
        assert_eq!(config.exporter.address, "0.0.0.0:8080");
        assert_eq!(config.exporter.metrics_path, "/metrics");
        assert_eq!(config.exporter.interval(), Duration::from_secs(300));
        assert_eq!(config.exporter.timeout(), Duration::from_secs(60));
        assert!(config.exporter.validate().is_ok());
    }

    #[test]
    fn test_partial_file() {
        let config: Config = toml::from_str(
            r#"
            [providers]
            aws_profiles = ["prod", "staging"]

            [output]
            extra_columns = ["zone"]
            sort = "created"

            [exporter]
            interval_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.providers.aws_profiles, vec!["prod", "staging"]);
        assert!(config.providers.gcp_projects.is_empty());
        assert_eq!(config.output.extra_columns, vec!["zone"]);
        assert_eq!(config.output.sort, SortKey::Created);
        assert_eq!(config.exporter.interval_secs, 60);
        assert_eq!(config.exporter.timeout_secs, 60);
        assert_eq!(config.exporter.metrics_path, "/metrics");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.providers.gcp_projects.push("my-project".to_string());
        config.output.verbose = true;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_bad_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[output]\nsort = \"size\"\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.is_config());

        let missing = Config::load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(missing.is_config());
    }

    #[test]
    fn test_exporter_validation() {
        let exporter = ExporterConfig {
            metrics_path: "metrics".to_string(),
            ..Default::default()
        };
        assert!(exporter.validate().is_err());

        let exporter = ExporterConfig {
            interval_secs: 0,
            ..Default::default()
        };
        assert!(exporter.validate().is_err());
    }
}
