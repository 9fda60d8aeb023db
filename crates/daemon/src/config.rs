//! Configuration management for the Termplex daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/termplex/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("shell path does not exist: {0}")]
    InvalidShellPath(String),

    #[error("initial geometry must be non-zero, got {rows}x{cols}")]
    InvalidGeometry { rows: u16, cols: u16 },
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the Termplex daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Terminal session configuration.
    pub session: SessionConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Terminal session configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Shell to spawn for sessions. Empty means resolve from `$SHELL`
    /// with a `/bin/sh` fallback.
    pub shell: String,

    /// Initial terminal rows for new sessions.
    pub initial_rows: u16,

    /// Initial terminal columns for new sessions.
    pub initial_cols: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shell: String::new(),
            initial_rows: 24,
            initial_cols: 80,
        }
    }
}

impl Config {
    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("termplex")
            .join("config.toml")
    }

    /// Loads configuration from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Loads configuration from the default path, or returns defaults if
    /// the file does not exist.
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Saves the configuration to the given path, creating parent
    /// directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir: {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validates the configuration, returning the first problem found.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.daemon.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }
        if !self.session.shell.is_empty() && !Path::new(&self.session.shell).exists() {
            return Err(ConfigError::InvalidShellPath(self.session.shell.clone()));
        }
        if self.session.initial_rows == 0 || self.session.initial_cols == 0 {
            return Err(ConfigError::InvalidGeometry {
                rows: self.session.initial_rows,
                cols: self.session.initial_cols,
            });
        }
        Ok(())
    }

    /// Returns the shell override to pass to the session coordinator, if
    /// one is configured.
    pub fn shell_override(&self) -> Option<String> {
        if self.session.shell.is_empty() {
            None
        } else {
            Some(self.session.shell.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.session.initial_rows, 24);
        assert_eq!(config.session.initial_cols, 80);
        assert!(config.session.shell.is_empty());
        assert!(config.shell_override().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.daemon.log_level = "debug".to_string();
        config.session.initial_rows = 50;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(Config::load(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[daemon]\nlog_level = \"trace\"\n").unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.daemon.log_level, "trace");
        assert_eq!(loaded.session.initial_cols, 80);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = Config::default();
        config.daemon.log_level = "loud".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("loud".to_string()))
        );
    }

    #[test]
    fn test_missing_shell_rejected() {
        let mut config = Config::default();
        config.session.shell = "/no/such/shell".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidShellPath(_))
        ));
    }

    #[test]
    fn test_zero_geometry_rejected() {
        let mut config = Config::default();
        config.session.initial_rows = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn test_shell_override_present() {
        let mut config = Config::default();
        config.session.shell = "/bin/sh".to_string();
        assert_eq!(config.shell_override(), Some("/bin/sh".to_string()));
        assert!(config.validate().is_ok());
    }
}
