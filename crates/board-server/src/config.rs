//! Configuration management for the board server
//!
//! Settings are read from a TOML file (`board.toml` by default); anything
//! missing falls back to its default. Command-line flags override the file.

use board_core::DEFAULT_TRANSFER_COOLDOWN_MS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::notifier::DEFAULT_CHANNEL_CAPACITY;

/// Default config file name, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "board.toml";

/// Top-level board server configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,

    #[serde(default)]
    pub locking: LockingConfig,
}

/// HTTP listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Task store location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

/// Change notification fan-out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Events buffered per observer before it starts skipping
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

/// Edit-lock negotiation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockingConfig {
    /// Wait between a transfer request and a forced claim
    #[serde(default = "default_cooldown_ms")]
    pub transfer_cooldown_ms: i64,
}

// Default value providers
fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".board/board.db")
}

fn default_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_cooldown_ms() -> i64 {
    DEFAULT_TRANSFER_COOLDOWN_MS
}

impl BoardConfig {
    /// Load configuration from `path`, or use defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default configuration to `path`
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let content = toml::to_string_pretty(&Self::default())?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl ServerConfig {
    /// Socket address string for the listener
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            transfer_cooldown_ms: default_cooldown_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BoardConfig::default();
        assert_eq!(config.server.address(), "0.0.0.0:3000");
        assert_eq!(config.database.path, PathBuf::from(".board/board.db"));
        assert_eq!(config.locking.transfer_cooldown_ms, 5000);
        assert_eq!(config.notifier.capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let config: BoardConfig = toml::from_str(
            r#"
            [server]
            port = 8080

            [locking]
            transfer_cooldown_ms = 1500
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.locking.transfer_cooldown_ms, 1500);
        assert_eq!(config.database, DatabaseConfig::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BoardConfig::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, BoardConfig::default());
    }

    #[test]
    fn test_write_default_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("board.toml");
        BoardConfig::write_default(&path).unwrap();

        let loaded = BoardConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, BoardConfig::default());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.toml");
        std::fs::write(&path, "server = 12").unwrap();
        assert!(matches!(
            BoardConfig::load_or_default(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
