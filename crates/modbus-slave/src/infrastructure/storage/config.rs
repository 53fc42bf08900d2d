//! TOML-based configuration for the slave binary.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! slave on `0.0.0.0:502` with MBAP framing and no I/O log:
//!
//! ```toml
//! [tcp]
//! bind_address = "0.0.0.0"
//! port = 502
//! framing = "mbap"            # or "encapsulated"
//! log_path = "/var/log/modbus" # file or directory; omit or leave blank to disable
//! poll_interval_ms = 500
//! shutdown_timeout_ms = 3000
//! max_workers = 512
//! # max_connections = 64
//!
//! [logging]
//! level = "info"
//! ```

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use modbus_slave_core::FramingMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::listener::{TcpSlaveConfig, DEFAULT_PORT};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `tcp.bind_address` is not an IP address.
    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub tcp: TcpSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Framing of the TCP listener as written in the file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TcpFraming {
    #[default]
    Mbap,
    Encapsulated,
}

impl From<TcpFraming> for FramingMode {
    fn from(framing: TcpFraming) -> Self {
        match framing {
            TcpFraming::Mbap => FramingMode::Mbap,
            TcpFraming::Encapsulated => FramingMode::Encapsulated,
        }
    }
}

/// The `[tcp]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TcpSection {
    /// IP address to bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub framing: TcpFraming,
    /// I/O log file or directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,
}

/// The `[logging]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// `tracing` filter: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`,
    /// or a full directive such as `"modbus_slave=debug"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_shutdown_timeout_ms() -> u64 {
    3000
}
fn default_max_workers() -> usize {
    512
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TcpSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            framing: TcpFraming::default(),
            log_path: None,
            poll_interval_ms: default_poll_interval_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            max_workers: default_max_workers(),
            max_connections: None,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TcpSection {
    /// Converts the table into listener settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] if `bind_address` does not
    /// parse as an IP address.
    pub fn to_slave_config(&self) -> Result<TcpSlaveConfig, ConfigError> {
        let bind_address: IpAddr = self
            .bind_address
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.bind_address.clone()))?;
        Ok(TcpSlaveConfig {
            bind_address,
            port: self.port,
            framing: self.framing.into(),
            log_path: self.log_path.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
            max_workers: self.max_workers,
            max_connections: self.max_connections,
        })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_listener_defaults() {
        // Arrange / Act
        let slave = AppConfig::default().tcp.to_slave_config().unwrap();

        // Assert
        assert_eq!(slave, TcpSlaveConfig::default());
    }

    #[test]
    fn test_empty_file_parses_to_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_partial_tcp_table_keeps_other_defaults() {
        // Arrange
        let text = r#"
            [tcp]
            port = 1502
            framing = "encapsulated"
            log_path = "/var/log/modbus"
            max_connections = 8
        "#;

        // Act
        let cfg: AppConfig = toml::from_str(text).unwrap();
        let slave = cfg.tcp.to_slave_config().unwrap();

        // Assert
        assert_eq!(slave.port, 1502);
        assert_eq!(slave.framing, FramingMode::Encapsulated);
        assert_eq!(slave.log_path, Some(PathBuf::from("/var/log/modbus")));
        assert_eq!(slave.max_connections, Some(8));
        assert_eq!(slave.poll_interval, Duration::from_millis(500));
        assert_eq!(slave.max_workers, 512);
    }

    #[test]
    fn test_unknown_framing_is_rejected() {
        let result: Result<AppConfig, _> = toml::from_str("[tcp]\nframing = \"rtu\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_bind_address_is_reported() {
        let section = TcpSection {
            bind_address: "not-an-ip".to_string(),
            ..TcpSection::default()
        };
        assert!(matches!(
            section.to_slave_config(),
            Err(ConfigError::InvalidBindAddress(addr)) if addr == "not-an-ip"
        ));
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_then_load_preserves_values() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("slave.toml");
        let mut cfg = AppConfig::default();
        cfg.tcp.port = 5020;
        cfg.tcp.log_path = Some(PathBuf::from("/tmp/trace.log"));
        cfg.logging.level = "debug".to_string();

        // Act
        save_config(&path, &cfg).unwrap();
        let restored = load_config(&path).unwrap();

        // Assert
        assert_eq!(restored, cfg);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[tcp\nport = ").unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }
}
