//! TOML-based configuration for the rawcast service.
//!
//! Reads `ServiceConfig` from an explicit path or from the platform-appropriate
//! config file:
//! - Windows:  `%APPDATA%\Rawcast\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/rawcast/config.toml` (or `~/.config/rawcast/`)
//! - macOS:    `~/Library/Application Support/Rawcast/config.toml`
//!
//! ```toml
//! [server]
//! port = 9999
//! bind_address = "0.0.0.0"
//! max_clients = 10
//!
//! [logging]
//! level = "info"
//! file = "C:\\ProgramData\\Rawcast\\rawcast.log"
//! ```
//!
//! # Serde default values
//!
//! Every field has a `#[serde(default = "...")]` helper, so a missing file,
//! a missing section or a missing key all fall back to the built-in
//! defaults.  Command-line flags are applied on top by the binary.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use rawcast_core::protocol::{DEFAULT_MAX_CLIENTS, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::broadcast_server::BroadcastSettings;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

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

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Broadcast listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// TCP port clients connect to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// IP address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Maximum simultaneously connected clients; must be at least 1.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `"info"` or `"rawcast_service=debug"`.
    /// `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Append-only log file.  Logs go to stderr when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_max_clients() -> usize {
    DEFAULT_MAX_CLIENTS
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            max_clients: default_max_clients(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl ServiceConfig {
    /// Checks value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broadcast_settings().map(|_| ())
    }

    /// The listener settings for the broadcast server.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when `bind_address` is not an IP address or
    /// `max_clients` is zero.
    pub fn broadcast_settings(&self) -> Result<BroadcastSettings, ConfigError> {
        let bind_address: IpAddr =
            self.server
                .bind_address
                .parse()
                .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                    field: "server.bind_address",
                    reason: format!("{:?}: {e}", self.server.bind_address),
                })?;
        if self.server.max_clients == 0 {
            return Err(ConfigError::Invalid {
                field: "server.max_clients",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(BroadcastSettings {
            bind_address,
            max_clients: self.server.max_clients,
        })
    }

    /// Renders the config as pretty TOML.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Serialize`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the platform config file, returning defaults when
/// the file does not exist yet.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<ServiceConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads the config from `path`, returning defaults when the file does not
/// exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<ServiceConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServiceConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Resolves the platform config directory, including the `Rawcast` part.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // %APPDATA% e.g. C:\Users\<user>\AppData\Roaming
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Rawcast"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("rawcast"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("Rawcast")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn test_default_config_matches_wire_defaults() {
        // Arrange / Act
        let cfg = ServiceConfig::default();

        // Assert
        assert_eq!(cfg.server.port, 9999);
        assert_eq!(cfg.server.max_clients, 10);
        assert_eq!(cfg.server.bind_address, "0.0.0.0");
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.logging.file.is_none());
    }

    #[test]
    fn test_partial_toml_fills_missing_fields_with_defaults() {
        // Arrange
        let text = "[server]\nport = 7000\n";

        // Act
        let cfg: ServiceConfig = toml::from_str(text).expect("parse");

        // Assert
        assert_eq!(cfg.server.port, 7000);
        assert_eq!(cfg.server.max_clients, 10);
        assert_eq!(cfg.logging, LoggingConfig::default());
    }

    #[test]
    fn test_empty_toml_is_default_config() {
        let cfg: ServiceConfig = toml::from_str("").expect("parse");
        assert_eq!(cfg, ServiceConfig::default());
    }

    #[test]
    fn test_logging_file_is_read() {
        let cfg: ServiceConfig =
            toml::from_str("[logging]\nlevel = \"debug\"\nfile = \"rawcast.log\"\n").unwrap();

        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.file, Some(PathBuf::from("rawcast.log")));
    }

    #[test]
    fn test_to_toml_round_trips() {
        // Arrange
        let mut cfg = ServiceConfig::default();
        cfg.server.port = 12345;
        cfg.logging.file = Some(PathBuf::from("out.log"));

        // Act
        let text = cfg.to_toml().expect("serialize");
        let restored: ServiceConfig = toml::from_str(&text).expect("deserialize");

        // Assert
        assert_eq!(restored, cfg);
    }

    #[test]
    fn test_broadcast_settings_parses_bind_address() {
        let mut cfg = ServiceConfig::default();
        cfg.server.bind_address = "127.0.0.1".to_string();
        cfg.server.max_clients = 3;

        let settings = cfg.broadcast_settings().expect("valid");

        assert_eq!(settings.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(settings.max_clients, 3);
    }

    #[test]
    fn test_validate_rejects_zero_max_clients() {
        let mut cfg = ServiceConfig::default();
        cfg.server.max_clients = 0;

        let err = cfg.validate().unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "server.max_clients",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_hostname_bind_address() {
        let mut cfg = ServiceConfig::default();
        cfg.server.bind_address = "localhost".to_string();

        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid {
                field: "server.bind_address",
                ..
            })
        ));
    }

    #[test]
    fn test_load_config_from_missing_file_returns_defaults() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.toml");

        // Act
        let cfg = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(cfg, ServiceConfig::default());
    }

    #[test]
    fn test_load_config_from_reads_file() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 8123\nmax_clients = 2\n").unwrap();

        // Act
        let cfg = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(cfg.server.port, 8123);
        assert_eq!(cfg.server.max_clients, 2);
    }

    #[test]
    fn test_load_config_from_reports_malformed_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();

        assert!(matches!(load_config_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_from_directory_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");

        let result = load_config_from(dir.path());

        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        // Only meaningful where the platform dir resolves from the environment.
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"));
        }
    }
}
