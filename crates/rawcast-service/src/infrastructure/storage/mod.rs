//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the TOML configuration file from an explicit
//! path or the platform-appropriate directory, and falls back to defaults when
//! the file does not exist yet (first run).

pub mod config;

pub use config::{load_config, load_config_from, ConfigError, ServiceConfig};
