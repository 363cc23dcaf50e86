//! rawcast service entry point.
//!
//! Captures keyboard and mouse input per physical device and streams every
//! key-down and every non-empty mouse report to all connected TCP clients as
//! line-delimited JSON.
//!
//! # Usage
//!
//! ```text
//! rawcast [OPTIONS]
//!
//! Options:
//!   --config       <PATH>   Config file [default: platform config dir]
//!   --port         <PORT>   TCP listener port [default: 9999]
//!   --bind         <IP>     Listener address [default: 0.0.0.0]
//!   --max-clients  <N>      Connected client ceiling [default: 10]
//!   --log-level    <FILTER> tracing filter [default: info]
//!   --log-file     <PATH>   Log to this file instead of stderr
//!   --print-config          Print the effective config as TOML and exit
//! ```
//!
//! # Environment variable overrides
//!
//! Every option can also be set through an environment variable.  Precedence,
//! highest first: command line, environment, config file, built-in default.
//!
//! | Variable              | Option          |
//! |-----------------------|-----------------|
//! | `RAWCAST_CONFIG`      | `--config`      |
//! | `RAWCAST_PORT`        | `--port`        |
//! | `RAWCAST_BIND`        | `--bind`        |
//! | `RAWCAST_MAX_CLIENTS` | `--max-clients` |
//! | `RAWCAST_LOG_LEVEL`   | `--log-level`   |
//! | `RAWCAST_LOG_FILE`    | `--log-file`    |
//!
//! `RUST_LOG` overrides the log level when set.
//!
//! # Architecture overview
//!
//! ```text
//! OS raw input ──▶ capture thread (message-only window)
//!                        │ mpsc
//!                        ▼
//!                  InputCaptureLoop ──▶ DeviceRegistry
//!                        │
//!                        ▼
//!                  BroadcastServer ──▶ TCP clients (one JSON line per event)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use rawcast_service::application::capture_loop::{EventSink, InputCaptureLoop};
use rawcast_service::application::device_registry::DeviceRegistry;
use rawcast_service::infrastructure::input_capture::os_sources;
use rawcast_service::infrastructure::logging::init_logging;
use rawcast_service::infrastructure::network::BroadcastServer;
use rawcast_service::infrastructure::storage::config::{
    load_config, load_config_from, ConfigError, ServiceConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Per-device raw input broadcaster.
///
/// Options left unset fall back to the config file, then to built-in
/// defaults.
#[derive(Debug, Parser)]
#[command(
    name = "rawcast",
    about = "Broadcast per-device keyboard and mouse input as line-delimited JSON",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    ///
    /// A missing file is not an error; defaults apply.
    #[arg(long, env = "RAWCAST_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port clients connect to.
    #[arg(long, env = "RAWCAST_PORT")]
    port: Option<u16>,

    /// IP address to bind the listener to.
    ///
    /// `0.0.0.0` accepts connections on every interface, `127.0.0.1` only
    /// local ones.
    #[arg(long, env = "RAWCAST_BIND")]
    bind: Option<String>,

    /// Maximum number of simultaneously connected clients.
    #[arg(long, env = "RAWCAST_MAX_CLIENTS")]
    max_clients: Option<usize>,

    /// Log filter directive, e.g. `debug` or `rawcast_service=trace`.
    #[arg(long, env = "RAWCAST_LOG_LEVEL")]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr.
    #[arg(long, env = "RAWCAST_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Loads the config file and layers the command-line values on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if the
    /// merged values fail validation.
    fn into_service_config(self) -> anyhow::Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => match load_config() {
                Ok(config) => config,
                Err(ConfigError::NoPlatformConfigDir) => ServiceConfig::default(),
                Err(e) => return Err(e).context("failed to load config"),
            },
        };

        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if let Some(max_clients) = self.max_clients {
            config.server.max_clients = max_clients;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(file) = self.log_file {
            config.logging.file = Some(file);
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments and the config file are merged into a [`ServiceConfig`].
/// 2. Logging is initialised (stderr or the configured file).
/// 3. The broadcast server binds its port.  A bind failure is fatal.
/// 4. The OS input sources are created and the capture loop registers for
///    raw input.  On failure the server is stopped before exiting.
/// 5. The capture loop runs on a blocking task until Ctrl+C, after which the
///    loop and the server are shut down in that order.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let print_config = cli.print_config;
    let config = cli.into_service_config()?;

    if print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    // Held until exit so buffered file logs are flushed.
    let _log_guard = init_logging(&config.logging.level, config.logging.file.as_deref())
        .context("failed to initialise logging")?;

    info!(version = env!("CARGO_PKG_VERSION"), "rawcast starting");

    // ── Broadcast server ──────────────────────────────────────────────────────
    let server = Arc::new(BroadcastServer::new(config.broadcast_settings()?));
    let port = config.server.port;
    server
        .start(port)
        .with_context(|| format!("failed to start broadcast server on port {port}"))?;

    // ── Capture loop ──────────────────────────────────────────────────────────
    let (input_source, device_source) = match os_sources() {
        Ok(sources) => sources,
        Err(e) => {
            server.stop();
            return Err(e).context("raw input capture is unavailable");
        }
    };

    let registry = Arc::new(DeviceRegistry::new(device_source));
    let sink: Arc<dyn EventSink> = Arc::clone(&server) as Arc<dyn EventSink>;
    let capture = Arc::new(InputCaptureLoop::new(registry, input_source, sink));

    let packets = match capture.start() {
        Ok(packets) => packets,
        Err(e) => {
            server.stop();
            return Err(e).context("failed to register for raw input");
        }
    };

    // Ctrl+C closes the packet stream, which ends `run()` below.
    let signal_capture = Arc::clone(&capture);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                signal_capture.shutdown();
            }
            Err(e) => {
                error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    let runner = Arc::clone(&capture);
    let outcome = tokio::task::spawn_blocking(move || runner.run(packets))
        .await
        .context("capture task panicked");

    capture.shutdown();
    server.stop();

    outcome??;
    info!("rawcast stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
