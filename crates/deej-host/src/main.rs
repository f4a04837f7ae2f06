//! deej host: entry point.
//!
//! Reads the configuration, wires the audio backend, the foreground window
//! query and the serial transport into an [`Engine`], and runs until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! deej [OPTIONS]
//!
//! Options:
//!   --config <PATH>     Config file [default: <platform config dir>/deej/config.toml]
//!   --port <PATH>       Serial device, overrides the config file
//!   --backend <KIND>    Audio backend: memory | native [default: memory]
//!   -v, --verbose       Log every serial line and slider move
//! ```
//!
//! # Log level
//!
//! `RUST_LOG` wins when set.  Otherwise `--verbose` selects `debug`, and
//! without it the config file's `logging.log_level` applies.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use deej_host::application::session_directory::AudioBackend;
use deej_host::engine::{Engine, EngineDeps, EngineOptions};
use deej_host::infrastructure::audio_backend::{in_memory::InMemoryAudioBackend, native_backend};
use deej_host::infrastructure::slider_link::device::DeviceLineTransport;
use deej_host::infrastructure::slider_link::LinkState;
use deej_host::infrastructure::storage::config::{config_file_path, load_config_from, AppConfig};
use deej_host::infrastructure::window_focus::{
    cached::CachedForegroundWindow, unsupported::UnsupportedForegroundWindow,
};

/// Which audio backend to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendChoice {
    /// In-process simulated sessions (`master`, `system`, `mic`).
    Memory,
    /// The platform's audio stack.
    Native,
}

/// Physical volume mixer host: maps hardware sliders to application volume.
#[derive(Debug, Parser)]
#[command(name = "deej", about = "Hardware slider volume mixer host", version)]
struct Cli {
    /// Path of the TOML config file.
    #[arg(long, env = "DEEJ_CONFIG")]
    config: Option<PathBuf>,

    /// Serial device of the board, overriding `connection.port`.
    #[arg(long, env = "DEEJ_PORT")]
    port: Option<String>,

    /// Audio backend to use.
    #[arg(long, value_enum, default_value_t = BackendChoice::Memory)]
    backend: BackendChoice,

    /// Log every serial line and slider move.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("no --config given and no platform config directory"),
        }
    }
}

fn init_tracing(cli: &Cli, config: &AppConfig) {
    let fallback = if cli.verbose {
        "debug"
    } else {
        config.logging.log_level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .init();
}

fn build_backend(choice: BackendChoice) -> Arc<dyn AudioBackend> {
    match choice {
        // In production: replace the in-memory backend with `--backend native`
        // on platforms that have one.
        BackendChoice::Memory => {
            let backend = InMemoryAudioBackend::polling();
            for key in ["master", "system", "mic"] {
                backend.add_session(key);
            }
            Arc::new(backend)
        }
        BackendChoice::Native => native_backend(),
    }
}

/// Logs board connects and disconnects until the link shuts down.
async fn report_link_state(mut states: broadcast::Receiver<LinkState>) {
    loop {
        match states.recv().await {
            Ok(LinkState::Connected { port }) => info!(port = %port, "slider board connected"),
            Ok(LinkState::Disconnected) => warn!("slider board disconnected, waiting for it to return"),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config_path()?;
    let config = load_config_from(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    init_tracing(&cli, &config);
    info!(config = %config_path.display(), backend = ?cli.backend, "deej starting");

    let deps = EngineDeps {
        backend: build_backend(cli.backend),
        focus: Arc::new(CachedForegroundWindow::new(Arc::new(UnsupportedForegroundWindow))),
        transport: Arc::new(DeviceLineTransport::new()),
    };
    let options = EngineOptions {
        verbose: cli.verbose,
        port_override: cli.port.clone(),
        config_path: Some(config_path),
        ..EngineOptions::default()
    };

    let engine = match Engine::start(config, deps, options) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "failed to start deej");
            return Err(e).context("failed to start deej");
        }
    };

    let mut sessions = engine.directory().subscribe_count_changes();
    tokio::spawn(async move {
        while sessions.changed().await.is_ok() {
            let count = *sessions.borrow_and_update();
            info!(sessions = count, "audio session count changed");
        }
    });

    tokio::spawn(report_link_state(engine.subscribe_link_state()));

    info!("deej running.  Press Ctrl-C to exit.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown signal received");

    engine
        .shutdown()
        .await
        .context("failed to release audio backend")?;
    info!("deej stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        // Arrange / Act
        let cli = Cli::parse_from(["deej"]);

        // Assert
        assert_eq!(cli.backend, BackendChoice::Memory);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_parses_overrides() {
        let cli = Cli::parse_from([
            "deej",
            "--config",
            "/tmp/deej.toml",
            "--port",
            "/dev/ttyACM0",
            "--backend",
            "native",
            "-v",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/deej.toml")));
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(cli.backend, BackendChoice::Native);
        assert!(cli.verbose);
        assert_eq!(cli.config_path().unwrap(), PathBuf::from("/tmp/deej.toml"));
    }

    #[test]
    fn test_memory_backend_is_seeded_with_reserved_sessions() {
        let backend = build_backend(BackendChoice::Memory);

        let mut keys: Vec<String> = backend
            .all_sessions()
            .unwrap()
            .iter()
            .map(|s| s.key().to_string())
            .collect();
        keys.sort();

        assert_eq!(keys, vec!["master", "mic", "system"]);
    }

    #[test]
    fn test_native_backend_is_unsupported_in_this_build() {
        assert!(build_backend(BackendChoice::Native).all_sessions().is_err());
    }

    #[tokio::test]
    async fn test_link_state_reporter_stops_when_link_closes() {
        // Arrange
        let (tx, rx) = broadcast::channel(4);
        tx.send(LinkState::Connected {
            port: "/dev/ttyUSB0".to_string(),
        })
        .unwrap();
        tx.send(LinkState::Disconnected).unwrap();
        drop(tx);

        // Act / Assert
        tokio::time::timeout(std::time::Duration::from_secs(1), report_link_state(rx))
            .await
            .expect("reporter returns once the channel closes");
    }
}
