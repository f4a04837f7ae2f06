//! Engine: wires the application flows and the infrastructure together.
//!
//! ```text
//! Engine::start()
//!  ├─ detect tracking mode (backend event stream present?)
//!  ├─ polling mode: load the first session snapshot (fatal on failure)
//!  └─ spawn
//!       ├─ session event pump      (event-driven mode only)
//!       ├─ refresh worker
//!       ├─ config fan-out          AppConfig → RoutingConfig + LinkSettings
//!       ├─ config sync             RoutingConfig → directory reclassification
//!       ├─ routing loop            SliderMoveEvent → Session::set_volume
//!       ├─ slider link
//!       └─ config watcher          (when a config path is given)
//! ```
//!
//! Every task selects against one `broadcast` stop signal.  After they have
//! all finished, [`Engine::shutdown`] releases the directory's sessions and
//! the backend.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use deej_core::RoutingConfig;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::refresh::{
    run_config_sync, run_refresh_worker, run_session_event_pump, RefreshSignal,
};
use crate::application::route_volume::RouteVolumeUseCase;
use crate::application::session_directory::{
    AudioBackend, BackendError, SessionDirectory, TrackingMode, MIN_TIME_BETWEEN_REFRESHES,
};
use crate::application::target_resolver::{ForegroundWindow, TargetResolver};
use crate::infrastructure::slider_link::{
    LineTransport, LinkSettings, LinkState, LinkTiming, SliderLink,
};
use crate::infrastructure::storage::config::AppConfig;
use crate::infrastructure::storage::watcher::ConfigWatcher;

/// Errors that prevent the engine from starting.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The first session snapshot of a polling backend failed.
    #[error("failed to load audio sessions during initialization: {0}")]
    InitialSnapshot(#[source] BackendError),
}

/// The OS-facing collaborators.
pub struct EngineDeps {
    pub backend: Arc<dyn AudioBackend>,
    pub focus: Arc<dyn ForegroundWindow>,
    pub transport: Arc<dyn LineTransport>,
}

/// Tunables that do not come from the config file.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Log every serial line and slider move.
    pub verbose: bool,
    /// Overrides the configured serial port, including after reloads.
    pub port_override: Option<String>,
    /// Config file to watch for changes.
    pub config_path: Option<PathBuf>,
    pub link_timing: LinkTiming,
    pub min_refresh_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            port_override: None,
            config_path: None,
            link_timing: LinkTiming::default(),
            min_refresh_interval: MIN_TIME_BETWEEN_REFRESHES,
        }
    }
}

/// A running deej host.
pub struct Engine {
    directory: Arc<SessionDirectory>,
    configs: watch::Sender<Arc<AppConfig>>,
    link_state: broadcast::Receiver<LinkState>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Starts every flow.  Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InitialSnapshot`] if the backend polls and its
    /// first enumeration fails.
    pub fn start(
        config: AppConfig,
        deps: EngineDeps,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        let events = deps.backend.subscribe_events();
        let mode = if events.is_some() {
            TrackingMode::EventDriven
        } else {
            TrackingMode::Polling
        };

        let routing = Arc::new(config.routing_config());
        let directory = Arc::new(
            SessionDirectory::new(Arc::clone(&deps.backend), mode, &routing)
                .with_min_refresh_interval(options.min_refresh_interval),
        );

        if mode == TrackingMode::Polling {
            directory
                .refresh(true)
                .map_err(EngineError::InitialSnapshot)?;
        }
        info!(?mode, sessions = directory.session_count(), "audio session tracking started");

        let (shutdown_tx, _) = broadcast::channel(1);
        let signal = Arc::new(RefreshSignal::new());
        let link_settings = link_settings_for(&config, &options);
        let (configs, config_rx) = watch::channel(Arc::new(config));
        let (routing_tx, routing_rx) = watch::channel(routing);
        let (link_tx, link_rx) = watch::channel(link_settings);
        let mut tasks = Vec::new();

        if let Some(events) = events {
            tasks.push(tokio::spawn(run_session_event_pump(
                Arc::clone(&directory),
                events,
                shutdown_tx.subscribe(),
            )));
        }

        tasks.push(tokio::spawn(run_refresh_worker(
            Arc::clone(&directory),
            Arc::clone(&signal),
            shutdown_tx.subscribe(),
        )));

        tasks.push(tokio::spawn(run_config_fanout(
            config_rx,
            routing_tx,
            link_tx,
            options.port_override.clone(),
            shutdown_tx.subscribe(),
        )));

        tasks.push(tokio::spawn(run_config_sync(
            Arc::clone(&directory),
            routing_rx.clone(),
            Arc::clone(&signal),
            shutdown_tx.subscribe(),
        )));

        let mut link = SliderLink::new(deps.transport, link_rx)
            .with_timing(options.link_timing)
            .with_verbose(options.verbose);
        let moves = link.subscribe_moves();
        let link_state = link.subscribe_state();

        let resolver = TargetResolver::new(Arc::clone(&directory), deps.focus);
        let router = RouteVolumeUseCase::new(routing_rx, Arc::clone(&directory), resolver, signal);
        tasks.push(tokio::spawn(router.run(moves, shutdown_tx.subscribe())));
        tasks.push(tokio::spawn(link.run(shutdown_tx.subscribe())));

        if let Some(path) = options.config_path {
            match ConfigWatcher::new(path) {
                Ok(watcher) => {
                    tasks.push(tokio::spawn(watcher.run(configs.clone(), shutdown_tx.subscribe())));
                }
                Err(e) => warn!(error = %e, "config hot reload disabled"),
            }
        }

        Ok(Self {
            directory,
            configs,
            link_state,
            shutdown_tx,
            tasks,
        })
    }

    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    /// Publishes a new configuration, exactly as a file reload would.
    pub fn apply_config(&self, config: AppConfig) {
        self.configs.send_replace(Arc::new(config));
    }

    pub fn subscribe_link_state(&self) -> broadcast::Receiver<LinkState> {
        self.link_state.resubscribe()
    }

    /// Stops every flow, then releases sessions and the backend.
    pub async fn shutdown(self) -> Result<(), BackendError> {
        // no receivers left means every task already ended
        let _ = self.shutdown_tx.send(());

        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "engine task ended abnormally");
            }
        }

        self.directory.shutdown()?;
        info!("engine stopped");
        Ok(())
    }
}

fn link_settings_for(config: &AppConfig, options: &EngineOptions) -> LinkSettings {
    let mut settings = config.link_settings();
    if let Some(port) = &options.port_override {
        settings.connection.port = port.clone();
    }
    settings
}

/// Splits each published [`AppConfig`] into the routing and link views.
async fn run_config_fanout(
    mut configs: watch::Receiver<Arc<AppConfig>>,
    routing: watch::Sender<Arc<RoutingConfig>>,
    link: watch::Sender<LinkSettings>,
    port_override: Option<String>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            changed = configs.changed() => {
                if changed.is_err() {
                    break;
                }
                let config = Arc::clone(&configs.borrow_and_update());
                routing.send_replace(Arc::new(config.routing_config()));

                let mut settings = config.link_settings();
                if let Some(port) = &port_override {
                    settings.connection.port = port.clone();
                }
                link.send_replace(settings);
            }
        }
    }
    debug!("config fan-out stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
