//! Refresh signalling and the background flows that keep the
//! [`SessionDirectory`] current.
//!
//! Refresh requests are signals, not data: ten "please refresh" requests
//! arriving while one refresh is running collapse into a single follow-up
//! refresh.  A forced request wins over a lazy one.
//!
//! Three long-running flows live here, each ending when the shutdown
//! broadcast fires:
//!
//! - [`run_refresh_worker`] performs the refreshes the routing use case asks
//!   for, off the slider hot path.
//! - [`run_session_event_pump`] feeds event-driven backend notifications into
//!   the directory.
//! - [`run_config_sync`] reclassifies sessions after a configuration reload.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use deej_core::{RoutingConfig, SessionEvent};
use tokio::sync::{broadcast, mpsc, watch, Notify};
use tracing::{debug, error, info};

use crate::application::session_directory::SessionDirectory;

/// Whether a refresh may be skipped by the cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    /// Subject to the directory's cooldown.
    Lazy,
    /// Bypasses the cooldown.
    Forced,
}

/// Coalescing refresh request flag.
#[derive(Debug, Default)]
pub struct RefreshSignal {
    notify: Notify,
    forced: AtomicBool,
}

impl RefreshSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request.  Never blocks.
    pub fn request(&self, kind: RefreshKind) {
        if kind == RefreshKind::Forced {
            self.forced.store(true, Ordering::SeqCst);
        }
        self.notify.notify_one();
    }

    /// Waits for the next pending request and consumes it.
    pub async fn requested(&self) -> RefreshKind {
        self.notify.notified().await;
        if self.forced.swap(false, Ordering::SeqCst) {
            RefreshKind::Forced
        } else {
            RefreshKind::Lazy
        }
    }
}

/// Serves refresh requests until shutdown.
///
/// Enumeration can be slow, so each refresh runs on the blocking pool.
pub async fn run_refresh_worker(
    directory: Arc<SessionDirectory>,
    signal: Arc<RefreshSignal>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let kind = tokio::select! {
            _ = shutdown.recv() => break,
            kind = signal.requested() => kind,
        };

        let force = kind == RefreshKind::Forced;
        let dir = Arc::clone(&directory);
        match tokio::task::spawn_blocking(move || dir.refresh(force)).await {
            Ok(Ok(outcome)) => debug!(?outcome, forced = force, "directory refresh finished"),
            // already logged by the directory
            Ok(Err(_)) => {}
            Err(e) => error!(error = %e, "directory refresh task failed"),
        }
    }
    debug!("refresh worker stopped");
}

/// Applies backend session events to the directory until the stream ends or
/// shutdown fires.
pub async fn run_session_event_pump(
    directory: Arc<SessionDirectory>,
    mut events: mpsc::Receiver<SessionEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            event = events.recv() => match event {
                Some(event) => directory.handle_event(event),
                None => {
                    info!("audio backend closed its session event stream");
                    break;
                }
            },
        }
    }
    debug!("session event pump stopped");
}

/// Keeps the directory's mapped/unmapped split in line with the current
/// routing configuration.
///
/// In polling mode a reload also forces a full refresh, since new targets
/// may name processes the last snapshot skipped.
pub async fn run_config_sync(
    directory: Arc<SessionDirectory>,
    mut config: watch::Receiver<Arc<RoutingConfig>>,
    signal: Arc<RefreshSignal>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            changed = config.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = Arc::clone(&config.borrow_and_update());
                directory.apply_config(&current);
                if !directory.is_event_driven() {
                    info!("config reloaded, re-acquiring audio sessions");
                    signal.request(RefreshKind::Forced);
                }
            }
        }
    }
    debug!("config sync stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
