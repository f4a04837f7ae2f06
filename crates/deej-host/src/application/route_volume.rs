//! RouteVolumeUseCase: applies slider moves to the matching audio sessions.
//!
//! This use case is the heart of the host.  For every [`SliderMoveEvent`] it:
//!
//! 1. Looks up the slider's configured targets.  An unconfigured slider is
//!    ignored.
//! 2. Resolves each target to lookup keys through the [`TargetResolver`] and
//!    fetches the sessions for each key from the [`SessionDirectory`].
//! 3. Sets the volume of every session whose volume differs from the slider.
//!    A failure on one session does not stop the others.
//! 4. Decides whether the directory looks stale:
//!    - nothing found and the backend polls → lazy refresh (an app may have
//!      started since the last scan),
//!    - otherwise, any failed volume change → forced refresh (a handle
//!      probably points at a process that already exited).
//!
//! Nothing is retried within the same event.  Refreshes run on the refresh
//! worker, never on this path.
//!
//! `Session::set_volume` may block inside the OS audio stack, so [`run`]
//! routes each move on the blocking pool, one move at a time.
//!
//! [`run`]: RouteVolumeUseCase::run
//!
//! # Architecture
//!
//! The use case depends only on application traits and domain types.  All
//! infrastructure implementations are injected at construction time, making
//! it fully unit-testable.

use std::sync::Arc;

use deej_core::{RoutingConfig, SliderMoveEvent};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task;
use tracing::{debug, warn};

use crate::application::refresh::{RefreshKind, RefreshSignal};
use crate::application::session_directory::SessionDirectory;
use crate::application::target_resolver::TargetResolver;

/// Volumes closer than this are treated as equal.
const VOLUME_EPSILON: f32 = 1e-6;

/// What one routing pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteOutcome {
    /// The slider has at least one configured target.
    pub slider_mapped: bool,
    /// At least one session was found for the slider's targets.
    pub target_found: bool,
    /// Number of successful volume changes.
    pub adjusted: usize,
    /// At least one volume change failed.
    pub adjustment_failed: bool,
    /// The refresh requested as a consequence, if any.
    pub refresh: Option<RefreshKind>,
}

/// The Route Volume use case.
pub struct RouteVolumeUseCase {
    config: watch::Receiver<Arc<RoutingConfig>>,
    directory: Arc<SessionDirectory>,
    resolver: TargetResolver,
    refresh: Arc<RefreshSignal>,
}

impl RouteVolumeUseCase {
    /// Creates a new use case instance.
    pub fn new(
        config: watch::Receiver<Arc<RoutingConfig>>,
        directory: Arc<SessionDirectory>,
        resolver: TargetResolver,
        refresh: Arc<RefreshSignal>,
    ) -> Self {
        Self {
            config,
            directory,
            resolver,
            refresh,
        }
    }

    /// Routes a single slider move.
    pub fn handle_slider_move(&self, event: &SliderMoveEvent) -> RouteOutcome {
        let mut outcome = RouteOutcome::default();

        let targets: Vec<String> = {
            let config = self.config.borrow();
            match config.slider_mapping.get(event.slider_id) {
                Some(targets) => targets.to_vec(),
                None => return outcome,
            }
        };
        outcome.slider_mapped = true;

        for target in &targets {
            for key in self.resolver.resolve(target) {
                let Some(sessions) = self.directory.lookup(&key) else {
                    continue;
                };
                outcome.target_found = true;

                for session in sessions {
                    if (session.volume() - event.percent_value).abs() < VOLUME_EPSILON {
                        continue;
                    }
                    match session.set_volume(event.percent_value) {
                        Ok(()) => outcome.adjusted += 1,
                        Err(e) => {
                            warn!(key = %key, error = %e, "failed to set session volume");
                            outcome.adjustment_failed = true;
                        }
                    }
                }
            }
        }

        if !outcome.target_found && !self.directory.is_event_driven() {
            outcome.refresh = Some(RefreshKind::Lazy);
        } else if outcome.adjustment_failed {
            outcome.refresh = Some(RefreshKind::Forced);
        }
        if let Some(kind) = outcome.refresh {
            self.refresh.request(kind);
        }

        outcome
    }

    /// Consumes slider moves until the link goes away or shutdown fires.
    pub async fn run(
        self,
        mut moves: mpsc::Receiver<SliderMoveEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let this = Arc::new(self);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                event = moves.recv() => match event {
                    Some(event) => {
                        let routing = Arc::clone(&this);
                        let routed = task::spawn_blocking(move || {
                            let outcome = routing.handle_slider_move(&event);
                            (event, outcome)
                        });
                        let (event, outcome) = match routed.await {
                            Ok(done) => done,
                            Err(e) => {
                                warn!(error = %e, "volume routing task failed");
                                continue;
                            }
                        };
                        debug!(
                            slider = event.slider_id,
                            value = event.percent_value,
                            adjusted = outcome.adjusted,
                            "routed slider move"
                        );
                    }
                    None => break,
                },
            }
        }
        debug!("volume routing stopped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
