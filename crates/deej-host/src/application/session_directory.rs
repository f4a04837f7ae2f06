//! SessionDirectory: the live registry of audio sessions, keyed by lookup key.
//!
//! Every routing pass asks the directory "which sessions answer to
//! `firefox.exe`?".  The directory is kept up to date in one of two ways,
//! depending on what the [`AudioBackend`] supports:
//!
//! - **Event-driven**: the backend pushes [`SessionEvent`]s and the directory
//!   applies them one by one.  The backend owns session lifetimes, so the
//!   directory never releases anything itself.
//! - **Polling**: the directory periodically replaces its contents with a
//!   fresh snapshot from [`AudioBackend::all_sessions`] and releases the
//!   handles it drops.
//!
//! # Locking rules
//!
//! All state sits behind one `std::sync::Mutex`.  The lock is only held for
//! in-memory map changes: backend enumeration and `Session` calls always
//! happen with the lock released, using `Arc` handles copied out of the map.
//! A key is never left with an empty session list.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use deej_core::domain::session::{is_device_session_key, is_reserved_key};
use deej_core::{same_session, RoutingConfig, Session, SessionEvent, SessionEventKind};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Minimum time between two non-forced refreshes.
///
/// Enumerating every session is expensive on most platforms.
pub const MIN_TIME_BETWEEN_REFRESHES: Duration = Duration::from_secs(2);

/// Error type for audio backend operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    /// No backend implementation exists for this platform.
    #[error("audio backend is not supported on this platform: {0}")]
    Unsupported(String),

    /// The backend could not list the current sessions.
    #[error("failed to enumerate audio sessions: {0}")]
    Enumerate(String),

    /// The backend failed to tear down its native resources.
    #[error("failed to release audio backend: {0}")]
    Release(String),
}

/// Source of audio sessions.
///
/// Infrastructure implementations talk to the OS audio stack; test
/// implementations hand out in-memory sessions.
pub trait AudioBackend: Send + Sync {
    /// Returns every session that currently exists.
    ///
    /// Polling backends must return fresh handles on every call; the caller
    /// releases the handles it replaces.
    fn all_sessions(&self) -> Result<Vec<Arc<dyn Session>>, BackendError>;

    /// Event-driven backends return their event stream on the first call.
    /// Polling backends return `None`.
    fn subscribe_events(&self) -> Option<mpsc::Receiver<SessionEvent>>;

    /// Tears down the backend.  Called exactly once, at shutdown.
    fn release(&self) -> Result<(), BackendError>;
}

/// How the directory learns about new and vanished sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    EventDriven,
    Polling,
}

/// Result of [`SessionDirectory::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Skipped: the last refresh was too recent.
    Throttled,
    /// The directory now holds a fresh snapshot of `sessions` sessions.
    Refreshed { sessions: usize },
}

#[derive(Default)]
struct DirectoryState {
    sessions: HashMap<String, Vec<Arc<dyn Session>>>,
    unmapped: Vec<Arc<dyn Session>>,
    mapped_keys: HashSet<String>,
    last_refresh: Option<Instant>,
}

impl DirectoryState {
    fn is_mapped_key(&self, key: &str) -> bool {
        is_reserved_key(key) || is_device_session_key(key) || self.mapped_keys.contains(key)
    }

    fn insert(&mut self, session: Arc<dyn Session>) {
        if !self.is_mapped_key(session.key()) {
            debug!(key = session.key(), "tracking unmapped session");
            self.unmapped.push(Arc::clone(&session));
        }
        self.sessions
            .entry(session.key().to_string())
            .or_default()
            .push(session);
    }

    fn remove(&mut self, session: &Arc<dyn Session>) -> bool {
        let key = session.key();
        let mut removed = false;

        if let Some(list) = self.sessions.get_mut(key) {
            // a refresh racing a queued Added can store the same handle twice
            let before = list.len();
            list.retain(|s| !same_session(s, session));
            removed = list.len() != before;
            if list.is_empty() {
                self.sessions.remove(key);
            }
        }

        self.unmapped.retain(|s| !same_session(s, session));
        removed
    }

    fn take_all(&mut self) -> Vec<Arc<dyn Session>> {
        self.unmapped.clear();
        self.sessions.drain().flat_map(|(_, list)| list).collect()
    }

    fn reclassify(&mut self) {
        let unmapped: Vec<Arc<dyn Session>> = self
            .sessions
            .values()
            .flatten()
            .filter(|s| !self.is_mapped_key(s.key()))
            .cloned()
            .collect();
        self.unmapped = unmapped;
    }

    fn count(&self) -> usize {
        self.sessions.values().map(Vec::len).sum()
    }
}

/// Mutex-guarded map from lookup key to live sessions.
///
/// Created once per engine and shared by `Arc` with the routing use case,
/// the target resolver and the refresh workers.
pub struct SessionDirectory {
    state: Mutex<DirectoryState>,
    backend: Arc<dyn AudioBackend>,
    mode: TrackingMode,
    min_refresh_interval: Duration,
    count_tx: watch::Sender<usize>,
    backend_released: AtomicBool,
}

impl SessionDirectory {
    /// Creates an empty directory classifying sessions against `config`.
    pub fn new(backend: Arc<dyn AudioBackend>, mode: TrackingMode, config: &RoutingConfig) -> Self {
        let (count_tx, _) = watch::channel(0);
        let state = DirectoryState {
            mapped_keys: config.slider_mapping.mapped_keys(),
            ..DirectoryState::default()
        };
        Self {
            state: Mutex::new(state),
            backend,
            mode,
            min_refresh_interval: MIN_TIME_BETWEEN_REFRESHES,
            count_tx,
            backend_released: AtomicBool::new(false),
        }
    }

    /// Overrides the refresh cooldown.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn is_event_driven(&self) -> bool {
        self.mode == TrackingMode::EventDriven
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_count_change(&self) {
        let count = self.session_count();
        self.count_tx.send_replace(count);
    }

    /// Inserts `session` under its key.
    ///
    /// Sessions matching no configured target, reserved key or device name
    /// are also tracked as unmapped.
    pub fn add(&self, session: Arc<dyn Session>) {
        self.lock().insert(session);
        self.notify_count_change();
    }

    /// Removes this exact session (by identity).  Returns `false` if it was
    /// not present.
    pub fn remove(&self, session: &Arc<dyn Session>) -> bool {
        let removed = self.lock().remove(session);
        if removed {
            self.notify_count_change();
        }
        removed
    }

    /// Returns the sessions stored under `key`.  Exact match only; callers
    /// normalise case.  Never returns an empty list.
    pub fn lookup(&self, key: &str) -> Option<Vec<Arc<dyn Session>>> {
        self.lock().sessions.get(key).cloned()
    }

    /// Returns `true` if `session` counts as mapped for `deej.unmapped`.
    pub fn is_mapped(&self, session: &dyn Session) -> bool {
        self.lock().is_mapped_key(session.key())
    }

    /// Keys of all unmapped sessions, de-duplicated in tracking order.
    pub fn unmapped_keys(&self) -> Vec<String> {
        let state = self.lock();
        let mut seen = HashSet::new();
        state
            .unmapped
            .iter()
            .map(|s| s.key().to_string())
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }

    /// Applies a backend add/remove notification.
    pub fn handle_event(&self, event: SessionEvent) {
        match event.kind {
            SessionEventKind::Added => {
                debug!(key = event.session.key(), id = %event.id, "session added");
                self.add(event.session);
            }
            SessionEventKind::Removed => {
                if self.remove(&event.session) {
                    debug!(key = event.session.key(), id = %event.id, "session removed");
                } else {
                    debug!(id = %event.id, "ignoring removal of unknown session");
                }
            }
        }
    }

    /// Re-reads the configured targets and reclassifies every live session.
    pub fn apply_config(&self, config: &RoutingConfig) {
        let mut state = self.lock();
        state.mapped_keys = config.slider_mapping.mapped_keys();
        state.reclassify();
        debug!(unmapped = state.unmapped.len(), "reclassified sessions after config change");
    }

    /// Replaces the contents with a fresh backend snapshot.
    ///
    /// Non-forced refreshes within the cooldown window are skipped.  On
    /// enumeration failure the current contents are kept.  In polling mode
    /// the replaced handles are released.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`BackendError`] if enumeration fails.
    pub fn refresh(&self, force: bool) -> Result<RefreshOutcome, BackendError> {
        {
            let mut state = self.lock();
            if !force {
                if let Some(last) = state.last_refresh {
                    if last.elapsed() < self.min_refresh_interval {
                        return Ok(RefreshOutcome::Throttled);
                    }
                }
            }
            state.last_refresh = Some(Instant::now());
        }

        let fresh = self.backend.all_sessions().map_err(|e| {
            warn!(error = %e, "failed to re-acquire audio sessions");
            e
        })?;
        let sessions = fresh.len();

        let mut stale = {
            let mut state = self.lock();
            let stale = state.take_all();
            for session in &fresh {
                state.insert(Arc::clone(session));
            }
            stale
        };

        if self.mode == TrackingMode::Polling {
            stale.retain(|old| !fresh.iter().any(|new| same_session(old, new)));
            for session in stale {
                session.release();
            }
        }

        self.notify_count_change();
        debug!(sessions, forced = force, "re-acquired audio sessions");
        Ok(RefreshOutcome::Refreshed { sessions })
    }

    /// Total number of sessions across all keys.
    pub fn session_count(&self) -> usize {
        self.lock().count()
    }

    /// All keys currently present, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().sessions.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Receives the session count after every add, remove and refresh.
    ///
    /// Notifications coalesce: a slow reader only sees the latest count.
    pub fn subscribe_count_changes(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Empties the directory and releases the backend.
    ///
    /// In polling mode every held session is released first.  The backend's
    /// `release` runs at most once no matter how often this is called.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`BackendError`] if its release fails.
    pub fn shutdown(&self) -> Result<(), BackendError> {
        let held = self.lock().take_all();
        if self.mode == TrackingMode::Polling {
            for session in held {
                session.release();
            }
        }
        self.notify_count_change();

        if self.backend_released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("releasing audio backend");
        self.backend.release()
    }
}

impl fmt::Display for SessionDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} audio sessions>", self.session_count())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
