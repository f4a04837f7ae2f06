//! In-memory audio backend.
//!
//! Simulates an OS audio stack: sessions are added and removed from code, and
//! every volume change is recorded.  It is used by the test suite and as the
//! stand-in backend on platforms without a native implementation.
//!
//! # Two modes
//!
//! - **Polling** (`InMemoryAudioBackend::polling`): every `all_sessions` call
//!   returns *fresh* handles, like a native API that hands out new COM/D-Bus
//!   objects per enumeration.  Handles share their [`SessionControl`], so a
//!   volume set through any handle is visible through all of them.
//! - **Event-driven** (`InMemoryAudioBackend::event_driven`): `all_sessions`
//!   returns the same handle for a session every time, and `add_session` /
//!   `remove_session` publish events through a [`SessionEventPublisher`].
//!
//! # Usage in tests
//!
//! ```rust,ignore
//! let backend = Arc::new(InMemoryAudioBackend::polling());
//! let firefox = backend.add_session("firefox.exe");
//! // … route a slider move …
//! assert_eq!(firefox.control.volume(), 0.5);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use deej_core::{Session, SessionError, SessionEvent, SessionId};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::application::session_directory::{AudioBackend, BackendError, TrackingMode};
use crate::infrastructure::audio_backend::SessionEventPublisher;

/// Volume a newly added session starts at.
pub const DEFAULT_SESSION_VOLUME: f32 = 1.0;

// ── SessionControl ────────────────────────────────────────────────────────────

/// The "OS side" of a fake session, shared by every handle to it.
#[derive(Debug)]
pub struct SessionControl {
    volume: Mutex<f32>,
    set_calls: Mutex<Vec<f32>>,
    fail_set_volume: AtomicBool,
}

impl SessionControl {
    fn new(volume: f32) -> Self {
        Self {
            volume: Mutex::new(volume),
            set_calls: Mutex::new(Vec::new()),
            fail_set_volume: AtomicBool::new(false),
        }
    }

    /// Current volume.
    pub fn volume(&self) -> f32 {
        *lock(&self.volume)
    }

    /// Every successfully applied volume, in order.
    pub fn set_calls(&self) -> Vec<f32> {
        lock(&self.set_calls).clone()
    }

    /// Makes subsequent `set_volume` calls fail (e.g. the process exited).
    pub fn set_failing(&self, failing: bool) {
        self.fail_set_volume.store(failing, Ordering::SeqCst);
    }
}

/// Handle to a fake session returned by [`InMemoryAudioBackend::add_session`].
#[derive(Debug, Clone)]
pub struct InMemoryHandle {
    pub id: SessionId,
    pub control: Arc<SessionControl>,
}

// ── InMemorySession ───────────────────────────────────────────────────────────

/// One handle to a fake session, as held by the directory.
#[derive(Debug)]
pub struct InMemorySession {
    key: String,
    control: Arc<SessionControl>,
    released: AtomicBool,
    releases: Arc<AtomicUsize>,
}

impl InMemorySession {
    fn new(key: &str, control: Arc<SessionControl>, releases: Arc<AtomicUsize>) -> Self {
        Self {
            key: key.to_string(),
            control,
            released: AtomicBool::new(false),
            releases,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Session for InMemorySession {
    fn key(&self) -> &str {
        &self.key
    }

    fn volume(&self) -> f32 {
        self.control.volume()
    }

    fn set_volume(&self, volume: f32) -> Result<(), SessionError> {
        if self.is_released() {
            return Err(SessionError::Released(self.key.clone()));
        }
        if !(0.0..=1.0).contains(&volume) {
            return Err(SessionError::VolumeOutOfRange(volume));
        }
        if self.control.fail_set_volume.load(Ordering::SeqCst) {
            return Err(SessionError::SetVolume {
                key: self.key.clone(),
                reason: "session is no longer available".to_string(),
            });
        }

        *lock(&self.control.volume) = volume;
        lock(&self.control.set_calls).push(volume);
        Ok(())
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ── InMemoryAudioBackend ──────────────────────────────────────────────────────

struct Entry {
    id: SessionId,
    key: String,
    control: Arc<SessionControl>,
    /// Stable handle, used in event-driven mode only.
    handle: Arc<InMemorySession>,
}

#[derive(Default)]
struct BackendState {
    entries: Vec<Entry>,
    pending_events: Option<mpsc::Receiver<SessionEvent>>,
    fail_enumeration: bool,
}

/// Fake audio stack.  See the module docs.
pub struct InMemoryAudioBackend {
    mode: TrackingMode,
    state: Mutex<BackendState>,
    publisher: Option<SessionEventPublisher>,
    session_releases: Arc<AtomicUsize>,
    backend_releases: AtomicUsize,
}

impl InMemoryAudioBackend {
    /// Backend that must be polled for its sessions.
    pub fn polling() -> Self {
        Self {
            mode: TrackingMode::Polling,
            state: Mutex::new(BackendState::default()),
            publisher: None,
            session_releases: Arc::new(AtomicUsize::new(0)),
            backend_releases: AtomicUsize::new(0),
        }
    }

    /// Backend that pushes session changes as events.
    pub fn event_driven() -> Self {
        let (publisher, rx) = SessionEventPublisher::channel();
        Self {
            mode: TrackingMode::EventDriven,
            state: Mutex::new(BackendState {
                pending_events: Some(rx),
                ..BackendState::default()
            }),
            publisher: Some(publisher),
            session_releases: Arc::new(AtomicUsize::new(0)),
            backend_releases: AtomicUsize::new(0),
        }
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    /// Starts a fake session at [`DEFAULT_SESSION_VOLUME`].
    pub fn add_session(&self, key: &str) -> InMemoryHandle {
        self.add_session_with_volume(key, DEFAULT_SESSION_VOLUME)
    }

    /// Starts a fake session at `volume`.  Publishes an `Added` event in
    /// event-driven mode.
    pub fn add_session_with_volume(&self, key: &str, volume: f32) -> InMemoryHandle {
        let id = SessionId::new(Uuid::new_v4().to_string());
        let control = Arc::new(SessionControl::new(volume));
        let handle = Arc::new(InMemorySession::new(
            key,
            Arc::clone(&control),
            Arc::clone(&self.session_releases),
        ));

        lock(&self.state).entries.push(Entry {
            id: id.clone(),
            key: key.to_string(),
            control: Arc::clone(&control),
            handle: Arc::clone(&handle),
        });

        if let Some(publisher) = &self.publisher {
            publisher.publish(SessionEvent::added(id.clone(), handle));
        }

        InMemoryHandle { id, control }
    }

    /// Ends a fake session.  Publishes a `Removed` event in event-driven mode.
    /// Returns `false` if `id` is unknown.
    pub fn remove_session(&self, id: &SessionId) -> bool {
        let removed = {
            let mut state = lock(&self.state);
            match state.entries.iter().position(|e| &e.id == id) {
                Some(index) => state.entries.remove(index),
                None => return false,
            }
        };

        if let Some(publisher) = &self.publisher {
            publisher.publish(SessionEvent::removed(removed.id, removed.handle));
        }
        true
    }

    /// Makes `all_sessions` fail until switched back.
    pub fn set_fail_enumeration(&self, fail: bool) {
        lock(&self.state).fail_enumeration = fail;
    }

    /// How many session handles have been released so far.
    pub fn released_session_count(&self) -> usize {
        self.session_releases.load(Ordering::SeqCst)
    }

    /// How many times the backend itself was released.
    pub fn backend_release_count(&self) -> usize {
        self.backend_releases.load(Ordering::SeqCst)
    }
}

impl AudioBackend for InMemoryAudioBackend {
    fn all_sessions(&self) -> Result<Vec<Arc<dyn Session>>, BackendError> {
        let state = lock(&self.state);
        if state.fail_enumeration {
            return Err(BackendError::Enumerate(
                "in-memory backend set to fail".to_string(),
            ));
        }

        let sessions = state
            .entries
            .iter()
            .map(|entry| match self.mode {
                TrackingMode::EventDriven => Arc::clone(&entry.handle) as Arc<dyn Session>,
                TrackingMode::Polling => Arc::new(InMemorySession::new(
                    &entry.key,
                    Arc::clone(&entry.control),
                    Arc::clone(&self.session_releases),
                )) as Arc<dyn Session>,
            })
            .collect();
        Ok(sessions)
    }

    fn subscribe_events(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        lock(&self.state).pending_events.take()
    }

    fn release(&self) -> Result<(), BackendError> {
        self.backend_releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Locks `mutex`, recovering the data if a panicking thread poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use deej_core::{same_session, SessionEventKind};

    #[test]
    fn test_polling_backend_hands_out_fresh_handles_per_snapshot() {
        // Arrange
        let backend = InMemoryAudioBackend::polling();
        let handle = backend.add_session("spotify.exe");

        // Act
        let first = backend.all_sessions().unwrap();
        let second = backend.all_sessions().unwrap();

        // Assert – different handles, shared underlying session
        assert!(!same_session(&first[0], &second[0]));
        first[0].set_volume(0.25).unwrap();
        assert_eq!(second[0].volume(), 0.25);
        assert_eq!(handle.control.set_calls(), vec![0.25]);
    }

    #[test]
    fn test_polling_backend_has_no_event_stream() {
        let backend = InMemoryAudioBackend::polling();
        assert!(backend.subscribe_events().is_none());
    }

    #[test]
    fn test_event_backend_publishes_add_and_remove() {
        // Arrange
        let backend = InMemoryAudioBackend::event_driven();
        let mut events = backend.subscribe_events().expect("event stream");

        // Act
        let handle = backend.add_session("discord.exe");
        assert!(backend.remove_session(&handle.id));

        // Assert
        let added = events.try_recv().unwrap();
        let removed = events.try_recv().unwrap();
        assert_eq!(added.kind, SessionEventKind::Added);
        assert_eq!(removed.kind, SessionEventKind::Removed);
        assert_eq!(added.id, handle.id);
        assert!(same_session(&added.session, &removed.session));
        assert!(backend.subscribe_events().is_none(), "stream is handed out once");
    }

    #[test]
    fn test_event_backend_snapshot_returns_stable_handles() {
        let backend = InMemoryAudioBackend::event_driven();
        backend.add_session("master");

        let first = backend.all_sessions().unwrap();
        let second = backend.all_sessions().unwrap();

        assert!(same_session(&first[0], &second[0]));
    }

    #[test]
    fn test_failing_control_rejects_volume_changes() {
        let backend = InMemoryAudioBackend::polling();
        let handle = backend.add_session("game.exe");
        let sessions = backend.all_sessions().unwrap();

        handle.control.set_failing(true);

        assert!(matches!(
            sessions[0].set_volume(0.5),
            Err(SessionError::SetVolume { .. })
        ));
        assert_eq!(handle.control.volume(), DEFAULT_SESSION_VOLUME);
    }

    #[test]
    fn test_released_handle_rejects_volume_changes_and_counts_once() {
        let backend = InMemoryAudioBackend::polling();
        backend.add_session("vlc.exe");
        let session = backend.all_sessions().unwrap().remove(0);

        session.release();
        session.release();

        assert!(matches!(session.set_volume(0.1), Err(SessionError::Released(_))));
        assert_eq!(backend.released_session_count(), 1);
    }

    #[test]
    fn test_enumeration_failure_toggle() {
        let backend = InMemoryAudioBackend::polling();
        backend.set_fail_enumeration(true);
        assert!(matches!(backend.all_sessions(), Err(BackendError::Enumerate(_))));

        backend.set_fail_enumeration(false);
        assert!(backend.all_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_remove_unknown_session_returns_false() {
        let backend = InMemoryAudioBackend::polling();
        assert!(!backend.remove_session(&SessionId::from("nope")));
    }
}
