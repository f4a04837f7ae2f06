//! Audio sessions: the volume-controllable endpoints exposed by an audio backend.
//!
//! A session is one of:
//!
//! - a per-process session (key = lowercased process name, e.g. `"firefox.exe"`),
//! - a device master session (key = the device friendly name, e.g.
//!   `"Speakers (Realtek Audio)"`), or
//! - one of the reserved system sessions: `master`, `system`, `mic`.
//!
//! Sessions are created and owned by the audio backend.  Everything else holds
//! them behind `Arc<dyn Session>` and hands them back through
//! [`Session::release`] exactly once when they are no longer needed.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Key of the default output device's master volume.
pub const MASTER_SESSION_KEY: &str = "master";
/// Key of the system sounds session.
pub const SYSTEM_SESSION_KEY: &str = "system";
/// Key of the default input device's level.
pub const INPUT_SESSION_KEY: &str = "mic";

/// Keys that are always considered mapped, even when absent from the config.
pub const RESERVED_SESSION_KEYS: [&str; 3] =
    [MASTER_SESSION_KEY, SYSTEM_SESSION_KEY, INPUT_SESSION_KEY];

/// Error type for operations on a single session.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    /// The backend rejected the volume change (commonly a stale handle to a
    /// process that already exited).
    #[error("failed to set volume on session {key}: {reason}")]
    SetVolume { key: String, reason: String },

    /// The requested volume is outside `0.0..=1.0`.
    #[error("volume {0} is outside the range 0.0..=1.0")]
    VolumeOutOfRange(f32),

    /// The session has already been released and must not be touched.
    #[error("session {0} has already been released")]
    Released(String),
}

/// One controllable audio endpoint.
///
/// Implementations live in the audio backend; the routing core is agnostic to
/// which variant (process, device, system master) it holds.
pub trait Session: Send + Sync + fmt::Debug {
    /// The logical lookup key for this session.
    ///
    /// Process sessions return their lowercased process name.
    fn key(&self) -> &str;

    /// The current volume scalar in `0.0..=1.0`.
    fn volume(&self) -> f32;

    /// Sets the volume scalar.  May block on the OS audio subsystem.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the backend cannot apply the change.
    fn set_volume(&self, volume: f32) -> Result<(), SessionError>;

    /// Gives the underlying native handle back to the backend.
    fn release(&self);
}

/// Opaque backend-assigned identifier of a session.
///
/// Only used to match `Removed` events against earlier `Added` events; never
/// used for routing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Whether a session appeared or went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    Added,
    Removed,
}

/// A change in the backend's view of live sessions.
///
/// For any [`SessionId`], an `Added` event precedes exactly one later
/// `Removed` event.  A `Removed` event for an unknown id is a no-op.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub id: SessionId,
    pub session: Arc<dyn Session>,
}

impl SessionEvent {
    pub fn added(id: SessionId, session: Arc<dyn Session>) -> Self {
        Self {
            kind: SessionEventKind::Added,
            id,
            session,
        }
    }

    pub fn removed(id: SessionId, session: Arc<dyn Session>) -> Self {
        Self {
            kind: SessionEventKind::Removed,
            id,
            session,
        }
    }
}

/// Returns `true` if both handles point at the same session object.
///
/// Compares the data pointers only; vtable pointers for the same type may
/// differ between codegen units.
pub fn same_session(a: &Arc<dyn Session>, b: &Arc<dyn Session>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Returns `true` for `master`, `system` and `mic`.
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_SESSION_KEYS.contains(&key)
}

/// Returns `true` if `key` looks like a device friendly name with a trailing
/// parenthetical, e.g. `"Headphones (Realtek Audio)"`.
///
/// Equivalent to the pattern `^.+ \(.+\)$`.
pub fn is_device_session_key(key: &str) -> bool {
    let Some(body) = key.strip_suffix(')') else {
        return false;
    };
    body.match_indices(" (")
        .any(|(idx, _)| idx > 0 && idx + 2 < body.len())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
