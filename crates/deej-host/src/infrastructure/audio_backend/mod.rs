//! Audio backend implementations.
//!
//! A backend is the only place that talks to the OS audio stack.  The
//! routing core sees it through the
//! [`AudioBackend`](crate::application::session_directory::AudioBackend)
//! trait and never touches native handles directly.
//!
//! # Event-driven backends and back-pressure (for beginners)
//!
//! OS audio APIs deliver "session created" / "session expired" callbacks on
//! their own internal threads.  Blocking such a thread (for instance on a
//! full channel) can deadlock the audio subsystem, so event-driven backends
//! publish through a [`SessionEventPublisher`], which never blocks: when the
//! channel is full the event is dropped and a warning is logged.

use std::sync::Arc;

use deej_core::SessionEvent;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::application::session_directory::AudioBackend;

pub mod in_memory;
pub mod unsupported;

/// The native backend for the current platform.
///
/// No OS audio stack is bound in this build, so this is always
/// [`unsupported::UnsupportedAudioBackend`]: the engine then refuses to start
/// with a clear "not supported" error.
pub fn native_backend() -> Arc<dyn AudioBackend> {
    Arc::new(unsupported::UnsupportedAudioBackend::new())
}

/// Capacity of the backend → directory event channel.
pub const SESSION_EVENT_CHANNEL_CAPACITY: usize = 100;

/// Non-blocking sender side of a backend's session event stream.
#[derive(Debug, Clone)]
pub struct SessionEventPublisher {
    tx: mpsc::Sender<SessionEvent>,
}

impl SessionEventPublisher {
    /// Creates a publisher and its receiver with the default capacity.
    pub fn channel() -> (Self, mpsc::Receiver<SessionEvent>) {
        Self::with_capacity(SESSION_EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queues `event` without blocking.  Returns `false` if it was dropped.
    pub fn publish(&self, event: SessionEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(
                    key = event.session.key(),
                    id = %event.id,
                    "session event channel full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!(id = %event.id, "session event receiver gone, dropping event");
                false
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
