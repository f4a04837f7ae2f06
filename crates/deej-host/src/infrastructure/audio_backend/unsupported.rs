//! Audio backend for platforms without a native implementation.
//!
//! Every enumeration fails with [`BackendError::Unsupported`], which makes
//! polling-mode startup fail the same way a broken native backend would.

use std::sync::Arc;

use deej_core::{Session, SessionEvent};
use tokio::sync::mpsc;

use crate::application::session_directory::{AudioBackend, BackendError};

pub struct UnsupportedAudioBackend {
    platform: &'static str,
}

impl UnsupportedAudioBackend {
    pub fn new() -> Self {
        Self {
            platform: std::env::consts::OS,
        }
    }
}

impl Default for UnsupportedAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for UnsupportedAudioBackend {
    fn all_sessions(&self) -> Result<Vec<Arc<dyn Session>>, BackendError> {
        Err(BackendError::Unsupported(self.platform.to_string()))
    }

    fn subscribe_events(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        None
    }

    fn release(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
