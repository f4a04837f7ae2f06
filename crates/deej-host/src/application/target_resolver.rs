//! TargetResolver: turns a configured target string into concrete lookup keys.
//!
//! | Configured target         | Resolves to                                  |
//! |---------------------------|----------------------------------------------|
//! | `Chrome.exe`              | `["chrome.exe"]`                             |
//! | `deej.current`            | process name(s) behind the foreground window |
//! | `deej.current.fullscreen` | as above, only while it is fullscreen        |
//! | `deej.unmapped`           | keys of every unmapped live session          |
//! | `deej.anything-else`      | `[]`                                         |
//!
//! Resolution runs for every slider move, so it never fails loudly: a
//! window-focus error (commonly "not supported on this OS") resolves to
//! nothing.

use std::collections::HashSet;
use std::sync::Arc;

use deej_core::{SpecialTarget, Target};
use thiserror::Error;
use tracing::debug;

use crate::application::session_directory::SessionDirectory;

/// Error type for foreground window queries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FocusError {
    /// This platform has no foreground window support.
    #[error("foreground window lookup is not supported on this platform")]
    Unsupported,

    /// The OS query failed.
    #[error("foreground window query failed: {0}")]
    Query(String),
}

/// Foreground window collaborator.
///
/// Implementations must be cheap enough to call on every slider move; see
/// `CachedForegroundWindow` in the infrastructure layer.
#[cfg_attr(test, mockall::automock)]
pub trait ForegroundWindow: Send + Sync {
    /// Names of the process(es) behind the foreground window.
    ///
    /// A single window can be backed by several processes (e.g. a container
    /// host plus the app it renders), so all of them are returned.  With
    /// `check_fullscreen` set, returns an empty list unless the window is
    /// fullscreen.
    fn foreground_process_names(&self, check_fullscreen: bool) -> Result<Vec<String>, FocusError>;
}

/// Resolves configured targets against the directory and the focus query.
pub struct TargetResolver {
    directory: Arc<SessionDirectory>,
    focus: Arc<dyn ForegroundWindow>,
}

impl TargetResolver {
    pub fn new(directory: Arc<SessionDirectory>, focus: Arc<dyn ForegroundWindow>) -> Self {
        Self { directory, focus }
    }

    /// Returns the lookup keys `raw` currently stands for.
    pub fn resolve(&self, raw: &str) -> Vec<String> {
        match Target::parse(raw) {
            Target::Key(key) => vec![key],
            Target::Special(SpecialTarget::CurrentWindow) => self.foreground(false),
            Target::Special(SpecialTarget::CurrentFullscreenWindow) => self.foreground(true),
            Target::Special(SpecialTarget::AllUnmapped) => self.directory.unmapped_keys(),
            Target::UnknownSpecial(name) => {
                debug!(configured = raw, special = %name, "unknown special target");
                Vec::new()
            }
        }
    }

    fn foreground(&self, check_fullscreen: bool) -> Vec<String> {
        match self.focus.foreground_process_names(check_fullscreen) {
            Ok(names) => {
                let mut seen = HashSet::new();
                names
                    .into_iter()
                    .map(|name| name.to_lowercase())
                    .filter(|name| seen.insert(name.clone()))
                    .collect()
            }
            Err(_) => Vec::new(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
