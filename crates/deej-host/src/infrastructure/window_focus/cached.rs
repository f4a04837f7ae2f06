//! Cooldown cache in front of a [`ForegroundWindow`] implementation.
//!
//! Querying the foreground window means walking OS window and process
//! tables.  A slider dragged from bottom to top produces dozens of moves in a
//! fraction of a second, so results are reused for [`FOCUS_QUERY_COOLDOWN`].
//!
//! Only successful answers are cached, and the plain and fullscreen queries
//! are cached independently.  Errors are passed straight through so a
//! transient failure is retried on the next move.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::application::target_resolver::{FocusError, ForegroundWindow};

/// How long a successful answer is reused.
pub const FOCUS_QUERY_COOLDOWN: Duration = Duration::from_millis(350);

#[derive(Debug, Clone)]
struct CachedAnswer {
    at: Instant,
    names: Vec<String>,
}

#[derive(Debug, Default)]
struct Cache {
    windowed: Option<CachedAnswer>,
    fullscreen: Option<CachedAnswer>,
}

impl Cache {
    fn slot(&mut self, check_fullscreen: bool) -> &mut Option<CachedAnswer> {
        if check_fullscreen {
            &mut self.fullscreen
        } else {
            &mut self.windowed
        }
    }
}

/// Wraps `inner`, reusing its successful answers for a cooldown period.
pub struct CachedForegroundWindow {
    inner: Arc<dyn ForegroundWindow>,
    cooldown: Duration,
    cache: Mutex<Cache>,
}

impl CachedForegroundWindow {
    pub fn new(inner: Arc<dyn ForegroundWindow>) -> Self {
        Self::with_cooldown(inner, FOCUS_QUERY_COOLDOWN)
    }

    pub fn with_cooldown(inner: Arc<dyn ForegroundWindow>, cooldown: Duration) -> Self {
        Self {
            inner,
            cooldown,
            cache: Mutex::new(Cache::default()),
        }
    }
}

impl ForegroundWindow for CachedForegroundWindow {
    fn foreground_process_names(&self, check_fullscreen: bool) -> Result<Vec<String>, FocusError> {
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let slot = cache.slot(check_fullscreen);

        if let Some(answer) = slot.as_ref() {
            if answer.at.elapsed() < self.cooldown {
                return Ok(answer.names.clone());
            }
        }

        // The lock is held across the query so concurrent callers share it.
        let names = self.inner.foreground_process_names(check_fullscreen)?;
        *slot = Some(CachedAnswer {
            at: Instant::now(),
            names: names.clone(),
        });
        Ok(names)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
