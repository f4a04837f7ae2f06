//! Foreground window query for platforms without an implementation.

use crate::application::target_resolver::{FocusError, ForegroundWindow};

#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedForegroundWindow;

impl ForegroundWindow for UnsupportedForegroundWindow {
    fn foreground_process_names(&self, _check_fullscreen: bool) -> Result<Vec<String>, FocusError> {
        Err(FocusError::Unsupported)
    }
}
