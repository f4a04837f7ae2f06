//! Configured target strings.
//!
//! A target is what a slider controls: a process name (`"chrome.exe"`), a
//! reserved key (`"master"`), a device friendly name, or a special target
//! prefixed with `deej.` that is resolved dynamically at routing time.
//!
//! Matching is case-insensitive: every target is lowercased before use.

/// Prefix marking targets that need dynamic resolution.
///
/// Keeps special names from colliding with a similarly named process.
pub const SPECIAL_TARGET_PREFIX: &str = "deej.";

/// The special targets understood after the `deej.` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialTarget {
    /// `deej.current`: the process(es) behind the foreground window.
    CurrentWindow,
    /// `deej.current.fullscreen`: as above, only when that window is fullscreen.
    CurrentFullscreenWindow,
    /// `deej.unmapped`: every live session no slider is configured for.
    AllUnmapped,
}

impl SpecialTarget {
    /// Parses the part after the prefix.  Expects lowercase input.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "current" => Some(Self::CurrentWindow),
            "current.fullscreen" => Some(Self::CurrentFullscreenWindow),
            "unmapped" => Some(Self::AllUnmapped),
            _ => None,
        }
    }

    /// The full configured spelling, including the prefix.
    pub fn as_target_str(&self) -> &'static str {
        match self {
            Self::CurrentWindow => "deej.current",
            Self::CurrentFullscreenWindow => "deej.current.fullscreen",
            Self::AllUnmapped => "deej.unmapped",
        }
    }
}

/// A configured target after case normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A plain lookup key, already lowercased.
    Key(String),
    /// A recognised special target.
    Special(SpecialTarget),
    /// `deej.` followed by a name we don't know.  Resolves to nothing.
    UnknownSpecial(String),
}

impl Target {
    /// Lowercases `raw` and classifies it.
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.to_lowercase();
        match lowered.strip_prefix(SPECIAL_TARGET_PREFIX) {
            Some(name) => match SpecialTarget::from_name(name) {
                Some(special) => Self::Special(special),
                None => Self::UnknownSpecial(name.to_string()),
            },
            None => Self::Key(lowered),
        }
    }

    /// Returns `true` for anything carrying the `deej.` prefix.
    pub fn is_special(&self) -> bool {
        !matches!(self, Self::Key(_))
    }
}
