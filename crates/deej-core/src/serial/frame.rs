//! Frame decoder: turns one text line from the board into slider move events.
//!
//! Line grammar:
//! ```text
//! <value>(|<value>)*<EOL>      value = 1..=4 ASCII digits, EOL = "\r\n" or "\n"
//! ```
//! e.g. `512|0|0|1023|0\r\n` reports five sliders.
//!
//! # Why keep state? (for beginners)
//!
//! The board sends the position of *every* slider many times per second, even
//! when nothing moves.  The decoder remembers the last accepted raw reading
//! per slider and only emits a [`SliderMoveEvent`] when the noise filter says
//! a reading changed enough.  When the number of sliders in a line changes,
//! all remembered readings are forgotten so that every slider re-emits.
//!
//! Decoding is deterministic: the same prior state and the same line always
//! produce the same events.  No clock, no randomness.

use thiserror::Error;
use tracing::trace;

use crate::serial::noise::{normalize_scalar, NoiseReduction, NoiseThresholds};

/// Longest digit group accepted for a single value.
pub const MAX_VALUE_DIGITS: usize = 4;

/// Why a line was thrown away.
///
/// Never surfaced past the decoder; line noise right after (re)connecting is
/// routine.  Exposed so callers can log it at trace level or test against it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("line has no line terminator")]
    MissingTerminator,

    #[error("line is empty")]
    Empty,

    /// A value group is empty, too long, or contains a non-digit.
    #[error("malformed value group {index}: {group:?}")]
    MalformedValue { index: usize, group: String },

    /// The first value exceeds the raw range, usually a torn first read.
    #[error("first value {0} exceeds the raw range")]
    FirstValueOutOfRange(u16),
}

/// Settings the decoder reads on every line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecoderSettings {
    pub invert_sliders: bool,
    pub noise_reduction: NoiseReduction,
    pub thresholds: NoiseThresholds,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            invert_sliders: false,
            noise_reduction: NoiseReduction::Default,
            thresholds: NoiseThresholds::default(),
        }
    }
}

/// An accepted slider change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliderMoveEvent {
    /// Zero-based position of the value in the line.
    pub slider_id: usize,
    /// Target volume in `0.0..=1.0`, already inverted if configured.
    pub percent_value: f32,
}

/// Per-slider last accepted reading.  `None` is the sentinel that forces the
/// next reading through the noise filter unconditionally.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SliderState {
    raw: Option<u16>,
    scalar: f32,
}

impl SliderState {
    const UNKNOWN: Self = Self {
        raw: None,
        scalar: 0.0,
    };
}

/// Stateful decoder for one serial connection.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    settings: DecoderSettings,
    sliders: Vec<SliderState>,
}

impl FrameDecoder {
    pub fn new(settings: DecoderSettings) -> Self {
        Self {
            settings,
            sliders: Vec::new(),
        }
    }

    pub fn settings(&self) -> &DecoderSettings {
        &self.settings
    }

    /// Swaps the settings used for subsequent lines.  Stored readings are kept.
    pub fn set_settings(&mut self, settings: DecoderSettings) {
        self.settings = settings;
    }

    /// Forgets every stored reading so the next valid line emits one event per
    /// slider.  Used after reconnecting and after a configuration reload.
    pub fn reset(&mut self) {
        self.sliders.clear();
    }

    /// Number of sliders seen in the last valid line, 0 before the first one.
    pub fn slider_count(&self) -> usize {
        self.sliders.len()
    }

    /// Last accepted scalar of `slider_id`, if one was ever accepted.
    pub fn last_value(&self, slider_id: usize) -> Option<f32> {
        self.sliders
            .get(slider_id)
            .filter(|s| s.raw.is_some())
            .map(|s| s.scalar)
    }

    /// Decodes one line, updating state and returning the accepted moves in
    /// slider order.  Malformed lines yield no events and leave state untouched.
    pub fn decode(&mut self, line: &str) -> Vec<SliderMoveEvent> {
        let values = match parse_line(line, self.settings.thresholds.max_raw) {
            Ok(values) => values,
            Err(e) => {
                trace!(error = %e, line = line.trim_end(), "discarding serial line");
                return Vec::new();
            }
        };

        if values.len() != self.sliders.len() {
            trace!(
                previous = self.sliders.len(),
                current = values.len(),
                "slider count changed, resetting state"
            );
            self.sliders = vec![SliderState::UNKNOWN; values.len()];
        }

        let max_raw = self.settings.thresholds.max_raw;
        let mut events = Vec::new();

        for (slider_id, raw) in values.into_iter().enumerate() {
            let raw = raw.min(max_raw);
            let state = &mut self.sliders[slider_id];

            let accepted = match state.raw {
                None => true,
                Some(old) => self.settings.thresholds.significantly_different(
                    old,
                    raw,
                    self.settings.noise_reduction,
                ),
            };
            if !accepted {
                continue;
            }

            let mut scalar = normalize_scalar(raw, max_raw);
            if self.settings.invert_sliders {
                scalar = 1.0 - scalar;
            }

            *state = SliderState {
                raw: Some(raw),
                scalar,
            };
            events.push(SliderMoveEvent {
                slider_id,
                percent_value: scalar,
            });
        }

        events
    }
}

/// Validates `line` against the grammar and returns its raw values.
///
/// # Errors
///
/// Returns [`FrameError`] describing the first violation found.
pub fn parse_line(line: &str, max_raw: u16) -> Result<Vec<u16>, FrameError> {
    let body = line
        .strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .ok_or(FrameError::MissingTerminator)?;

    if body.is_empty() {
        return Err(FrameError::Empty);
    }

    let mut values = Vec::new();
    for (index, group) in body.split('|').enumerate() {
        if group.is_empty()
            || group.len() > MAX_VALUE_DIGITS
            || !group.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(FrameError::MalformedValue {
                index,
                group: group.to_string(),
            });
        }
        // at most four digits, always fits
        let value: u16 = group.parse().map_err(|_| FrameError::MalformedValue {
            index,
            group: group.to_string(),
        })?;
        values.push(value);
    }

    if values[0] > max_raw {
        return Err(FrameError::FirstValueOutOfRange(values[0]));
    }

    Ok(values)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
