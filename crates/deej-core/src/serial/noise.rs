//! Noise filter for raw slider readings.
//!
//! Cheap potentiometers jitter by a few ADC steps even when nobody touches
//! them.  [`significantly_different`] decides whether a new raw reading moved
//! far enough from the last accepted one to be worth acting on.
//!
//! Thresholds are absolute differences on the raw scale (`0..=1023`):
//!
//! | Level     | Threshold |
//! |-----------|-----------|
//! | `none`    | 1         |
//! | `low`     | 5         |
//! | `default` | 10        |
//! | `high`    | 20        |
//!
//! Near either end of the range the threshold is clamped down to the `low`
//! value, and landing exactly on 0 or the maximum always counts, so a slider
//! pushed to its stop reliably reaches a true 0% or 100%.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Largest value the board's 10-bit ADC reports.
pub const MAX_RAW_VALUE: u16 = 1023;

/// Configured noise reduction level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseReduction {
    None,
    Low,
    #[default]
    Default,
    High,
}

impl NoiseReduction {
    /// Parses a configuration value.  Anything unrecognised means `Default`.
    pub fn from_config_str(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "none" => Self::None,
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Default => "default",
            Self::High => "high",
        }
    }
}

impl fmt::Display for NoiseReduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NoiseReduction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_config_str(&raw))
    }
}

/// Tunable thresholds on the raw scale.
///
/// The defaults are empirically chosen; treat them as starting points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseThresholds {
    pub none: u16,
    pub low: u16,
    pub default: u16,
    pub high: u16,
    /// Distance from 0 or `max_raw` within which the threshold drops to `low`.
    pub edge_margin: u16,
    pub max_raw: u16,
}

impl Default for NoiseThresholds {
    fn default() -> Self {
        Self {
            none: 1,
            low: 5,
            default: 10,
            high: 20,
            edge_margin: 10,
            max_raw: MAX_RAW_VALUE,
        }
    }
}

impl NoiseThresholds {
    /// The nominal threshold for `level`, ignoring edge tightening.
    pub fn threshold(&self, level: NoiseReduction) -> u16 {
        match level {
            NoiseReduction::None => self.none,
            NoiseReduction::Low => self.low,
            NoiseReduction::Default => self.default,
            NoiseReduction::High => self.high,
        }
    }

    /// The threshold actually applied to a move landing on `new_raw`.
    pub fn effective_threshold(&self, new_raw: u16, level: NoiseReduction) -> u16 {
        let nominal = self.threshold(level);
        if self.near_edge(new_raw) {
            nominal.min(self.low)
        } else {
            nominal
        }
    }

    fn near_edge(&self, raw: u16) -> bool {
        raw <= self.edge_margin || raw >= self.max_raw.saturating_sub(self.edge_margin)
    }

    /// See [`significantly_different`].
    pub fn significantly_different(&self, old_raw: u16, new_raw: u16, level: NoiseReduction) -> bool {
        if old_raw == new_raw {
            return false;
        }

        if old_raw.abs_diff(new_raw) >= self.effective_threshold(new_raw, level) {
            return true;
        }

        // snap onto the hard stops
        new_raw == 0 || new_raw == self.max_raw
    }
}

/// Returns `true` if moving from `old_raw` to `new_raw` is a real slider move
/// under `level`, using the default thresholds.
pub fn significantly_different(old_raw: u16, new_raw: u16, level: NoiseReduction) -> bool {
    NoiseThresholds::default().significantly_different(old_raw, new_raw, level)
}

/// Maps a raw reading to a volume scalar with two decimals of precision,
/// rounding down (e.g. 512 → 0.50).
pub fn normalize_scalar(raw: u16, max_raw: u16) -> f32 {
    if max_raw == 0 {
        return 0.0;
    }
    let clamped = u32::from(raw.min(max_raw));
    let percent = clamped * 100 / u32::from(max_raw);
    percent as f32 / 100.0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
