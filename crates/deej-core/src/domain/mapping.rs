//! Slider mapping and routing settings.
//!
//! The mapping answers "which targets does slider N control?".  Slider indices
//! are zero-based and follow the order of values in a serial line.

use std::collections::{BTreeMap, HashSet};

use crate::domain::session::MASTER_SESSION_KEY;
use crate::domain::target::Target;
use crate::serial::frame::DecoderSettings;
use crate::serial::noise::NoiseReduction;

/// Ordered list of targets per slider index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliderMapping {
    targets: BTreeMap<usize, Vec<String>>,
}

impl SliderMapping {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// The mapping used when no configuration file exists: slider 0 drives
    /// the master volume.
    pub fn with_master_on_first_slider() -> Self {
        let mut mapping = Self::new();
        mapping.set(0, vec![MASTER_SESSION_KEY.to_string()]);
        mapping
    }

    /// Replaces the targets of `slider`.
    pub fn set(&mut self, slider: usize, targets: Vec<String>) {
        self.targets.insert(slider, targets);
    }

    /// Returns the targets of `slider`, or `None` if it isn't configured.
    pub fn get(&self, slider: usize) -> Option<&[String]> {
        self.targets.get(&slider).map(Vec::as_slice)
    }

    /// Iterates sliders in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[String])> {
        self.targets.iter().map(|(idx, t)| (*idx, t.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Every plain (non-special) target across all sliders, lowercased.
    ///
    /// A session whose key is in this set counts as mapped.
    pub fn mapped_keys(&self) -> HashSet<String> {
        self.targets
            .values()
            .flatten()
            .filter_map(|raw| match Target::parse(raw) {
                Target::Key(key) => Some(key),
                _ => None,
            })
            .collect()
    }
}

impl FromIterator<(usize, Vec<String>)> for SliderMapping {
    fn from_iter<I: IntoIterator<Item = (usize, Vec<String>)>>(iter: I) -> Self {
        Self {
            targets: iter.into_iter().collect(),
        }
    }
}

/// Everything the routing core reads from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingConfig {
    pub slider_mapping: SliderMapping,
    pub invert_sliders: bool,
    pub noise_reduction: NoiseReduction,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            slider_mapping: SliderMapping::with_master_on_first_slider(),
            invert_sliders: false,
            noise_reduction: NoiseReduction::Default,
        }
    }
}

impl RoutingConfig {
    /// The subset of settings the frame decoder needs.
    pub fn decoder_settings(&self) -> DecoderSettings {
        DecoderSettings {
            invert_sliders: self.invert_sliders,
            noise_reduction: self.noise_reduction,
            ..DecoderSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mapping_puts_master_on_slider_zero() {
        let cfg = RoutingConfig::default();
        assert_eq!(cfg.slider_mapping.get(0), Some(&["master".to_string()][..]));
        assert_eq!(cfg.slider_mapping.get(1), None);
        assert!(!cfg.invert_sliders);
        assert_eq!(cfg.noise_reduction, NoiseReduction::Default);
    }

    #[test]
    fn test_mapped_keys_excludes_special_targets_and_lowercases() {
        let mapping: SliderMapping = [
            (0, vec!["Master".to_string()]),
            (1, vec!["Chrome.exe".to_string(), "deej.unmapped".to_string()]),
            (2, vec!["deej.current".to_string()]),
        ]
        .into_iter()
        .collect();

        let keys = mapping.mapped_keys();

        assert_eq!(keys.len(), 2);
        assert!(keys.contains("master"));
        assert!(keys.contains("chrome.exe"));
    }

    #[test]
    fn test_iter_returns_sliders_in_index_order() {
        let mut mapping = SliderMapping::new();
        mapping.set(3, vec!["b".to_string()]);
        mapping.set(1, vec!["a".to_string()]);

        let order: Vec<usize> = mapping.iter().map(|(idx, _)| idx).collect();
        assert_eq!(order, vec![1, 3]);
    }

    #[test]
    fn test_set_replaces_existing_targets() {
        let mut mapping = SliderMapping::with_master_on_first_slider();
        mapping.set(0, vec!["mic".to_string()]);
        assert_eq!(mapping.get(0), Some(&["mic".to_string()][..]));
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn test_decoder_settings_carry_invert_and_noise_level() {
        let cfg = RoutingConfig {
            invert_sliders: true,
            noise_reduction: NoiseReduction::High,
            ..RoutingConfig::default()
        };
        let settings = cfg.decoder_settings();
        assert!(settings.invert_sliders);
        assert_eq!(settings.noise_reduction, NoiseReduction::High);
    }
}
