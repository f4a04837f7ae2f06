//! TOML-based configuration for the deej host.
//!
//! Reads [`AppConfig`] from the platform-appropriate path:
//! - Windows:  `%APPDATA%\deej\config.toml`
//! - Linux:    `~/.config/deej/config.toml`
//! - macOS:    `~/Library/Application Support/deej/config.toml`
//!
//! # File layout (for beginners)
//!
//! ```toml
//! invert_sliders = false
//! noise_reduction = "default"   # none | low | default | high
//!
//! [slider_mapping]              # slider index -> one target or a list
//! 0 = "master"
//! 1 = ["chrome.exe", "firefox.exe"]
//! 2 = "deej.unmapped"
//!
//! [connection]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//!
//! [logging]
//! log_level = "info"
//! ```
//!
//! Plain keys must come before the first `[table]` header; anything written
//! after `[slider_mapping]` belongs to that table.
//!
//! Every field is optional.  Fields annotated with
//! `#[serde(default = "some_fn")]` take `some_fn()` when absent, so a missing
//! or half-written file still yields a usable configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use deej_core::{NoiseReduction, RoutingConfig, SliderMapping};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::infrastructure::slider_link::{
    default_port, ConnectionSettings, LinkSettings, DEFAULT_BAUD_RATE,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The file watcher could not be set up.
    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Targets of one slider: a single string or a list.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TargetList {
    One(String),
    Many(Vec<String>),
}

impl TargetList {
    /// Non-blank targets, trimmed, in configured order.
    pub fn targets(&self) -> Vec<String> {
        let raw: &[String] = match self {
            TargetList::One(target) => std::slice::from_ref(target),
            TargetList::Many(targets) => targets,
        };
        raw.iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub invert_sliders: bool,
    /// Unknown levels fall back to `default`.
    #[serde(default)]
    pub noise_reduction: NoiseReduction,
    /// Keys are slider indices written as strings (`"0"`, `"1"`, ...).
    #[serde(default = "default_slider_mapping")]
    pub slider_mapping: BTreeMap<String, TargetList>,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial connection settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// Device path (`/dev/ttyUSB0`) or port name (`COM4`).
    #[serde(default = "default_port_string")]
    pub port: String,
    /// Kept signed so a stray `0` or `-1` in the file parses and can be
    /// replaced by the default with a warning.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: i64,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_slider_mapping() -> BTreeMap<String, TargetList> {
    BTreeMap::from([("0".to_string(), TargetList::One("master".to_string()))])
}
fn default_port_string() -> String {
    default_port().to_string()
}
fn default_baud_rate() -> i64 {
    i64::from(DEFAULT_BAUD_RATE)
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            invert_sliders: false,
            noise_reduction: NoiseReduction::Default,
            slider_mapping: default_slider_mapping(),
            connection: ConnectionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: default_port_string(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// ── Conversions into runtime settings ─────────────────────────────────────────

impl AppConfig {
    /// Builds the slider mapping, skipping entries whose key is not a slider
    /// index or whose target list is empty.
    pub fn slider_mapping(&self) -> SliderMapping {
        self.slider_mapping
            .iter()
            .filter_map(|(key, targets)| {
                let Ok(slider) = key.trim().parse::<usize>() else {
                    warn!(key = %key, "ignoring slider mapping entry with a non-numeric slider index");
                    return None;
                };
                let targets = targets.targets();
                (!targets.is_empty()).then_some((slider, targets))
            })
            .collect()
    }

    pub fn routing_config(&self) -> RoutingConfig {
        RoutingConfig {
            slider_mapping: self.slider_mapping(),
            invert_sliders: self.invert_sliders,
            noise_reduction: self.noise_reduction,
        }
    }

    /// Serial connection settings.  A non-positive or oversized baud rate is
    /// replaced by [`DEFAULT_BAUD_RATE`].
    pub fn connection_settings(&self) -> ConnectionSettings {
        let baud_rate = match u32::try_from(self.connection.baud_rate) {
            Ok(rate) if rate > 0 => rate,
            _ => {
                warn!(
                    configured = self.connection.baud_rate,
                    default = DEFAULT_BAUD_RATE,
                    "invalid baud rate, using default"
                );
                DEFAULT_BAUD_RATE
            }
        };
        ConnectionSettings {
            port: self.connection.port.clone(),
            baud_rate,
        }
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            connection: self.connection_settings(),
            decoder: self.routing_config().decoder_settings(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Resolves the platform config base directory joined with `deej`.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("deej"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("deej"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("deej"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
