//! Infrastructure layer for the deej host.
//!
//! Contains OS-facing adapters: audio backends, foreground window queries,
//! the serial slider link, and configuration file storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `deej_core`, but MUST NOT be imported by the `application` or domain
//! layers.
//!
//! # Sub-modules
//!
//! - **`audio_backend`** – Implementations of `AudioBackend`.  An in-memory
//!   backend (polling or event-driven) stands in on platforms without a
//!   native implementation and backs the tests; `UnsupportedAudioBackend`
//!   reports the missing platform support.
//!
//! - **`window_focus`** – Implementations of `ForegroundWindow`, plus a
//!   cooldown cache so the slider hot path never hammers the OS.
//!
//! - **`slider_link`** – Reads lines from the board, decodes them and fans
//!   slider moves out to subscribers.  Reconnects automatically.
//!
//! - **`storage`** – TOML configuration file loading and hot reload.

pub mod audio_backend;
pub mod slider_link;
pub mod storage;
pub mod window_focus;
