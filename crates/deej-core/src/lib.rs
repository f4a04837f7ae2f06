//! # deej-core
//!
//! Shared library for deej containing the serial frame decoder, the noise
//! filter, and the audio-session domain types.
//!
//! It has zero dependencies on OS APIs, serial ports, or an async runtime, so
//! every piece of it can be unit-tested with literal line strings and
//! in-memory sessions.
//!
//! # Architecture overview (for beginners)
//!
//! deej is a physical volume mixer: a small board with sliders streams its
//! readings over a serial link, and the host turns each slider move into a
//! volume change for one or more applications.
//!
//! This crate is the shared foundation.  It defines:
//!
//! - **`serial`** – How a line of text from the board becomes slider moves.
//!   Lines look like `512|0|1023\r\n`; the [`serial::frame::FrameDecoder`]
//!   validates them, filters hardware jitter with the
//!   [`serial::noise`] rules, and emits one [`SliderMoveEvent`] per slider
//!   whose value meaningfully changed.
//!
//! - **`domain`** – The vocabulary of the host side: the [`Session`]
//!   capability trait implemented by audio backends, the
//!   [`SessionEvent`] add/remove notifications, target naming rules
//!   (`master`, `mic`, `deej.unmapped`, ...) and the slider mapping.

pub mod domain;
pub mod serial;

// Re-export the most-used types at the crate root so callers can write
// `deej_core::Session` instead of `deej_core::domain::session::Session`.
pub use domain::mapping::{RoutingConfig, SliderMapping};
pub use domain::session::{
    same_session, Session, SessionError, SessionEvent, SessionEventKind, SessionId,
};
pub use domain::target::{SpecialTarget, Target};
pub use serial::frame::{parse_line, DecoderSettings, FrameDecoder, FrameError, SliderMoveEvent};
pub use serial::noise::{
    normalize_scalar, significantly_different, NoiseReduction, NoiseThresholds, MAX_RAW_VALUE,
};
