//! Serial line handling: everything between a raw text line from the board
//! and a stream of [`frame::SliderMoveEvent`]s.
//!
//! Nothing in here touches a port.  The transport that reads lines lives in
//! the host crate; this module only decides which lines mean something.

/// Jitter suppression for raw readings.
pub mod noise;

/// Line grammar, per-slider state and move event generation.
pub mod frame;
