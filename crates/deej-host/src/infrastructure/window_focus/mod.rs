//! Foreground window adapters.
//!
//! - [`unsupported::UnsupportedForegroundWindow`] answers every query with
//!   [`FocusError::Unsupported`](crate::application::target_resolver::FocusError),
//!   which makes `deej.current` targets resolve to nothing.
//! - [`cached::CachedForegroundWindow`] wraps any implementation with a short
//!   cooldown so a burst of slider moves triggers one OS query.

pub mod cached;
pub mod unsupported;
