//! Application layer use cases for the deej host.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules in `deej-core`) and the infrastructure (serial devices, OS
//! audio APIs, files).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a user goal (e.g., "set the
//!   volume of every session slider 2 controls").
//! - **Depend on abstractions** (the [`session_directory::AudioBackend`] and
//!   [`target_resolver::ForegroundWindow`] traits) rather than concrete
//!   implementations.
//! - **Contain no OS calls, no serial I/O, no file system access**.
//!
//! # Sub-modules
//!
//! - **`session_directory`** – The live map from lookup key to audio
//!   sessions, plus the side-table of sessions no slider is mapped to.
//!
//! - **`target_resolver`** – Turns a configured target string such as
//!   `deej.current` into concrete lookup keys.
//!
//! - **`route_volume`** – Receives slider moves and applies them to every
//!   matching session.  Runs on every accepted slider change.
//!
//! - **`refresh`** – Coalescing refresh requests and the workers that keep
//!   the directory in sync with the backend and the configuration.

pub mod refresh;
pub mod route_volume;
pub mod session_directory;
pub mod target_resolver;
