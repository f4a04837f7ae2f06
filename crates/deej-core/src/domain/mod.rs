//! Domain entities for deej.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code:
//!
//! - Contains the core rules of the application.
//! - Has **no** imports from OS APIs, audio libraries, serial drivers, or UI
//!   frameworks.
//! - Can be compiled and tested on any platform without any external setup.
//!
//! Code in outer layers (application, infrastructure) depends on the domain,
//! but the domain never depends on them.

/// Audio sessions and their add/remove events.
pub mod session;

/// Configured target strings and the special `deej.` targets.
pub mod target;

/// Slider index to target list mapping plus routing settings.
pub mod mapping;
