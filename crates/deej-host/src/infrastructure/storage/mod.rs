//! Storage infrastructure: configuration file loading and hot reload.
//!
//! - `config` reads and writes the TOML file and converts it into the
//!   runtime settings the routing core and the slider link consume.
//! - `watcher` notices edits to the file and republishes the configuration.
//!
//! Nothing outside this module knows the file format; the rest of the host
//! only ever sees [`deej_core::RoutingConfig`] and
//! [`LinkSettings`](crate::infrastructure::slider_link::LinkSettings).

pub mod config;
pub mod watcher;
