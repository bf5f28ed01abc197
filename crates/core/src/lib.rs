//! correlate-core
//!
//! Core library for correlating the entities of an original binary with the
//! entities of a binary recompiled from decompiled source.
//!
//! The crate holds the entity store and its staged batches, the matching
//! passes, verification checks, byte-read collaborators for binary images,
//! and SQLite persistence of results. Frontends (the CLI) stay thin.

pub mod backends;
pub mod db;
pub mod events;
pub mod model;
pub mod services;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
