//! SQLite backend for the weft metadata system.
//!
//! Provides the key registry, subject registry, and record storage behind
//! the contracts `weft-core` resolves against. All access is synchronous,
//! matching the core's single-call-stack resolution model.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, StoredSubject};

#[cfg(test)]
mod tests;
