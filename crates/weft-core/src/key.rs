//! Metadata keys and the key-resolution contract.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Stable identifier for a metadata key.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
pub struct KeyId(pub i64);

impl fmt::Display for KeyId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

/// A named metadata key. Identity is the name — unique and case-sensitive —
/// and immutable once records reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataKey {
  pub key_id:      KeyId,
  pub name:        String,
  /// Free-text explanation shown in administrative tooling.
  pub description: Option<String>,
}

/// Maps human-readable key names to stable identifiers.
///
/// Treated as an external collaborator: the resolution logic only consumes
/// this contract and never enumerates or mutates keys through it.
pub trait KeyResolver {
  /// Resolve `name` to its [`KeyId`], or fail with
  /// [`Error::UnknownKey`](crate::Error::UnknownKey).
  fn resolve(&self, name: &str) -> Result<KeyId>;
}
