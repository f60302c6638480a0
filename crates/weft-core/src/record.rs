//! Record types — the fundamental unit of the metadata system.
//!
//! A record is a time-scoped value for one (subject, strand, key) triple.
//! Several records may coexist for the same triple with overlapping windows;
//! the active one at an instant is selected by
//! [`RecordSet::latest_effective`](crate::store::RecordSet::latest_effective).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, key::KeyId};

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Monotonic sequence number assigned by the owning store. Doubles as the
/// deterministic tie-break when two records share an `effective_from`:
/// highest wins.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

/// Reference to the user who created or approved a record.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct UserId(pub Uuid);

impl fmt::Display for UserId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

// ─── Value sub-types ─────────────────────────────────────────────────────────

/// An image payload; binary data lives outside the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageValue {
  /// Path relative to the deployment's image root.
  pub path:       String,
  pub media_type: String,
  /// Alternative text for accessibility.
  pub alt:        Option<String>,
}

/// A reference to a named branding/content package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageValue {
  pub name: String,
}

// ─── MetadataValue ───────────────────────────────────────────────────────────

/// The typed payload of a metadata record. The variant name serves as the
/// `value_type` discriminant stored by backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MetadataValue {
  Text(String),
  Image(ImageValue),
  Package(PackageValue),
  /// Escape hatch for strands whose payloads don't fit the taxonomy.
  Structured(serde_json::Value),
}

impl MetadataValue {
  /// The discriminant string stored in the `value_type` column.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Text(_) => "text",
      Self::Image(_) => "image",
      Self::Package(_) => "package",
      Self::Structured(_) => "structured",
    }
  }

  /// Serialise the inner payload (without the type tag) for the `value_json`
  /// storage column.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    // The full serialised form is `{"type": "...", "data": <payload>}`.
    // We want only the payload.
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Deserialise from the discriminant string and JSON payload stored by a
  /// backend.
  pub fn from_parts(
    discriminant: &str,
    data: serde_json::Value,
  ) -> Result<Self> {
    let wrapped = serde_json::json!({ "type": discriminant, "data": data });
    Ok(serde_json::from_value(wrapped)?)
  }

  /// The inner text, if this is a [`MetadataValue::Text`].
  pub fn as_text(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s.as_str()),
      _ => None,
    }
  }
}

// ─── MetadataRecord ──────────────────────────────────────────────────────────

/// A single time-scoped metadatum for one (subject, strand, key) triple.
///
/// `effective_to` is retained for administrative display and audit; the
/// resolution path is driven by `effective_from` alone, so a record is
/// superseded by a later record rather than by its own expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
  pub record_id:      RecordId,
  pub key:            KeyId,
  pub value:          MetadataValue,
  pub creator:        UserId,
  /// Unset until the record has been approved.
  pub approver:       Option<UserId>,
  pub effective_from: DateTime<Utc>,
  /// Open-ended when absent.
  pub effective_to:   Option<DateTime<Utc>>,
}

impl MetadataRecord {
  /// Whether the record has become effective by `instant` (inclusive).
  pub fn effective_by(&self, instant: DateTime<Utc>) -> bool {
    self.effective_from <= instant
  }

  pub fn is_approved(&self) -> bool {
    self.approver.is_some()
  }
}

// ─── NewRecord ───────────────────────────────────────────────────────────────

/// Input to a record write. The `record_id` is always assigned by the store;
/// it is not accepted from callers.
#[derive(Debug, Clone)]
pub struct NewRecord {
  pub key:            KeyId,
  pub value:          MetadataValue,
  pub creator:        UserId,
  pub approver:       Option<UserId>,
  pub effective_from: DateTime<Utc>,
  pub effective_to:   Option<DateTime<Utc>>,
}

impl NewRecord {
  /// Convenience constructor with the optional fields unset.
  pub fn new(
    key: KeyId,
    value: MetadataValue,
    creator: UserId,
    effective_from: DateTime<Utc>,
  ) -> Self {
    Self {
      key,
      value,
      creator,
      approver: None,
      effective_from,
      effective_to: None,
    }
  }

  /// Mark the record as approved at creation time.
  pub fn approved_by(mut self, approver: UserId) -> Self {
    self.approver = Some(approver);
    self
  }

  /// Close the effective window at `to`.
  pub fn until(mut self, to: DateTime<Utc>) -> Self {
    self.effective_to = Some(to);
    self
  }
}
