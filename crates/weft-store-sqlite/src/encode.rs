//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings at fixed microsecond
//! precision so that string comparison in SQL agrees with chronological
//! order. UUIDs are stored as hyphenated lowercase strings. Record payloads
//! are stored as a `value_type` discriminant plus a compact JSON column.

use chrono::{DateTime, SecondsFormat, Timelike as _, Utc};
use uuid::Uuid;
use weft_core::{
  KeyId, MetadataRecord, MetadataValue, RecordId, SubjectId, UserId,
};

use crate::Result;

// ─── Uuid-backed ids ─────────────────────────────────────────────────────────

pub fn encode_subject_id(id: SubjectId) -> String {
  id.0.hyphenated().to_string()
}

pub fn decode_subject_id(s: &str) -> Result<SubjectId> {
  Ok(SubjectId(Uuid::parse_str(s)?))
}

pub fn encode_user_id(id: UserId) -> String {
  id.0.hyphenated().to_string()
}

pub fn decode_user_id(s: &str) -> Result<UserId> {
  Ok(UserId(Uuid::parse_str(s)?))
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Drop sub-microsecond precision, matching what [`encode_dt`] persists.
/// Values handed back at write time go through this so they agree with
/// what a later fetch decodes from the stored column.
pub fn truncate_dt(dt: DateTime<Utc>) -> DateTime<Utc> {
  dt.with_nanosecond(dt.nanosecond() / 1_000 * 1_000).unwrap_or(dt)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| crate::Error::DateParse(e.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw column values read directly from a `records` row.
pub struct RawRecord {
  pub record_id:      i64,
  pub key_id:         i64,
  pub value_type:     String,
  pub value_json:     String,
  pub creator:        String,
  pub approver:       Option<String>,
  pub effective_from: String,
  pub effective_to:   Option<String>,
}

impl RawRecord {
  pub fn into_record(self) -> Result<MetadataRecord> {
    let data: serde_json::Value = serde_json::from_str(&self.value_json)?;
    let value = MetadataValue::from_parts(&self.value_type, data)
      .map_err(crate::Error::Core)?;

    Ok(MetadataRecord {
      record_id:      RecordId(self.record_id),
      key:            KeyId(self.key_id),
      value,
      creator:        decode_user_id(&self.creator)?,
      approver:       self
        .approver
        .as_deref()
        .map(decode_user_id)
        .transpose()?,
      effective_from: decode_dt(&self.effective_from)?,
      effective_to:   self
        .effective_to
        .as_deref()
        .map(decode_dt)
        .transpose()?,
    })
  }
}

/// Raw column values read directly from a `subjects` row.
pub struct RawSubject {
  pub subject_id: String,
  pub created_at: String,
  pub parent_id:  Option<String>,
}
