//! The record-collection contract implemented by storage backends.
//!
//! The resolution logic never sees a whole table of records; it works
//! against one strand of one subject at a time through this trait.

use chrono::{DateTime, Utc};

use crate::{Result, key::KeyId, record::MetadataRecord};

/// One strand's ordered collection of records, queryable by key and instant.
///
/// Implementations must order candidates by `effective_from` descending and
/// break ties by `record_id` descending, so "latest" is deterministic even
/// when two records share an `effective_from`.
pub trait RecordSet {
  /// Whether at least one record for `key` has become effective by
  /// `instant` (inclusive).
  fn any_effective(
    &self,
    key: KeyId,
    instant: DateTime<Utc>,
  ) -> Result<bool>;

  /// The single latest record for `key` effective by `instant`, if any.
  fn latest_effective(
    &self,
    key: KeyId,
    instant: DateTime<Utc>,
  ) -> Result<Option<MetadataRecord>>;
}

impl<T: RecordSet + ?Sized> RecordSet for &T {
  fn any_effective(&self, key: KeyId, instant: DateTime<Utc>) -> Result<bool> {
    (**self).any_effective(key, instant)
  }

  fn latest_effective(
    &self,
    key: KeyId,
    instant: DateTime<Utc>,
  ) -> Result<Option<MetadataRecord>> {
    (**self).latest_effective(key, instant)
  }
}
