//! Dictionary-style read views over a subject's metadata.
//!
//! Views are transient projections bound to (subject, instant, inherit
//! strategy). They hold no state of their own, are recreated per lookup,
//! and are never shared or mutated after construction — concurrent readers
//! need no coordination.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::{
  error::{Error, Result},
  record::{MetadataRecord, MetadataValue},
  store::RecordSet,
  subject::{Inherit, MetadataSubject, ParentInherit, VisitTrail},
};

const PARENT_INHERIT: &ParentInherit = &ParentInherit;

// ─── MetadataView ────────────────────────────────────────────────────────────

/// Two-tier view: index by strand name first, then by key name.
#[derive(Clone, Copy)]
pub struct MetadataView<'a> {
  subject: &'a dyn MetadataSubject,
  instant: DateTime<Utc>,
  inherit: &'a dyn Inherit,
}

impl<'a> MetadataView<'a> {
  /// View of `subject` at `instant` with the default parent inheritance.
  pub fn new(subject: &'a dyn MetadataSubject, instant: DateTime<Utc>) -> Self {
    Self { subject, instant, inherit: PARENT_INHERIT }
  }

  /// View of `subject` at `instant` with a custom inheritance strategy.
  pub fn with_inherit(
    subject: &'a dyn MetadataSubject,
    instant: DateTime<Utc>,
    inherit: &'a dyn Inherit,
  ) -> Self {
    Self { subject, instant, inherit }
  }

  pub fn instant(&self) -> DateTime<Utc> {
    self.instant
  }

  /// The same view rebound to a different instant, preserving subject and
  /// inheritance strategy.
  pub fn at(&self, instant: DateTime<Utc>) -> MetadataView<'a> {
    Self { instant, ..*self }
  }

  /// Whether `name` is one of the subject's declared strands.
  pub fn has_strand(&self, name: &str) -> bool {
    self.subject.strands().contains(name)
  }

  /// The key-level view for strand `name`, or
  /// [`Error::UnknownStrand`] if the subject does not declare it.
  pub fn strand(&self, name: &str) -> Result<StrandView<'a>> {
    let records = self
      .subject
      .strands()
      .take(name)
      .ok_or_else(|| Error::UnknownStrand(name.to_owned()))?;
    Ok(StrandView {
      subject: self.subject,
      instant: self.instant,
      strand: name.to_owned(),
      records,
      inherit: self.inherit,
    })
  }
}

// The subject and strategy fields are trait objects, so Debug is written by
// hand against the view's binding.
impl fmt::Debug for MetadataView<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetadataView")
      .field("subject", &self.subject.subject_id())
      .field("instant", &self.instant)
      .finish_non_exhaustive()
  }
}

// ─── StrandView ──────────────────────────────────────────────────────────────

/// Key-level view over a single strand of a single subject at one instant.
pub struct StrandView<'a> {
  subject: &'a dyn MetadataSubject,
  instant: DateTime<Utc>,
  strand:  String,
  records: Box<dyn RecordSet + 'a>,
  inherit: &'a dyn Inherit,
}

impl fmt::Debug for StrandView<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StrandView")
      .field("subject", &self.subject.subject_id())
      .field("strand", &self.strand)
      .field("instant", &self.instant)
      .finish_non_exhaustive()
  }
}

impl StrandView<'_> {
  pub fn name(&self) -> &str {
    &self.strand
  }

  /// Whether `key` resolves in this strand, locally or through
  /// inheritance.
  ///
  /// Propagates [`Error::UnknownKey`] for an unresolvable key name; a
  /// resolvable key that simply has no value is `Ok(false)`, never an
  /// error.
  pub fn contains(&self, key: &str) -> Result<bool> {
    let mut trail = VisitTrail::starting_at(self.subject.subject_id());
    self.contains_traced(key, &mut trail)
  }

  /// The value active at this view's instant for `key`.
  ///
  /// Selects the local record with the greatest `effective_from` not after
  /// the instant (ties broken by highest record id); on a local miss the
  /// inheritance strategy is consulted.
  pub fn get(&self, key: &str) -> Result<MetadataValue> {
    let mut trail = VisitTrail::starting_at(self.subject.subject_id());
    self.get_traced(key, &mut trail)
  }

  /// The full local record that [`get`](Self::get) would read, if any.
  ///
  /// Local-only: inheritance returns values, not records. Used by
  /// administrative callers that need creator, approver, or window fields.
  pub fn latest_record(&self, key: &str) -> Result<Option<MetadataRecord>> {
    let key_id = self.subject.resolver().resolve(key)?;
    self.records.latest_effective(key_id, self.instant)
  }

  /// [`contains`](Self::contains) continuing an in-progress inheritance
  /// walk. For use by [`Inherit`] implementations.
  pub fn contains_traced(
    &self,
    key: &str,
    trail: &mut VisitTrail,
  ) -> Result<bool> {
    let key_id = self.subject.resolver().resolve(key)?;
    if self.records.any_effective(key_id, self.instant)? {
      return Ok(true);
    }
    self
      .inherit
      .peek(self.subject, self.instant, &self.strand, key, trail)
  }

  /// [`get`](Self::get) continuing an in-progress inheritance walk. For
  /// use by [`Inherit`] implementations.
  pub fn get_traced(
    &self,
    key: &str,
    trail: &mut VisitTrail,
  ) -> Result<MetadataValue> {
    let key_id = self.subject.resolver().resolve(key)?;
    match self.records.latest_effective(key_id, self.instant)? {
      Some(record) => Ok(record.value),
      None => {
        trace!(
          subject = %self.subject.subject_id(),
          strand = %self.strand,
          key,
          instant = %self.instant,
          "local miss, consulting inheritance"
        );
        self
          .inherit
          .fetch(self.subject, self.instant, &self.strand, key, trail)
      }
    }
  }
}
