//! The metadata-subject capability and the inheritance machinery.
//!
//! A domain entity implements [`MetadataSubject`] to expose its metadata
//! strands and, optionally, a parent subject to inherit from. The derived
//! accessors hand out [`MetadataView`]s bound to an instant.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
  error::{Error, Result},
  key::KeyResolver,
  record::MetadataValue,
  store::RecordSet,
  view::MetadataView,
};

// ─── SubjectId ───────────────────────────────────────────────────────────────

/// Stable identity for a metadata subject. Inheritance walks compare these
/// to detect cycles in the parent relation.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct SubjectId(pub Uuid);

impl SubjectId {
  pub fn new() -> Self {
    Self(Uuid::new_v4())
  }
}

impl Default for SubjectId {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for SubjectId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

// ─── Strands ─────────────────────────────────────────────────────────────────

/// A subject's declared strands, in declaration order.
///
/// Declaration order matters: it is the search order used by
/// [`MetadataSubject::lookup_any`].
#[derive(Default)]
pub struct Strands<'a> {
  entries: Vec<(String, Box<dyn RecordSet + 'a>)>,
}

impl<'a> Strands<'a> {
  pub fn new() -> Self {
    Self { entries: Vec::new() }
  }

  /// Declare a strand backed by `records`.
  pub fn with<R: RecordSet + 'a>(
    mut self,
    name: impl Into<String>,
    records: R,
  ) -> Self {
    self.entries.push((name.into(), Box::new(records)));
    self
  }

  pub fn contains(&self, name: &str) -> bool {
    self.entries.iter().any(|(n, _)| n == name)
  }

  /// Extract the record collection declared under `name`.
  pub fn take(self, name: &str) -> Option<Box<dyn RecordSet + 'a>> {
    self
      .entries
      .into_iter()
      .find(|(n, _)| n == name)
      .map(|(_, records)| records)
  }

  /// Strand names in declaration order.
  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|(n, _)| n.as_str())
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

// ─── VisitTrail ──────────────────────────────────────────────────────────────

/// The subjects already consulted during one resolution.
///
/// Threaded explicitly through the inheritance walk so a misconfigured
/// parent relation (a subject that is its own transitive parent) fails fast
/// instead of recursing forever.
#[derive(Debug)]
pub struct VisitTrail {
  seen: Vec<SubjectId>,
}

impl VisitTrail {
  /// Start a trail at the subject where resolution begins.
  pub fn starting_at(origin: SubjectId) -> Self {
    Self { seen: vec![origin] }
  }

  /// Record a hop to `next`, failing with
  /// [`Error::CyclicInheritance`] if it was already visited.
  pub fn hop(&mut self, next: SubjectId) -> Result<()> {
    if self.seen.contains(&next) {
      return Err(Error::CyclicInheritance(next));
    }
    self.seen.push(next);
    Ok(())
  }

  /// How many subjects the current resolution has consulted.
  pub fn depth(&self) -> usize {
    self.seen.len()
  }
}

// ─── Inherit ─────────────────────────────────────────────────────────────────

/// Strategy consulted when a strand has no local record for a key.
///
/// The default strategy, [`ParentInherit`], repeats the resolution against
/// the subject's parent. A custom strategy can be injected through
/// [`MetadataSubject::metadata_at_with`]; strategies that recurse into
/// other subjects must pass `trail` along via
/// [`StrandView::get_traced`](crate::view::StrandView::get_traced) so cycle
/// detection spans the whole walk.
pub trait Inherit {
  /// Resolve `key` elsewhere, or fail with [`Error::NoMetadata`].
  fn fetch(
    &self,
    subject: &dyn MetadataSubject,
    instant: DateTime<Utc>,
    strand: &str,
    key: &str,
    trail: &mut VisitTrail,
  ) -> Result<MetadataValue>;

  /// Existence-check variant: report whether `key` would resolve, without
  /// producing a value. Must convert "no value" into `Ok(false)` rather
  /// than failing with [`Error::NoMetadata`].
  fn peek(
    &self,
    subject: &dyn MetadataSubject,
    instant: DateTime<Utc>,
    strand: &str,
    key: &str,
    trail: &mut VisitTrail,
  ) -> Result<bool>;
}

/// The default inheritance strategy: delegate to the parent subject and
/// return its resolution of the same strand and key, unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentInherit;

impl Inherit for ParentInherit {
  fn fetch(
    &self,
    subject: &dyn MetadataSubject,
    instant: DateTime<Utc>,
    strand: &str,
    key: &str,
    trail: &mut VisitTrail,
  ) -> Result<MetadataValue> {
    let Some(parent) = subject.parent()? else {
      return Err(Error::NoMetadata {
        strand:  strand.to_owned(),
        key:     key.to_owned(),
        instant,
      });
    };
    trail.hop(parent.subject_id())?;
    debug!(
      child = %subject.subject_id(),
      parent = %parent.subject_id(),
      strand,
      key,
      depth = trail.depth(),
      "inheriting metadata lookup"
    );
    MetadataView::new(parent.as_ref(), instant)
      .strand(strand)?
      .get_traced(key, trail)
  }

  fn peek(
    &self,
    subject: &dyn MetadataSubject,
    instant: DateTime<Utc>,
    strand: &str,
    key: &str,
    trail: &mut VisitTrail,
  ) -> Result<bool> {
    let Some(parent) = subject.parent()? else {
      return Ok(false);
    };
    trail.hop(parent.subject_id())?;
    // A parent that does not declare the strand simply has nothing to offer.
    match MetadataView::new(parent.as_ref(), instant).strand(strand) {
      Ok(view) => view.contains_traced(key, trail),
      Err(Error::UnknownStrand(_)) => Ok(false),
      Err(e) => Err(e),
    }
  }
}

// ─── MetadataSubject ─────────────────────────────────────────────────────────

/// The capability a domain entity implements to expose metadata strands and
/// an optional inheritance parent.
///
/// `subject_id`, `resolver`, and `strands` are mandatory — a type without a
/// strand declaration does not compile. `parent` and `reference_instant`
/// have defaults, and the remaining accessors are derived.
pub trait MetadataSubject {
  /// Stable identity, compared during inheritance to detect cycles.
  fn subject_id(&self) -> SubjectId;

  /// The key resolver this subject's records were written against.
  fn resolver(&self) -> &dyn KeyResolver;

  /// The named strands of metadata this subject carries, in declaration
  /// order.
  fn strands(&self) -> Strands<'_>;

  /// The subject to inherit from when a local lookup misses.
  ///
  /// `Ok(None)` disables inheritance. The link is by identity, not
  /// ownership: implementations must surface a dangling parent reference
  /// as `Ok(None)` or an error, never as invalid state.
  fn parent(&self) -> Result<Option<Box<dyn MetadataSubject + '_>>> {
    Ok(None)
  }

  /// The instant used by [`metadata`](Self::metadata) and
  /// [`lookup_any`](Self::lookup_any) when the caller does not supply one.
  ///
  /// Defaults to now. Subjects with a natural timeframe (e.g. a scheduled
  /// broadcast) override this with its start.
  fn reference_instant(&self) -> DateTime<Utc> {
    Utc::now()
  }

  /// Snapshot view at the [reference instant](Self::reference_instant).
  fn metadata(&self) -> MetadataView<'_>
  where
    Self: Sized,
  {
    self.metadata_at(self.reference_instant())
  }

  /// Two-tier view (strand name, then key name) of the metadata active at
  /// `instant`.
  fn metadata_at(&self, instant: DateTime<Utc>) -> MetadataView<'_>
  where
    Self: Sized,
  {
    MetadataView::new(self, instant)
  }

  /// Like [`metadata_at`](Self::metadata_at), with `inherit` in place of
  /// the default [`ParentInherit`] strategy.
  fn metadata_at_with<'a>(
    &'a self,
    instant: DateTime<Utc>,
    inherit: &'a dyn Inherit,
  ) -> MetadataView<'a>
  where
    Self: Sized,
  {
    MetadataView::with_inherit(self, instant, inherit)
  }

  /// Search every strand in declaration order for `key` at the reference
  /// instant and return the first match.
  ///
  /// Convenience over `metadata().strand(..)?.get(..)` for callers that do
  /// not care which strand carries the key. Fails with
  /// [`Error::NotInAnyStrand`] when no strand resolves it, and propagates
  /// [`Error::UnknownKey`] for an unresolvable key name.
  fn lookup_any(&self, key: &str) -> Result<MetadataValue>
  where
    Self: Sized,
  {
    let instant = self.reference_instant();
    let view = self.metadata_at(instant);
    let strands = self.strands();
    for name in strands.names() {
      let strand = view.strand(name)?;
      if strand.contains(key)? {
        return strand.get(key);
      }
    }
    Err(Error::NotInAnyStrand { key: key.to_owned(), instant })
  }
}
