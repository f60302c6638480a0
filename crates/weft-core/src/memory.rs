//! In-memory reference implementations of the core contracts.
//!
//! Suitable for tests and for subjects whose metadata is assembled in
//! process rather than read from a store.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Utc};

use crate::{
  error::{Error, Result},
  key::{KeyId, KeyResolver, MetadataKey},
  record::{MetadataRecord, NewRecord, RecordId},
  store::RecordSet,
  subject::{MetadataSubject, Strands, SubjectId},
};

// ─── KeyTable ────────────────────────────────────────────────────────────────

/// A fixed table of known keys.
#[derive(Debug, Default)]
pub struct KeyTable {
  keys: Vec<MetadataKey>,
}

impl KeyTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `name` and return its id. Registering an already-known name
  /// returns the existing id.
  pub fn define(&mut self, name: &str) -> KeyId {
    if let Some(key) = self.keys.iter().find(|k| k.name == name) {
      return key.key_id;
    }
    let key_id = KeyId(self.keys.len() as i64 + 1);
    self.keys.push(MetadataKey {
      key_id,
      name: name.to_owned(),
      description: None,
    });
    key_id
  }
}

impl KeyResolver for KeyTable {
  fn resolve(&self, name: &str) -> Result<KeyId> {
    self
      .keys
      .iter()
      .find(|k| k.name == name)
      .map(|k| k.key_id)
      .ok_or_else(|| Error::UnknownKey(name.to_owned()))
  }
}

// ─── MemoryStrand ────────────────────────────────────────────────────────────

/// A strand backed by a plain vector of records.
#[derive(Debug, Default)]
pub struct MemoryStrand {
  records: Vec<MetadataRecord>,
}

impl RecordSet for MemoryStrand {
  fn any_effective(&self, key: KeyId, instant: DateTime<Utc>) -> Result<bool> {
    Ok(
      self
        .records
        .iter()
        .any(|r| r.key == key && r.effective_by(instant)),
    )
  }

  fn latest_effective(
    &self,
    key: KeyId,
    instant: DateTime<Utc>,
  ) -> Result<Option<MetadataRecord>> {
    Ok(
      self
        .records
        .iter()
        .filter(|r| r.key == key && r.effective_by(instant))
        .max_by_key(|r| (r.effective_from, r.record_id))
        .cloned(),
    )
  }
}

// ─── MemorySubject ───────────────────────────────────────────────────────────

/// A subject whose strands live entirely in memory.
///
/// Built through [`MemorySubjectBuilder`] and shared via [`Arc`]. The
/// parent link is a [`Weak`] reference: dropping the parent degrades
/// inherited lookups to "no value" rather than keeping it alive.
#[derive(Debug)]
pub struct MemorySubject {
  id:      SubjectId,
  keys:    Arc<KeyTable>,
  strands: Vec<(String, MemoryStrand)>,
  parent:  Mutex<Option<Weak<MemorySubject>>>,
}

impl MemorySubject {
  pub fn builder(keys: Arc<KeyTable>) -> MemorySubjectBuilder {
    MemorySubjectBuilder {
      id: SubjectId::new(),
      keys,
      strands: Vec::new(),
      next_record_id: 1,
    }
  }

  /// Point this subject's inheritance at `parent`.
  pub fn set_parent(&self, parent: &Arc<MemorySubject>) {
    let mut guard =
      self.parent.lock().unwrap_or_else(PoisonError::into_inner);
    *guard = Some(Arc::downgrade(parent));
  }

  pub fn clear_parent(&self) {
    let mut guard =
      self.parent.lock().unwrap_or_else(PoisonError::into_inner);
    *guard = None;
  }
}

impl MetadataSubject for MemorySubject {
  fn subject_id(&self) -> SubjectId {
    self.id
  }

  fn resolver(&self) -> &dyn KeyResolver {
    self.keys.as_ref()
  }

  fn strands(&self) -> Strands<'_> {
    let mut strands = Strands::new();
    for (name, records) in &self.strands {
      strands = strands.with(name.clone(), records);
    }
    strands
  }

  fn parent(&self) -> Result<Option<Box<dyn MetadataSubject + '_>>> {
    let guard = self.parent.lock().unwrap_or_else(PoisonError::into_inner);
    // A dropped parent degrades to "no parent": the link is by identity,
    // not ownership.
    Ok(
      guard
        .as_ref()
        .and_then(Weak::upgrade)
        .map(|parent| Box::new(SharedSubject(parent)) as Box<dyn MetadataSubject>),
    )
  }
}

/// Owns a strong handle so a parent fetched mid-resolution stays alive for
/// the rest of the walk.
struct SharedSubject(Arc<MemorySubject>);

impl MetadataSubject for SharedSubject {
  fn subject_id(&self) -> SubjectId {
    self.0.subject_id()
  }

  fn resolver(&self) -> &dyn KeyResolver {
    self.0.resolver()
  }

  fn strands(&self) -> Strands<'_> {
    self.0.strands()
  }

  fn parent(&self) -> Result<Option<Box<dyn MetadataSubject + '_>>> {
    self.0.parent()
  }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

/// Assembles a [`MemorySubject`]. Strand declaration order is the order of
/// the first mention of each strand name; record ids are assigned
/// sequentially in insertion order.
pub struct MemorySubjectBuilder {
  id:             SubjectId,
  keys:           Arc<KeyTable>,
  strands:        Vec<(String, MemoryStrand)>,
  next_record_id: i64,
}

impl MemorySubjectBuilder {
  /// Use a caller-chosen id instead of a fresh one.
  pub fn id(mut self, id: SubjectId) -> Self {
    self.id = id;
    self
  }

  /// Declare an empty strand.
  pub fn strand(mut self, name: impl Into<String>) -> Self {
    self.strand_mut(&name.into());
    self
  }

  /// Add a record to `strand`, declaring the strand if needed.
  pub fn record(mut self, strand: &str, input: NewRecord) -> Self {
    let record_id = RecordId(self.next_record_id);
    self.next_record_id += 1;
    self.strand_mut(strand).records.push(MetadataRecord {
      record_id,
      key: input.key,
      value: input.value,
      creator: input.creator,
      approver: input.approver,
      effective_from: input.effective_from,
      effective_to: input.effective_to,
    });
    self
  }

  pub fn build(self) -> Arc<MemorySubject> {
    Arc::new(MemorySubject {
      id:      self.id,
      keys:    self.keys,
      strands: self.strands,
      parent:  Mutex::new(None),
    })
  }

  fn strand_mut(&mut self, name: &str) -> &mut MemoryStrand {
    if let Some(pos) = self.strands.iter().position(|(n, _)| n == name) {
      return &mut self.strands[pos].1;
    }
    self.strands.push((name.to_owned(), MemoryStrand::default()));
    let last = self.strands.len() - 1;
    &mut self.strands[last].1
  }
}
