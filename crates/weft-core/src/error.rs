//! Error types for `weft-core`.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::subject::SubjectId;

#[derive(Debug, Error)]
pub enum Error {
  /// The key resolver does not recognise this key name.
  #[error("unknown metadata key: {0:?}")]
  UnknownKey(String),

  /// The strand name is not one of the subject's declared strands.
  #[error("no such metadata strand: {0:?}")]
  UnknownStrand(String),

  /// The key resolves, but no record covers the instant on this subject or
  /// anywhere up its parent chain.
  #[error("no metadata for key {key:?} in strand {strand:?} at {instant}")]
  NoMetadata {
    strand:  String,
    key:     String,
    instant: DateTime<Utc>,
  },

  /// [`lookup_any`](crate::subject::MetadataSubject::lookup_any) found the
  /// key in none of the subject's strands.
  #[error("no strand carries a metadata key named {key:?} at {instant}")]
  NotInAnyStrand {
    key:     String,
    instant: DateTime<Utc>,
  },

  /// The parent relation revisited a subject during a single resolution.
  #[error("cyclic inheritance: subject {0} appears in its own parent chain")]
  CyclicInheritance(SubjectId),

  /// A storage backend failed while answering a record or subject query.
  #[error("metadata store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Wrap a backend failure into [`Error::Store`].
  pub fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
