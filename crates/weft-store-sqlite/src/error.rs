//! Error type for `weft-store-sqlite`.

use thiserror::Error;
use weft_core::{RecordId, SubjectId};

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] weft_core::Error),

  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A key name that is already registered.
  #[error("metadata key already exists: {0:?}")]
  DuplicateKey(String),

  #[error("subject not found: {0}")]
  SubjectNotFound(SubjectId),

  #[error("subject id already taken: {0}")]
  SubjectExists(SubjectId),

  /// A record write against a strand the subject does not declare.
  #[error("strand {strand:?} is not declared for subject {subject}")]
  UndeclaredStrand {
    subject: SubjectId,
    strand:  String,
  },

  #[error("record not found: {0}")]
  RecordNotFound(RecordId),

  #[error("record {0} is already approved")]
  AlreadyApproved(RecordId),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// Backend failures cross into core resolution as `weft_core::Error::Store`,
// except the variants that already are core errors.
impl From<Error> for weft_core::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::Core(e) => e,
      other => weft_core::Error::store(other),
    }
  }
}
