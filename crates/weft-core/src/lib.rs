//! Temporal, inheritable key/value metadata for arbitrary domain entities.
//!
//! A subject carries named strands of time-scoped records. Lookups are made
//! "as of" an instant; a miss at one subject can fall through to a parent
//! subject, forming an inheritance chain. This crate holds the resolution
//! logic and the contracts a storage backend implements; it is free of
//! database dependencies.

pub mod error;
pub mod key;
pub mod memory;
pub mod record;
pub mod store;
pub mod subject;
pub mod view;

pub use error::{Error, Result};
pub use key::{KeyId, KeyResolver, MetadataKey};
pub use record::{
  ImageValue, MetadataRecord, MetadataValue, NewRecord, PackageValue,
  RecordId, UserId,
};
pub use store::RecordSet;
pub use subject::{
  Inherit, MetadataSubject, ParentInherit, Strands, SubjectId, VisitTrail,
};
pub use view::{MetadataView, StrandView};
