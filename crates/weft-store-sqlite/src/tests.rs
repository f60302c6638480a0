//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;
use weft_core::{
  Error as CoreError, MetadataSubject, MetadataValue, NewRecord, RecordId,
  UserId,
};

use crate::{Error, SqliteStore};

fn store() -> SqliteStore {
  SqliteStore::open_in_memory().expect("in-memory store")
}

fn user() -> UserId {
  UserId(Uuid::new_v4())
}

fn dt(year: i32, month: u32, day: u32) -> DateTime<Utc> {
  Utc
    .with_ymd_and_hms(year, month, day, 0, 0, 0)
    .single()
    .unwrap()
}

fn text(s: &str) -> MetadataValue {
  MetadataValue::Text(s.to_owned())
}

// ─── Keys ────────────────────────────────────────────────────────────────────

#[test]
fn add_key_and_look_up() {
  let s = store();

  let key = s.add_key("title", Some("Display title")).unwrap();
  assert_eq!(key.name, "title");

  let fetched = s.key("title").unwrap().unwrap();
  assert_eq!(fetched.key_id, key.key_id);
  assert_eq!(fetched.description.as_deref(), Some("Display title"));

  assert!(s.key("Title").unwrap().is_none()); // names are case-sensitive
}

#[test]
fn duplicate_key_name_rejected() {
  let s = store();
  s.add_key("title", None).unwrap();

  assert!(matches!(
    s.add_key("title", None).unwrap_err(),
    Error::DuplicateKey(_)
  ));
}

#[test]
fn resolver_contract() {
  use weft_core::KeyResolver as _;

  let s = store();
  let key = s.add_key("title", None).unwrap();

  assert_eq!(s.resolve("title").unwrap(), key.key_id);
  assert!(matches!(
    s.resolve("nonexistent_key").unwrap_err(),
    CoreError::UnknownKey(_)
  ));
}

#[test]
fn keys_listing_is_name_ordered() {
  let s = store();
  s.add_key("title", None).unwrap();
  s.add_key("description", None).unwrap();

  let names: Vec<_> =
    s.keys().unwrap().into_iter().map(|k| k.name).collect();
  assert_eq!(names, ["description", "title"]);
}

// ─── Subjects ────────────────────────────────────────────────────────────────

#[test]
fn add_subject_preserves_strand_order() {
  let s = store();

  let subject = s.add_subject(&["text", "images", "packages"]).unwrap();
  let fetched = s.subject(subject.id()).unwrap().unwrap();
  assert_eq!(fetched.strand_names(), ["text", "images", "packages"]);
  assert_eq!(fetched.id(), subject.id());
  assert!(fetched.parent_id().is_none());
}

#[test]
fn duplicate_subject_id_rejected() {
  let s = store();
  let subject = s.add_subject(&["text"]).unwrap();

  assert!(matches!(
    s.add_subject_with_id(subject.id(), &["text"]).unwrap_err(),
    Error::SubjectExists(_)
  ));
}

#[test]
fn subject_handle_debug_output_names_its_strands() {
  let s = store();
  let subject = s.add_subject(&["text", "images"]).unwrap();

  let rendered = format!("{subject:?}");
  assert!(rendered.contains("StoredSubject"));
  assert!(rendered.contains("images"));
}

#[test]
fn set_parent_on_missing_subject_fails() {
  let s = store();
  let ghost = weft_core::SubjectId::new();

  assert!(matches!(
    s.set_parent(ghost, None).unwrap_err(),
    Error::SubjectNotFound(_)
  ));
}

// ─── Resolution through the store ────────────────────────────────────────────

#[test]
fn draft_final_resolution() {
  let s = store();
  let title = s.add_key("title", None).unwrap().key_id;
  let subject = s.add_subject(&["text"]).unwrap();

  s.record_metadata(
    subject.id(),
    "text",
    NewRecord::new(title, text("Draft"), user(), dt(2020, 1, 1)),
  )
  .unwrap();
  s.record_metadata(
    subject.id(),
    "text",
    NewRecord::new(title, text("Final"), user(), dt(2021, 1, 1)),
  )
  .unwrap();

  let strand = |at| subject.metadata_at(at).strand("text").unwrap().get("title");
  assert_eq!(strand(dt(2020, 6, 1)).unwrap(), text("Draft"));
  assert_eq!(strand(dt(2021, 6, 1)).unwrap(), text("Final"));
  assert_eq!(strand(dt(2021, 1, 1)).unwrap(), text("Final"));
  assert!(matches!(
    strand(dt(2019, 1, 1)).unwrap_err(),
    CoreError::NoMetadata { .. }
  ));
}

#[test]
fn equal_effective_from_resolves_to_highest_record_id() {
  let s = store();
  let title = s.add_key("title", None).unwrap().key_id;
  let subject = s.add_subject(&["text"]).unwrap();

  s.record_metadata(
    subject.id(),
    "text",
    NewRecord::new(title, text("First"), user(), dt(2020, 1, 1)),
  )
  .unwrap();
  s.record_metadata(
    subject.id(),
    "text",
    NewRecord::new(title, text("Second"), user(), dt(2020, 1, 1)),
  )
  .unwrap();

  let value = subject
    .metadata_at(dt(2020, 6, 1))
    .strand("text")
    .unwrap()
    .get("title")
    .unwrap();
  assert_eq!(value, text("Second"));
}

#[test]
fn effective_to_is_stored_but_does_not_expire() {
  let s = store();
  let title = s.add_key("title", None).unwrap().key_id;
  let subject = s.add_subject(&["text"]).unwrap();

  let stored = s
    .record_metadata(
      subject.id(),
      "text",
      NewRecord::new(title, text("Draft"), user(), dt(2020, 1, 1))
        .until(dt(2020, 3, 1)),
    )
    .unwrap();

  let roundtrip = s.record(stored.record_id).unwrap().unwrap();
  assert_eq!(roundtrip.effective_to, Some(dt(2020, 3, 1)));

  // Past its window, but with no later record it still resolves.
  let value = subject
    .metadata_at(dt(2020, 6, 1))
    .strand("text")
    .unwrap()
    .get("title")
    .unwrap();
  assert_eq!(value, text("Draft"));
}

#[test]
fn returned_record_agrees_with_stored_precision() {
  use chrono::Timelike as _;

  let s = store();
  let title = s.add_key("title", None).unwrap().key_id;
  let subject = s.add_subject(&["text"]).unwrap();

  // Sub-microsecond input; the store persists microseconds only, and the
  // record handed back at write time must match a later fetch exactly.
  let precise = dt(2020, 1, 1).with_nanosecond(123_456_789).unwrap();
  let stored = s
    .record_metadata(
      subject.id(),
      "text",
      NewRecord::new(title, text("Draft"), user(), precise).until(precise),
    )
    .unwrap();

  assert_eq!(stored.effective_from.nanosecond(), 123_456_000);

  let fetched = s.record(stored.record_id).unwrap().unwrap();
  assert_eq!(fetched.effective_from, stored.effective_from);
  assert_eq!(fetched.effective_to, stored.effective_to);
}

#[test]
fn structured_value_roundtrip() {
  let s = store();
  let credits = s.add_key("credits", None).unwrap().key_id;
  let subject = s.add_subject(&["packages"]).unwrap();

  let payload = serde_json::json!({ "producer": "Sam", "editors": ["Ash"] });
  s.record_metadata(
    subject.id(),
    "packages",
    NewRecord::new(
      credits,
      MetadataValue::Structured(payload.clone()),
      user(),
      dt(2020, 1, 1),
    ),
  )
  .unwrap();

  let value = subject
    .metadata_at(dt(2020, 6, 1))
    .strand("packages")
    .unwrap()
    .get("credits")
    .unwrap();
  assert_eq!(value, MetadataValue::Structured(payload));
}

#[test]
fn undeclared_strand_write_rejected() {
  let s = store();
  let title = s.add_key("title", None).unwrap().key_id;
  let subject = s.add_subject(&["text"]).unwrap();

  assert!(matches!(
    s.record_metadata(
      subject.id(),
      "images",
      NewRecord::new(title, text("x"), user(), dt(2020, 1, 1)),
    )
    .unwrap_err(),
    Error::UndeclaredStrand { .. }
  ));
}

// ─── Stored inheritance ──────────────────────────────────────────────────────

#[test]
fn child_inherits_through_the_store() {
  let s = store();
  let title = s.add_key("title", None).unwrap().key_id;

  let parent = s.add_subject(&["text"]).unwrap();
  s.record_metadata(
    parent.id(),
    "text",
    NewRecord::new(title, text("Draft"), user(), dt(2020, 1, 1)),
  )
  .unwrap();

  let child = s.add_subject(&["text"]).unwrap();
  s.set_parent(child.id(), Some(parent.id())).unwrap();

  // Parent links are read at fetch time.
  let child = s.subject(child.id()).unwrap().unwrap();
  let strand = child.metadata_at(dt(2020, 6, 1)).strand("text").unwrap();
  assert_eq!(strand.get("title").unwrap(), text("Draft"));
  assert!(strand.contains("title").unwrap());
}

#[test]
fn grandparent_chain_through_the_store() {
  let s = store();
  let title = s.add_key("title", None).unwrap().key_id;

  let a = s.add_subject(&["text"]).unwrap();
  let b = s.add_subject(&["text"]).unwrap();
  let c = s.add_subject(&["text"]).unwrap();
  s.record_metadata(
    a.id(),
    "text",
    NewRecord::new(title, text("Root"), user(), dt(2020, 1, 1)),
  )
  .unwrap();
  s.set_parent(b.id(), Some(a.id())).unwrap();
  s.set_parent(c.id(), Some(b.id())).unwrap();

  let c = s.subject(c.id()).unwrap().unwrap();
  let value = c
    .metadata_at(dt(2020, 6, 1))
    .strand("text")
    .unwrap()
    .get("title")
    .unwrap();
  assert_eq!(value, text("Root"));
}

#[test]
fn stored_cycle_fails_fast() {
  let s = store();
  s.add_key("title", None).unwrap();

  let x = s.add_subject(&["text"]).unwrap();
  let y = s.add_subject(&["text"]).unwrap();
  s.set_parent(x.id(), Some(y.id())).unwrap();
  s.set_parent(y.id(), Some(x.id())).unwrap();

  let x = s.subject(x.id()).unwrap().unwrap();
  let strand = x.metadata_at(dt(2020, 6, 1)).strand("text").unwrap();
  assert!(matches!(
    strand.get("title").unwrap_err(),
    CoreError::CyclicInheritance(_)
  ));
  assert!(matches!(
    strand.contains("title").unwrap_err(),
    CoreError::CyclicInheritance(_)
  ));
}

#[test]
fn removed_parent_degrades_to_no_value() {
  let s = store();
  let title = s.add_key("title", None).unwrap().key_id;

  let parent = s.add_subject(&["text"]).unwrap();
  s.record_metadata(
    parent.id(),
    "text",
    NewRecord::new(title, text("Draft"), user(), dt(2020, 1, 1)),
  )
  .unwrap();
  let child = s.add_subject(&["text"]).unwrap();
  s.set_parent(child.id(), Some(parent.id())).unwrap();
  s.remove_subject(parent.id()).unwrap();

  let child = s.subject(child.id()).unwrap().unwrap();
  let strand = child.metadata_at(dt(2020, 6, 1)).strand("text").unwrap();
  assert!(!strand.contains("title").unwrap());
  assert!(matches!(
    strand.get("title").unwrap_err(),
    CoreError::NoMetadata { .. }
  ));
}

// ─── Record lifecycle ────────────────────────────────────────────────────────

#[test]
fn approval_lifecycle() {
  let s = store();
  let title = s.add_key("title", None).unwrap().key_id;
  let subject = s.add_subject(&["text"]).unwrap();

  let stored = s
    .record_metadata(
      subject.id(),
      "text",
      NewRecord::new(title, text("Draft"), user(), dt(2020, 1, 1)),
    )
    .unwrap();
  assert!(!stored.is_approved());

  let approver = user();
  s.approve(stored.record_id, approver).unwrap();

  let fetched = s.record(stored.record_id).unwrap().unwrap();
  assert_eq!(fetched.approver, Some(approver));

  assert!(matches!(
    s.approve(stored.record_id, user()).unwrap_err(),
    Error::AlreadyApproved(_)
  ));
  assert!(matches!(
    s.approve(RecordId(9999), user()).unwrap_err(),
    Error::RecordNotFound(_)
  ));
}

#[test]
fn remove_subject_cascades_to_records() {
  let s = store();
  let title = s.add_key("title", None).unwrap().key_id;
  let subject = s.add_subject(&["text"]).unwrap();

  let stored = s
    .record_metadata(
      subject.id(),
      "text",
      NewRecord::new(title, text("Draft"), user(), dt(2020, 1, 1)),
    )
    .unwrap();

  s.remove_subject(subject.id()).unwrap();
  assert!(s.subject(subject.id()).unwrap().is_none());
  assert!(s.record(stored.record_id).unwrap().is_none());
}

#[test]
fn strand_records_lists_newest_window_first() {
  let s = store();
  let title = s.add_key("title", None).unwrap().key_id;
  let subject = s.add_subject(&["text"]).unwrap();

  s.record_metadata(
    subject.id(),
    "text",
    NewRecord::new(title, text("Draft"), user(), dt(2020, 1, 1)),
  )
  .unwrap();
  s.record_metadata(
    subject.id(),
    "text",
    NewRecord::new(title, text("Final"), user(), dt(2021, 1, 1)),
  )
  .unwrap();

  let listing = s.strand_records(subject.id(), "text").unwrap();
  let values: Vec<_> = listing.into_iter().map(|r| r.value).collect();
  assert_eq!(values, [text("Final"), text("Draft")]);
}
