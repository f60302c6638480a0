//! [`SqliteStore`] — the SQLite-backed persistence collaborator.
//!
//! The store owns the key registry, the subject registry (parent links and
//! strand declarations), and the record table. Subjects fetched from it
//! implement [`MetadataSubject`], so the core resolution logic runs against
//! stored data unchanged.

use std::{
  path::Path,
  sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _};
use tracing::warn;
use weft_core::{
  KeyId, KeyResolver, MetadataKey, MetadataRecord, MetadataSubject,
  NewRecord, RecordId, RecordSet, Strands, SubjectId, UserId,
};

use crate::{
  Error, Result,
  encode::{
    RawRecord, RawSubject, decode_dt, decode_subject_id, encode_dt,
    encode_subject_id, encode_user_id, truncate_dt,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A metadata store backed by a single SQLite file.
///
/// Cloning is cheap — the connection is reference-counted. The internal
/// lock is held for the duration of a single query only, never across
/// resolution steps, so an inheritance walk may observe writes that land
/// between hops (the store offers per-query consistency, not whole-walk
/// snapshot isolation).
#[derive(Clone, Debug)]
pub struct SqliteStore {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path)?;
    Self::from_connection(conn)
  }

  /// Open an in-memory store — useful for testing.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn.execute_batch(SCHEMA)?;
    Ok(Self { conn: Arc::new(Mutex::new(conn)) })
  }

  fn with_conn<T>(
    &self,
    f: impl FnOnce(&mut Connection) -> Result<T>,
  ) -> Result<T> {
    let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
  }

  // ── Keys ──────────────────────────────────────────────────────────────────

  /// Register a new key. Names are unique and case-sensitive.
  pub fn add_key(
    &self,
    name: &str,
    description: Option<&str>,
  ) -> Result<MetadataKey> {
    self.with_conn(|conn| {
      let inserted = conn.execute(
        "INSERT OR IGNORE INTO keys (name, description) VALUES (?1, ?2)",
        rusqlite::params![name, description],
      )?;
      if inserted == 0 {
        return Err(Error::DuplicateKey(name.to_owned()));
      }
      Ok(MetadataKey {
        key_id:      KeyId(conn.last_insert_rowid()),
        name:        name.to_owned(),
        description: description.map(str::to_owned),
      })
    })
  }

  /// Look up a key by name. Returns `None` if not registered.
  pub fn key(&self, name: &str) -> Result<Option<MetadataKey>> {
    self.with_conn(|conn| {
      Ok(
        conn
          .query_row(
            "SELECT key_id, name, description FROM keys WHERE name = ?1",
            rusqlite::params![name],
            |row| {
              Ok(MetadataKey {
                key_id:      KeyId(row.get(0)?),
                name:        row.get(1)?,
                description: row.get(2)?,
              })
            },
          )
          .optional()?,
      )
    })
  }

  /// All registered keys, ordered by name.
  pub fn keys(&self) -> Result<Vec<MetadataKey>> {
    self.with_conn(|conn| {
      let mut stmt = conn
        .prepare("SELECT key_id, name, description FROM keys ORDER BY name")?;
      let rows = stmt
        .query_map([], |row| {
          Ok(MetadataKey {
            key_id:      KeyId(row.get(0)?),
            name:        row.get(1)?,
            description: row.get(2)?,
          })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    })
  }

  // ── Subjects ──────────────────────────────────────────────────────────────

  /// Create a subject declaring `strands`, in the given order.
  pub fn add_subject(&self, strands: &[&str]) -> Result<StoredSubject> {
    self.add_subject_with_id(SubjectId::new(), strands)
  }

  /// Create a subject with a caller-supplied id. Returns an error if the
  /// id is already taken.
  pub fn add_subject_with_id(
    &self,
    id: SubjectId,
    strands: &[&str],
  ) -> Result<StoredSubject> {
    let created_at = truncate_dt(Utc::now());
    let id_str = encode_subject_id(id);
    let at_str = encode_dt(created_at);

    self.with_conn(|conn| {
      let tx = conn.transaction()?;

      let taken: bool = tx
        .query_row(
          "SELECT 1 FROM subjects WHERE subject_id = ?1",
          rusqlite::params![id_str],
          |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
      if taken {
        return Err(Error::SubjectExists(id));
      }

      tx.execute(
        "INSERT INTO subjects (subject_id, created_at, parent_id)
         VALUES (?1, ?2, NULL)",
        rusqlite::params![id_str, at_str],
      )?;
      for (position, strand) in strands.iter().enumerate() {
        tx.execute(
          "INSERT INTO subject_strands (subject_id, position, strand)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, position as i64, strand],
        )?;
      }

      tx.commit()?;
      Ok(())
    })?;

    Ok(StoredSubject {
      store: self.clone(),
      subject_id: id,
      created_at,
      parent_id: None,
      strand_names: strands.iter().map(|s| (*s).to_owned()).collect(),
    })
  }

  /// Fetch a subject by id. Returns `None` if not found.
  pub fn subject(&self, id: SubjectId) -> Result<Option<StoredSubject>> {
    let id_str = encode_subject_id(id);

    let raw: Option<(RawSubject, Vec<String>)> = self.with_conn(|conn| {
      let raw = conn
        .query_row(
          "SELECT subject_id, created_at, parent_id
           FROM subjects WHERE subject_id = ?1",
          rusqlite::params![id_str],
          |row| {
            Ok(RawSubject {
              subject_id: row.get(0)?,
              created_at: row.get(1)?,
              parent_id:  row.get(2)?,
            })
          },
        )
        .optional()?;

      let Some(raw) = raw else { return Ok(None) };

      let mut stmt = conn.prepare(
        "SELECT strand FROM subject_strands
         WHERE subject_id = ?1 ORDER BY position",
      )?;
      let strands = stmt
        .query_map(rusqlite::params![id_str], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

      Ok(Some((raw, strands)))
    })?;

    let Some((raw, strand_names)) = raw else { return Ok(None) };

    Ok(Some(StoredSubject {
      store: self.clone(),
      subject_id: decode_subject_id(&raw.subject_id)?,
      created_at: decode_dt(&raw.created_at)?,
      parent_id: raw
        .parent_id
        .as_deref()
        .map(decode_subject_id)
        .transpose()?,
      strand_names,
    }))
  }

  /// Point `id`'s inheritance at `parent`, or clear it with `None`.
  ///
  /// The link is weak: the parent is not required to exist, now or later.
  pub fn set_parent(
    &self,
    id: SubjectId,
    parent: Option<SubjectId>,
  ) -> Result<()> {
    let id_str = encode_subject_id(id);
    let parent_str = parent.map(encode_subject_id);

    self.with_conn(|conn| {
      let updated = conn.execute(
        "UPDATE subjects SET parent_id = ?2 WHERE subject_id = ?1",
        rusqlite::params![id_str, parent_str],
      )?;
      if updated == 0 {
        return Err(Error::SubjectNotFound(id));
      }
      Ok(())
    })
  }

  /// Delete a subject. Its strand declarations and records go with it;
  /// children pointing at it keep their (now dangling) parent link.
  pub fn remove_subject(&self, id: SubjectId) -> Result<()> {
    let id_str = encode_subject_id(id);

    self.with_conn(|conn| {
      let deleted = conn.execute(
        "DELETE FROM subjects WHERE subject_id = ?1",
        rusqlite::params![id_str],
      )?;
      if deleted == 0 {
        return Err(Error::SubjectNotFound(id));
      }
      Ok(())
    })
  }

  // ── Records ───────────────────────────────────────────────────────────────

  /// Persist a record for (`subject`, `strand`). The `record_id` is
  /// assigned by the store and returned on the stored record.
  pub fn record_metadata(
    &self,
    subject: SubjectId,
    strand: &str,
    input: NewRecord,
  ) -> Result<MetadataRecord> {
    let subject_str = encode_subject_id(subject);
    let value_type = input.value.discriminant();
    let value_json = input.value.to_json()?.to_string();
    let creator_str = encode_user_id(input.creator);
    let approver_str = input.approver.map(encode_user_id);
    let effective_from = truncate_dt(input.effective_from);
    let effective_to = input.effective_to.map(truncate_dt);
    let from_str = encode_dt(effective_from);
    let to_str = effective_to.map(encode_dt);

    let record_id = self.with_conn(|conn| {
      let declared: bool = conn
        .query_row(
          "SELECT 1 FROM subject_strands
           WHERE subject_id = ?1 AND strand = ?2",
          rusqlite::params![subject_str, strand],
          |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
      if !declared {
        return Err(Error::UndeclaredStrand {
          subject,
          strand: strand.to_owned(),
        });
      }

      conn.execute(
        "INSERT INTO records (
           subject_id, strand, key_id, value_type, value_json,
           creator, approver, effective_from, effective_to
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
          subject_str,
          strand,
          input.key.0,
          value_type,
          value_json,
          creator_str,
          approver_str,
          from_str,
          to_str,
        ],
      )?;
      Ok(conn.last_insert_rowid())
    })?;

    Ok(MetadataRecord {
      record_id: RecordId(record_id),
      key: input.key,
      value: input.value,
      creator: input.creator,
      approver: input.approver,
      effective_from,
      effective_to,
    })
  }

  /// Mark a record as approved. Fails if it already is.
  pub fn approve(&self, id: RecordId, approver: UserId) -> Result<()> {
    let approver_str = encode_user_id(approver);

    self.with_conn(|conn| {
      let current: Option<Option<String>> = conn
        .query_row(
          "SELECT approver FROM records WHERE record_id = ?1",
          rusqlite::params![id.0],
          |row| row.get(0),
        )
        .optional()?;

      match current {
        None => Err(Error::RecordNotFound(id)),
        Some(Some(_)) => Err(Error::AlreadyApproved(id)),
        Some(None) => {
          conn.execute(
            "UPDATE records SET approver = ?2 WHERE record_id = ?1",
            rusqlite::params![id.0, approver_str],
          )?;
          Ok(())
        }
      }
    })
  }

  /// Fetch a single record by id.
  pub fn record(&self, id: RecordId) -> Result<Option<MetadataRecord>> {
    let raw = self.with_conn(|conn| {
      Ok(
        conn
          .query_row(
            "SELECT record_id, key_id, value_type, value_json,
                    creator, approver, effective_from, effective_to
             FROM records WHERE record_id = ?1",
            rusqlite::params![id.0],
            raw_record_row,
          )
          .optional()?,
      )
    })?;
    raw.map(RawRecord::into_record).transpose()
  }

  /// Every record for (`subject`, `strand`), newest window first — the
  /// listing an administrative audit view works from.
  pub fn strand_records(
    &self,
    subject: SubjectId,
    strand: &str,
  ) -> Result<Vec<MetadataRecord>> {
    let subject_str = encode_subject_id(subject);

    let raws = self.with_conn(|conn| {
      let mut stmt = conn.prepare(
        "SELECT record_id, key_id, value_type, value_json,
                creator, approver, effective_from, effective_to
         FROM records
         WHERE subject_id = ?1 AND strand = ?2
         ORDER BY effective_from DESC, record_id DESC",
      )?;
      let rows = stmt
        .query_map(rusqlite::params![subject_str, strand], raw_record_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    })?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }

  // ── Strand queries (the RecordSet contract) ───────────────────────────────

  fn any_effective(
    &self,
    subject: SubjectId,
    strand: &str,
    key: KeyId,
    instant: DateTime<Utc>,
  ) -> Result<bool> {
    let subject_str = encode_subject_id(subject);
    let instant_str = encode_dt(instant);

    self.with_conn(|conn| {
      Ok(
        conn
          .query_row(
            "SELECT 1 FROM records
             WHERE subject_id = ?1 AND strand = ?2 AND key_id = ?3
               AND effective_from <= ?4
             LIMIT 1",
            rusqlite::params![subject_str, strand, key.0, instant_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false),
      )
    })
  }

  fn latest_effective(
    &self,
    subject: SubjectId,
    strand: &str,
    key: KeyId,
    instant: DateTime<Utc>,
  ) -> Result<Option<MetadataRecord>> {
    let subject_str = encode_subject_id(subject);
    let instant_str = encode_dt(instant);

    let raw = self.with_conn(|conn| {
      Ok(
        conn
          .query_row(
            "SELECT record_id, key_id, value_type, value_json,
                    creator, approver, effective_from, effective_to
             FROM records
             WHERE subject_id = ?1 AND strand = ?2 AND key_id = ?3
               AND effective_from <= ?4
             ORDER BY effective_from DESC, record_id DESC
             LIMIT 1",
            rusqlite::params![subject_str, strand, key.0, instant_str],
            raw_record_row,
          )
          .optional()?,
      )
    })?;

    raw.map(RawRecord::into_record).transpose()
  }
}

fn raw_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
  Ok(RawRecord {
    record_id:      row.get(0)?,
    key_id:         row.get(1)?,
    value_type:     row.get(2)?,
    value_json:     row.get(3)?,
    creator:        row.get(4)?,
    approver:       row.get(5)?,
    effective_from: row.get(6)?,
    effective_to:   row.get(7)?,
  })
}

// ─── KeyResolver ─────────────────────────────────────────────────────────────

impl KeyResolver for SqliteStore {
  fn resolve(&self, name: &str) -> weft_core::Result<KeyId> {
    match self.key(name) {
      Ok(Some(key)) => Ok(key.key_id),
      Ok(None) => Err(weft_core::Error::UnknownKey(name.to_owned())),
      Err(e) => Err(e.into()),
    }
  }
}

// ─── StoredSubject ───────────────────────────────────────────────────────────

/// A subject row together with its declared strands.
///
/// The parent link and strand declarations are read at fetch time; re-fetch
/// the subject to observe relinking. Strand *records* are read per query,
/// so fresh views see whatever has been written since the fetch.
#[derive(Clone, Debug)]
pub struct StoredSubject {
  store:        SqliteStore,
  subject_id:   SubjectId,
  created_at:   DateTime<Utc>,
  parent_id:    Option<SubjectId>,
  strand_names: Vec<String>,
}

impl StoredSubject {
  pub fn id(&self) -> SubjectId {
    self.subject_id
  }

  pub fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  pub fn parent_id(&self) -> Option<SubjectId> {
    self.parent_id
  }

  pub fn strand_names(&self) -> &[String] {
    &self.strand_names
  }
}

impl MetadataSubject for StoredSubject {
  fn subject_id(&self) -> SubjectId {
    self.subject_id
  }

  fn resolver(&self) -> &dyn KeyResolver {
    &self.store
  }

  fn strands(&self) -> Strands<'_> {
    let mut strands = Strands::new();
    for name in &self.strand_names {
      strands = strands.with(
        name.clone(),
        SqliteStrand {
          store:      self.store.clone(),
          subject_id: self.subject_id,
          strand:     name.clone(),
        },
      );
    }
    strands
  }

  fn parent(&self) -> weft_core::Result<Option<Box<dyn MetadataSubject + '_>>> {
    let Some(parent_id) = self.parent_id else { return Ok(None) };
    match self.store.subject(parent_id) {
      Ok(Some(parent)) => Ok(Some(Box::new(parent))),
      Ok(None) => {
        // Dangling weak link: the parent row is gone. Degrade to "no
        // parent" so the lookup resolves or misses on local data alone.
        warn!(
          subject = %self.subject_id,
          parent = %parent_id,
          "metadata parent row is missing"
        );
        Ok(None)
      }
      Err(e) => Err(e.into()),
    }
  }
}

// ─── SqliteStrand ────────────────────────────────────────────────────────────

/// One strand of one subject, read straight from the store.
struct SqliteStrand {
  store:      SqliteStore,
  subject_id: SubjectId,
  strand:     String,
}

impl RecordSet for SqliteStrand {
  fn any_effective(
    &self,
    key: KeyId,
    instant: DateTime<Utc>,
  ) -> weft_core::Result<bool> {
    self
      .store
      .any_effective(self.subject_id, &self.strand, key, instant)
      .map_err(Into::into)
  }

  fn latest_effective(
    &self,
    key: KeyId,
    instant: DateTime<Utc>,
  ) -> weft_core::Result<Option<MetadataRecord>> {
    self
      .store
      .latest_effective(self.subject_id, &self.strand, key, instant)
      .map_err(Into::into)
  }
}
