//! SQL schema for the weft SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS keys (
    key_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,  -- case-sensitive
    description TEXT
);

-- parent_id is deliberately not a foreign key: the parent link is weak.
-- Deleting a parent must neither cascade into its children nor be blocked
-- by them; a dangling link reads as 'no parent'.
CREATE TABLE IF NOT EXISTS subjects (
    subject_id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    parent_id  TEXT
);

-- Strand declarations, ordered by position. Declaration order is
-- significant: it is the search order for whole-subject key lookups.
CREATE TABLE IF NOT EXISTS subject_strands (
    subject_id TEXT NOT NULL REFERENCES subjects(subject_id)
               ON DELETE CASCADE,
    position   INTEGER NOT NULL,
    strand     TEXT NOT NULL,
    PRIMARY KEY (subject_id, strand)
);

-- record_id doubles as the tie-break for equal effective_from values:
-- highest wins. Records belong to their subject and die with it.
CREATE TABLE IF NOT EXISTS records (
    record_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id     TEXT NOT NULL REFERENCES subjects(subject_id)
                   ON DELETE CASCADE,
    strand         TEXT NOT NULL,
    key_id         INTEGER NOT NULL REFERENCES keys(key_id),
    value_type     TEXT NOT NULL,   -- discriminant of MetadataValue variant
    value_json     TEXT NOT NULL,   -- JSON payload (inner data only)
    creator        TEXT NOT NULL,
    approver       TEXT,            -- NULL until approved
    effective_from TEXT NOT NULL,   -- RFC 3339 UTC, fixed precision
    effective_to   TEXT             -- NULL = open-ended
);

CREATE INDEX IF NOT EXISTS records_lookup_idx
  ON records(subject_id, strand, key_id, effective_from DESC, record_id DESC);

PRAGMA user_version = 1;
";
