//! SQL schema for the Insight SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// `AUTOINCREMENT` keeps identifiers from ever being reused, even after a
/// bulk clear. Timestamps are fixed-width RFC 3339 UTC strings, so string
/// comparison orders them chronologically.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS fragments (
    fragment_id INTEGER PRIMARY KEY AUTOINCREMENT,
    content     TEXT NOT NULL CHECK (length(trim(content)) > 0),
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    document_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    title              TEXT NOT NULL CHECK (length(trim(title)) > 0),
    summary            TEXT NOT NULL CHECK (length(trim(summary)) > 0),
    content            TEXT NOT NULL CHECK (length(trim(content)) > 0),
    version_created_at TEXT NOT NULL,  -- stamp of the generating run
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    tag_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL UNIQUE,
    color      TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS document_fragments (
    document_id INTEGER NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
    fragment_id INTEGER NOT NULL REFERENCES fragments(fragment_id) ON DELETE CASCADE,
    PRIMARY KEY (document_id, fragment_id)
);

CREATE TABLE IF NOT EXISTS document_tags (
    document_id INTEGER NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
    tag_id      INTEGER NOT NULL REFERENCES tags(tag_id) ON DELETE CASCADE,
    PRIMARY KEY (document_id, tag_id)
);

CREATE TABLE IF NOT EXISTS fragment_tags (
    fragment_id INTEGER NOT NULL REFERENCES fragments(fragment_id) ON DELETE CASCADE,
    tag_id      INTEGER NOT NULL REFERENCES tags(tag_id) ON DELETE CASCADE,
    PRIMARY KEY (fragment_id, tag_id)
);

CREATE TABLE IF NOT EXISTS questions (
    question_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    question_text        TEXT NOT NULL,
    context_fragment_ids TEXT,           -- JSON array or NULL
    context_document_ids TEXT,           -- JSON array or NULL
    status               TEXT NOT NULL DEFAULT 'pending'
                         CHECK (status IN ('pending', 'answered', 'archived')),
    created_at           TEXT NOT NULL,
    answered_at          TEXT,
    answer_fragment_id   INTEGER REFERENCES fragments(fragment_id) ON DELETE SET NULL
);

-- Append-only tombstones for fragments removed by merge or delete.
CREATE TABLE IF NOT EXISTS fragment_removals (
    removal_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    fragment_id INTEGER NOT NULL,
    content     TEXT NOT NULL,
    kind        TEXT NOT NULL CHECK (kind IN ('merged', 'deleted')),
    merged_into INTEGER,
    reason      TEXT,
    removed_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS documents_version_idx      ON documents(version_created_at);
CREATE INDEX IF NOT EXISTS documents_title_idx        ON documents(title);
CREATE INDEX IF NOT EXISTS document_fragments_frag_idx ON document_fragments(fragment_id);
CREATE INDEX IF NOT EXISTS document_tags_tag_idx      ON document_tags(tag_id);
CREATE INDEX IF NOT EXISTS questions_status_idx       ON questions(status);

PRAGMA user_version = 1;
";
