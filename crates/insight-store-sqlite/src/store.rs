//! [`SqliteStore`], the SQLite implementation of [`KnowledgeStore`].

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension as _};

use insight_core::{
  document::{Document, DocumentDetail, DocumentRef, DocumentRevision, LinkedDocument, NewDocument},
  fragment::{Fragment, FragmentFilter, FragmentRemoval, NewFragment, RemovalKind},
  question::{AnswerRecord, NewQuestion, Question, QuestionStatus},
  store::{ClearSummary, KnowledgeStore, StoreStatus},
  tag::{normalize_tag_name, tag_color, Tag, TagCount},
  VersionStamp,
};

use crate::{
  encode::{
    decode_all, decode_version, encode_dt, encode_ids, like_pattern, now, tag_count_from_row,
    tag_from_row, RawDetail, RawDocument, RawFragment, RawQuestion, RawRemoval, DOCUMENT_COLUMNS,
    FRAGMENT_COLUMNS, QUESTION_COLUMNS, REMOVAL_COLUMNS, TAG_COLUMNS,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Insight knowledge store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, used by tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────
//
// These run on the connection thread, usually inside an open transaction
// (`Transaction` derefs to `Connection`).

fn exists(conn: &Connection, table: &str, column: &str, id: i64) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row(&format!("SELECT 1 FROM {table} WHERE {column} = ?1"), params![id], |_| Ok(()))
      .optional()?
      .is_some(),
  )
}

fn count(conn: &Connection, sql: &str) -> rusqlite::Result<u64> {
  let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
  Ok(n.max(0) as u64)
}

fn select_fragment(conn: &Connection, id: i64) -> rusqlite::Result<Option<RawFragment>> {
  conn
    .query_row(
      &format!("SELECT {FRAGMENT_COLUMNS} FROM fragments f WHERE f.fragment_id = ?1"),
      params![id],
      RawFragment::from_row,
    )
    .optional()
}

fn select_document(conn: &Connection, id: i64) -> rusqlite::Result<Option<RawDocument>> {
  conn
    .query_row(
      &format!("SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE d.document_id = ?1"),
      params![id],
      RawDocument::from_row,
    )
    .optional()
}

fn select_question(conn: &Connection, id: i64) -> rusqlite::Result<Option<RawQuestion>> {
  conn
    .query_row(
      &format!("SELECT {QUESTION_COLUMNS} FROM questions q WHERE q.question_id = ?1"),
      params![id],
      RawQuestion::from_row,
    )
    .optional()
}

fn select_documents(
  conn: &Connection,
  sql: &str,
  args: impl rusqlite::Params,
) -> rusqlite::Result<Vec<RawDocument>> {
  let mut stmt = conn.prepare(sql)?;
  stmt.query_map(args, RawDocument::from_row)?.collect()
}

/// Load a document's fragments (oldest first) and tags (by name).
fn load_detail(conn: &Connection, document: RawDocument) -> rusqlite::Result<RawDetail> {
  let fragments = {
    let mut stmt = conn.prepare(&format!(
      "SELECT {FRAGMENT_COLUMNS} FROM fragments f
       JOIN document_fragments df ON df.fragment_id = f.fragment_id
       WHERE df.document_id = ?1
       ORDER BY f.created_at, f.fragment_id"
    ))?;
    stmt
      .query_map(params![document.document_id], RawFragment::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?
  };
  let tags = {
    let mut stmt = conn.prepare(&format!(
      "SELECT {TAG_COLUMNS} FROM tags t
       JOIN document_tags dt ON dt.tag_id = t.tag_id
       WHERE dt.document_id = ?1
       ORDER BY t.name"
    ))?;
    stmt
      .query_map(params![document.document_id], tag_from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?
  };
  Ok(RawDetail { document, fragments, tags })
}

/// Create-or-get by exact name. The UNIQUE constraint plus `INSERT OR IGNORE`
/// means a concurrent writer can never produce a second row.
fn upsert_tag(conn: &Connection, name: &str, at: &str) -> rusqlite::Result<Tag> {
  let select = format!("SELECT {TAG_COLUMNS} FROM tags t WHERE t.name = ?1");
  if let Some(tag) = conn.query_row(&select, params![name], tag_from_row).optional()? {
    return Ok(tag);
  }
  conn.execute(
    "INSERT OR IGNORE INTO tags (name, color, created_at) VALUES (?1, ?2, ?3)",
    params![name, tag_color(name), at],
  )?;
  conn.query_row(&select, params![name], tag_from_row)
}

/// Write the tombstone, then delete the row. Links cascade.
fn remove_fragment(conn: &Connection, removal: &FragmentRemoval) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO fragment_removals
       (fragment_id, content, kind, merged_into, reason, removed_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    params![
      removal.fragment_id,
      removal.content,
      removal.kind.as_str(),
      removal.merged_into,
      removal.reason,
      encode_dt(removal.removed_at),
    ],
  )?;
  conn.execute("DELETE FROM fragments WHERE fragment_id = ?1", params![removal.fragment_id])?;
  Ok(())
}

/// Fetch the content of every id, or report the first one that is missing.
fn fragment_contents(
  conn: &Connection,
  ids: &[i64],
) -> rusqlite::Result<std::result::Result<Vec<String>, i64>> {
  let mut contents = Vec::with_capacity(ids.len());
  for &id in ids {
    let content: Option<String> = conn
      .query_row("SELECT content FROM fragments WHERE fragment_id = ?1", params![id], |r| r.get(0))
      .optional()?;
    match content {
      Some(c) => contents.push(c),
      None => return Ok(Err(id)),
    }
  }
  Ok(Ok(contents))
}

/// Order-preserving de-duplication.
fn unique_ids(ids: Vec<i64>) -> Vec<i64> {
  let mut seen = std::collections::HashSet::new();
  ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

fn resolve_question(
  conn: &Connection,
  id: i64,
) -> rusqlite::Result<std::result::Result<RawQuestion, Error>> {
  let Some(raw) = select_question(conn, id)? else {
    return Ok(Err(Error::QuestionNotFound(id)));
  };
  if raw.status != QuestionStatus::Pending.as_str() {
    return Ok(Err(insight_core::Error::QuestionAlreadyResolved(id).into()));
  }
  Ok(Ok(raw))
}

// ─── KnowledgeStore impl ─────────────────────────────────────────────────────

impl KnowledgeStore for SqliteStore {
  type Error = Error;

  // ── Fragments ─────────────────────────────────────────────────────────

  async fn add_fragment(&self, input: NewFragment) -> Result<Fragment> {
    input.validate()?;
    let at = encode_dt(now());
    let tags: Vec<String> = input.tags.iter().filter_map(|t| normalize_tag_name(t)).collect();
    let content = input.content;

    let raw: RawFragment = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO fragments (content, created_at, updated_at) VALUES (?1, ?2, ?2)",
          params![content, at],
        )?;
        let id = tx.last_insert_rowid();
        for name in &tags {
          let tag = upsert_tag(&tx, name, &at)?;
          tx.execute(
            "INSERT OR IGNORE INTO fragment_tags (fragment_id, tag_id) VALUES (?1, ?2)",
            params![id, tag.tag_id],
          )?;
        }
        let raw = select_fragment(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.into_fragment()
  }

  async fn get_fragment(&self, id: i64) -> Result<Option<Fragment>> {
    let raw = self.conn.call(move |conn| Ok(select_fragment(conn, id)?)).await?;
    raw.map(RawFragment::into_fragment).transpose()
  }

  async fn list_fragments(&self, filter: FragmentFilter) -> Result<Vec<Fragment>> {
    let sql = match filter {
      FragmentFilter::All => {
        format!("SELECT {FRAGMENT_COLUMNS} FROM fragments f ORDER BY f.fragment_id")
      }
      FragmentFilter::Unlinked => format!(
        "SELECT {FRAGMENT_COLUMNS} FROM fragments f
         WHERE NOT EXISTS (
           SELECT 1 FROM document_fragments df WHERE df.fragment_id = f.fragment_id
         )
         ORDER BY f.fragment_id"
      ),
    };

    let raws: Vec<RawFragment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], RawFragment::from_row)?.collect::<rusqlite::Result<_>>()?;
        Ok(rows)
      })
      .await?;

    decode_all(raws, RawFragment::into_fragment)
  }

  async fn fragment_tags(&self, fragment_id: i64) -> Result<Vec<Tag>> {
    let tags = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {TAG_COLUMNS} FROM tags t
           JOIN fragment_tags ft ON ft.tag_id = t.tag_id
           WHERE ft.fragment_id = ?1
           ORDER BY t.name"
        ))?;
        let rows = stmt.query_map(params![fragment_id], tag_from_row)?.collect::<rusqlite::Result<_>>()?;
        Ok(rows)
      })
      .await?;
    Ok(tags)
  }

  async fn delete_fragments(
    &self,
    ids: Vec<i64>,
    reason: Option<String>,
  ) -> Result<Vec<FragmentRemoval>> {
    let ids = unique_ids(ids);
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let removed_at = now();

    let outcome: Result<Vec<FragmentRemoval>> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let contents = match fragment_contents(&tx, &ids)? {
          Ok(contents) => contents,
          Err(missing) => return Ok(Err(Error::FragmentNotFound(missing))),
        };

        let mut removals = Vec::with_capacity(ids.len());
        for (fragment_id, content) in ids.into_iter().zip(contents) {
          let removal = FragmentRemoval {
            fragment_id,
            content,
            kind: RemovalKind::Deleted,
            merged_into: None,
            reason: reason.clone(),
            removed_at,
          };
          remove_fragment(&tx, &removal)?;
          removals.push(removal);
        }
        tx.commit()?;
        Ok(Ok(removals))
      })
      .await?;

    let removals = outcome?;
    tracing::debug!(count = removals.len(), "deleted fragments");
    Ok(removals)
  }

  async fn merge_fragments(
    &self,
    ids: Vec<i64>,
    new_content: String,
    reason: Option<String>,
  ) -> Result<Vec<FragmentRemoval>> {
    insight_core::error::require_text("merged fragment content", &new_content)?;
    let ids = unique_ids(ids);
    let Some(&keep) = ids.first() else {
      return Err(insight_core::Error::EmptyField("merge fragment ids").into());
    };
    let removed_at = now();

    let outcome: Result<Vec<FragmentRemoval>> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let contents = match fragment_contents(&tx, &ids)? {
          Ok(contents) => contents,
          Err(missing) => return Ok(Err(Error::FragmentNotFound(missing))),
        };

        tx.execute(
          "UPDATE fragments SET content = ?1, updated_at = ?2 WHERE fragment_id = ?3",
          params![new_content, encode_dt(removed_at), keep],
        )?;

        let mut removals = Vec::with_capacity(ids.len().saturating_sub(1));
        for (fragment_id, content) in ids.into_iter().zip(contents).skip(1) {
          let removal = FragmentRemoval {
            fragment_id,
            content,
            kind: RemovalKind::Merged,
            merged_into: Some(keep),
            reason: reason.clone(),
            removed_at,
          };
          remove_fragment(&tx, &removal)?;
          removals.push(removal);
        }
        tx.commit()?;
        Ok(Ok(removals))
      })
      .await?;

    let removals = outcome?;
    tracing::debug!(into = keep, merged = removals.len(), "merged fragments");
    Ok(removals)
  }

  async fn list_removals(&self) -> Result<Vec<FragmentRemoval>> {
    let raws: Vec<RawRemoval> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REMOVAL_COLUMNS} FROM fragment_removals r ORDER BY r.removal_id"
        ))?;
        let rows = stmt.query_map([], RawRemoval::from_row)?.collect::<rusqlite::Result<_>>()?;
        Ok(rows)
      })
      .await?;
    decode_all(raws, RawRemoval::into_removal)
  }

  // ── Tags ──────────────────────────────────────────────────────────────

  async fn create_or_get_tag(&self, name: String) -> Result<Tag> {
    let name = normalize_tag_name(&name).ok_or(insight_core::Error::EmptyField("tag name"))?;
    let at = encode_dt(now());
    let tag = self.conn.call(move |conn| Ok(upsert_tag(conn, &name, &at)?)).await?;
    Ok(tag)
  }

  async fn tag_fragment(&self, fragment_id: i64, tag_id: i64) -> Result<bool> {
    let outcome: Result<bool> = self
      .conn
      .call(move |conn| {
        if !exists(conn, "fragments", "fragment_id", fragment_id)? {
          return Ok(Err(Error::FragmentNotFound(fragment_id)));
        }
        if !exists(conn, "tags", "tag_id", tag_id)? {
          return Ok(Err(Error::TagNotFound(tag_id)));
        }
        let written = conn.execute(
          "INSERT OR IGNORE INTO fragment_tags (fragment_id, tag_id) VALUES (?1, ?2)",
          params![fragment_id, tag_id],
        )?;
        Ok(Ok(written > 0))
      })
      .await?;
    outcome
  }

  async fn list_tags(&self) -> Result<Vec<TagCount>> {
    let tags = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {TAG_COLUMNS}, COUNT(dt.document_id) FROM tags t
           LEFT JOIN document_tags dt ON dt.tag_id = t.tag_id
           GROUP BY t.tag_id
           ORDER BY t.name"
        ))?;
        let rows = stmt.query_map([], tag_count_from_row)?.collect::<rusqlite::Result<_>>()?;
        Ok(rows)
      })
      .await?;
    Ok(tags)
  }

  // ── Documents ─────────────────────────────────────────────────────────

  async fn create_document(&self, input: NewDocument) -> Result<LinkedDocument> {
    input.validate()?;
    let created_at = now();
    let at = encode_dt(created_at);
    let version = input.version.encode();

    let outcome: Result<LinkedDocument> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO documents
             (title, summary, content, version_created_at, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
          params![input.title, input.summary, input.content, version, at],
        )?;
        let document_id = tx.last_insert_rowid();

        let mut fragment_ids = Vec::new();
        for &fid in &input.fragment_ids {
          if exists(&tx, "fragments", "fragment_id", fid)?
            && tx.execute(
              "INSERT OR IGNORE INTO document_fragments (document_id, fragment_id) VALUES (?1, ?2)",
              params![document_id, fid],
            )? > 0
          {
            fragment_ids.push(fid);
          }
        }
        // Dropping the transaction rolls the insert back.
        if fragment_ids.is_empty() {
          return Ok(Err(insight_core::Error::NoSourceFragments.into()));
        }

        let mut tag_ids = Vec::new();
        for &tid in &input.tag_ids {
          if exists(&tx, "tags", "tag_id", tid)?
            && tx.execute(
              "INSERT OR IGNORE INTO document_tags (document_id, tag_id) VALUES (?1, ?2)",
              params![document_id, tid],
            )? > 0
          {
            tag_ids.push(tid);
          }
        }
        tx.commit()?;

        Ok(Ok(LinkedDocument {
          document: Document {
            document_id,
            title: input.title,
            summary: input.summary,
            content: input.content,
            version: input.version,
            created_at,
            updated_at: created_at,
          },
          fragment_ids,
          tag_ids,
        }))
      })
      .await?;
    let linked = outcome?;

    tracing::debug!(
      document_id = linked.document.document_id,
      fragments = linked.fragment_ids.len(),
      tags = linked.tag_ids.len(),
      "created document"
    );
    Ok(linked)
  }

  async fn link_fragment(&self, document_id: i64, fragment_id: i64) -> Result<bool> {
    let outcome: Result<bool> = self
      .conn
      .call(move |conn| {
        if !exists(conn, "documents", "document_id", document_id)? {
          return Ok(Err(Error::DocumentNotFound(document_id)));
        }
        if !exists(conn, "fragments", "fragment_id", fragment_id)? {
          return Ok(Err(Error::FragmentNotFound(fragment_id)));
        }
        let written = conn.execute(
          "INSERT OR IGNORE INTO document_fragments (document_id, fragment_id) VALUES (?1, ?2)",
          params![document_id, fragment_id],
        )?;
        Ok(Ok(written > 0))
      })
      .await?;
    outcome
  }

  async fn link_tag(&self, document_id: i64, tag_id: i64) -> Result<bool> {
    let outcome: Result<bool> = self
      .conn
      .call(move |conn| {
        if !exists(conn, "documents", "document_id", document_id)? {
          return Ok(Err(Error::DocumentNotFound(document_id)));
        }
        if !exists(conn, "tags", "tag_id", tag_id)? {
          return Ok(Err(Error::TagNotFound(tag_id)));
        }
        let written = conn.execute(
          "INSERT OR IGNORE INTO document_tags (document_id, tag_id) VALUES (?1, ?2)",
          params![document_id, tag_id],
        )?;
        Ok(Ok(written > 0))
      })
      .await?;
    outcome
  }

  async fn get_document(&self, id: i64) -> Result<Option<Document>> {
    let raw = self.conn.call(move |conn| Ok(select_document(conn, id)?)).await?;
    raw.map(RawDocument::into_document).transpose()
  }

  async fn find_document(&self, reference: DocumentRef) -> Result<Option<Document>> {
    let (id, title) = match reference {
      DocumentRef::Id(id) => (Some(id), id.to_string()),
      DocumentRef::Title(title) => (None, title),
    };

    let raw = self
      .conn
      .call(move |conn| {
        if let Some(id) = id {
          if let Some(raw) = select_document(conn, id)? {
            return Ok(Some(raw));
          }
        }
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE d.title = ?1
                 ORDER BY d.version_created_at DESC, d.document_id DESC
                 LIMIT 1"
              ),
              params![title],
              RawDocument::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDocument::into_document).transpose()
  }

  async fn document_detail(&self, id: i64) -> Result<Option<DocumentDetail>> {
    let raw: Option<RawDetail> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let detail = match select_document(&tx, id)? {
          Some(document) => Some(load_detail(&tx, document)?),
          None => None,
        };
        tx.commit()?;
        Ok(detail)
      })
      .await?;

    raw.map(RawDetail::into_detail).transpose()
  }

  async fn update_document(&self, id: i64, revision: DocumentRevision) -> Result<Option<Document>> {
    revision.validate()?;
    let at = encode_dt(now());

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE documents SET title = ?1, summary = ?2, content = ?3, updated_at = ?4
           WHERE document_id = ?5",
          params![revision.title, revision.summary, revision.content, at, id],
        )?;
        let raw = if changed > 0 { select_document(&tx, id)? } else { None };
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawDocument::into_document).transpose()
  }

  async fn list_documents(&self) -> Result<Vec<Document>> {
    let raws = self
      .conn
      .call(|conn| {
        Ok(select_documents(
          conn,
          &format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents d
             ORDER BY d.version_created_at DESC, d.document_id"
          ),
          [],
        )?)
      })
      .await?;
    decode_all(raws, RawDocument::into_document)
  }

  async fn documents_by_tag(&self, tag_name: String) -> Result<Vec<Document>> {
    let name = tag_name.trim().to_owned();
    let raws = self
      .conn
      .call(move |conn| {
        Ok(select_documents(
          conn,
          &format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents d
             JOIN document_tags dt ON dt.document_id = d.document_id
             JOIN tags t ON t.tag_id = dt.tag_id
             WHERE t.name = ?1
             ORDER BY d.version_created_at DESC, d.document_id"
          ),
          params![name],
        )?)
      })
      .await?;
    decode_all(raws, RawDocument::into_document)
  }

  async fn search_documents(&self, term: String) -> Result<Vec<Document>> {
    let pattern = like_pattern(term.trim());
    let raws = self
      .conn
      .call(move |conn| {
        Ok(select_documents(
          conn,
          &format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents d
             WHERE d.title LIKE ?1 ESCAPE '\\'
                OR d.summary LIKE ?1 ESCAPE '\\'
                OR d.content LIKE ?1 ESCAPE '\\'
             ORDER BY d.version_created_at DESC, d.document_id"
          ),
          params![pattern],
        )?)
      })
      .await?;
    decode_all(raws, RawDocument::into_document)
  }

  async fn latest_version(&self) -> Result<Option<VersionStamp>> {
    let raw: Option<String> = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT MAX(version_created_at) FROM documents", [], |r| r.get(0))?)
      })
      .await?;
    raw.as_deref().map(decode_version).transpose()
  }

  async fn list_versions(&self) -> Result<Vec<VersionStamp>> {
    let raws: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT version_created_at FROM documents ORDER BY version_created_at DESC",
        )?;
        let rows = stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;
        Ok(rows)
      })
      .await?;
    raws.iter().map(|s| decode_version(s)).collect()
  }

  async fn documents_in_version(&self, version: VersionStamp) -> Result<Vec<DocumentDetail>> {
    let version = version.encode();
    let raws: Vec<RawDetail> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let documents = select_documents(
          &tx,
          &format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents d
             WHERE d.version_created_at = ?1
             ORDER BY d.document_id"
          ),
          params![version],
        )?;
        let details = documents
          .into_iter()
          .map(|d| load_detail(&tx, d))
          .collect::<rusqlite::Result<Vec<_>>>()?;
        tx.commit()?;
        Ok(details)
      })
      .await?;
    decode_all(raws, RawDetail::into_detail)
  }

  // ── Questions ─────────────────────────────────────────────────────────

  async fn add_question(&self, input: NewQuestion) -> Result<Question> {
    insight_core::error::require_text("question text", &input.question_text)?;
    let at = encode_dt(now());
    let fragment_ids = encode_ids(&input.context_fragment_ids)?;
    let document_ids = encode_ids(&input.context_document_ids)?;
    let text = input.question_text.trim().to_owned();

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO questions
             (question_text, context_fragment_ids, context_document_ids, status, created_at)
           VALUES (?1, ?2, ?3, 'pending', ?4)",
          params![text, fragment_ids, document_ids, at],
        )?;
        let id = conn.last_insert_rowid();
        let raw = select_question(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        Ok(raw)
      })
      .await?;
    raw.into_question()
  }

  async fn get_question(&self, id: i64) -> Result<Option<Question>> {
    let raw = self.conn.call(move |conn| Ok(select_question(conn, id)?)).await?;
    raw.map(RawQuestion::into_question).transpose()
  }

  async fn list_questions(&self, pending_only: bool) -> Result<Vec<Question>> {
    let filter = if pending_only { "WHERE q.status = 'pending'" } else { "" };
    let sql = format!(
      "SELECT {QUESTION_COLUMNS} FROM questions q {filter}
       ORDER BY q.created_at DESC, q.question_id DESC"
    );
    let raws: Vec<RawQuestion> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], RawQuestion::from_row)?.collect::<rusqlite::Result<_>>()?;
        Ok(rows)
      })
      .await?;
    decode_all(raws, RawQuestion::into_question)
  }

  async fn answer_question(&self, id: i64, answer_text: String) -> Result<(Question, Fragment)> {
    insight_core::error::require_text("answer text", &answer_text)?;
    let at = encode_dt(now());

    let outcome: Result<(RawQuestion, RawFragment)> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let question = match resolve_question(&tx, id)? {
          Ok(q) => q,
          Err(e) => return Ok(Err(e)),
        };

        let record = AnswerRecord::for_question(id, question.question_text, answer_text);
        let content = match record.to_fragment_content() {
          Ok(c) => c,
          Err(e) => return Ok(Err(e.into())),
        };

        tx.execute(
          "INSERT INTO fragments (content, created_at, updated_at) VALUES (?1, ?2, ?2)",
          params![content, at],
        )?;
        let fragment_id = tx.last_insert_rowid();
        tx.execute(
          "UPDATE questions SET status = 'answered', answered_at = ?1, answer_fragment_id = ?2
           WHERE question_id = ?3",
          params![at, fragment_id, id],
        )?;

        let question = select_question(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        let fragment =
          select_fragment(&tx, fragment_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(Ok((question, fragment)))
      })
      .await?;

    let (question, fragment) = outcome?;
    Ok((question.into_question()?, fragment.into_fragment()?))
  }

  async fn archive_question(&self, id: i64) -> Result<Question> {
    let outcome: Result<RawQuestion> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if let Err(e) = resolve_question(&tx, id)? {
          return Ok(Err(e));
        }
        tx.execute(
          "UPDATE questions SET status = 'archived' WHERE question_id = ?1",
          params![id],
        )?;
        let question = select_question(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(Ok(question))
      })
      .await?;
    outcome?.into_question()
  }

  // ── Bulk ──────────────────────────────────────────────────────────────

  async fn reset_documents(&self) -> Result<ClearSummary> {
    let summary = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM document_tags", [])?;
        tx.execute("DELETE FROM document_fragments", [])?;
        let documents = tx.execute("DELETE FROM documents", [])?;
        let tags = tx.execute(
          "DELETE FROM tags WHERE tag_id NOT IN (SELECT tag_id FROM fragment_tags)",
          [],
        )?;
        tx.commit()?;
        Ok(ClearSummary { documents: documents as u64, tags: tags as u64, ..Default::default() })
      })
      .await?;
    tracing::info!(documents = summary.documents, tags = summary.tags, "reset documents");
    Ok(summary)
  }

  async fn clear_all(&self) -> Result<ClearSummary> {
    let summary = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM document_tags", [])?;
        tx.execute("DELETE FROM document_fragments", [])?;
        tx.execute("DELETE FROM fragment_tags", [])?;
        let documents = tx.execute("DELETE FROM documents", [])?;
        let tags = tx.execute("DELETE FROM tags", [])?;
        let questions = tx.execute("DELETE FROM questions", [])?;
        tx.execute("DELETE FROM fragment_removals", [])?;
        let fragments = tx.execute("DELETE FROM fragments", [])?;
        tx.commit()?;
        Ok(ClearSummary {
          documents: documents as u64,
          tags:      tags as u64,
          fragments: fragments as u64,
          questions: questions as u64,
        })
      })
      .await?;
    tracing::info!(
      documents = summary.documents,
      fragments = summary.fragments,
      "cleared knowledge base"
    );
    Ok(summary)
  }

  async fn status(&self) -> Result<StoreStatus> {
    let status = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        let status = StoreStatus {
          documents:          count(&tx, "SELECT COUNT(*) FROM documents")?,
          fragments:          count(&tx, "SELECT COUNT(*) FROM fragments")?,
          unlinked_fragments: count(
            &tx,
            "SELECT COUNT(*) FROM fragments f
             WHERE NOT EXISTS (
               SELECT 1 FROM document_fragments df WHERE df.fragment_id = f.fragment_id
             )",
          )?,
          tags:               count(&tx, "SELECT COUNT(*) FROM tags")?,
          pending_questions:  count(&tx, "SELECT COUNT(*) FROM questions WHERE status = 'pending'")?,
          versions:           count(&tx, "SELECT COUNT(DISTINCT version_created_at) FROM documents")?,
        };
        tx.commit()?;
        Ok(status)
      })
      .await?;
    Ok(status)
  }
}
