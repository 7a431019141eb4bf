//! Snippet metadata storage and the `SnippetStore` collaborator (§6
//! "Inbound: `SnippetStore` (provided)").
//!
//! The search backends in `kodit-search-core` only ever see
//! `(snippet_id, text)` pairs — they know nothing about language, author,
//! or which commit a snippet came from. This module owns that metadata,
//! persisted in `kodit-db`'s `snippets` table, and is the thing the hybrid
//! coordinator asks to turn a [`SearchFilters`] into an allowlist before
//! calling into BM25/vector search.

use kodit_core::document::Document;
use kodit_core::error::Result;
use kodit_core::filters::SearchFilters;
use kodit_db::{DbError, DbPool, Value};
use std::sync::Arc;

/// One stored unit of indexed content: a file, function, or other
/// extraction unit, tagged with the commit and repository it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    pub snippet_id: String,
    pub source_repo_id: Option<i64>,
    pub commit_sha: Option<String>,
    pub file_path: Option<String>,
    pub language: Option<String>,
    pub author: Option<String>,
    pub created_at: i64,
    pub content: String,
}

impl Snippet {
    #[must_use]
    pub fn as_document(&self) -> Document {
        Document { snippet_id: self.snippet_id.clone(), text: self.content.clone() }
    }
}

/// The `SnippetStore` collaborator: provided to the core by whatever owns
/// the repository/commit domain model. `kodit`'s default implementation is
/// [`SqliteSnippetStore`]; tests may swap in an in-memory fake.
pub trait SnippetStore: Send + Sync {
    /// Persist or replace snippet rows. Upserts by `snippet_id`.
    fn upsert_many(&self, snippets: &[Snippet]) -> Result<()>;

    /// All snippets extracted from `commit_sha`, in no particular order.
    fn snippets_for_commit(&self, commit_sha: &str) -> Result<Vec<Snippet>>;

    /// Remove every snippet tied to `commit_sha`. Used by `rescan` to clear
    /// prior indexed data before re-extraction. Idempotent.
    fn delete_for_commit(&self, commit_sha: &str) -> Result<()>;

    /// A single snippet by id, if it exists.
    fn get(&self, snippet_id: &str) -> Result<Option<Snippet>>;

    /// Resolve `filters` into the set of snippet ids that satisfy every
    /// predicate, for callers (the hybrid coordinator) that need to pass an
    /// allowlist into a backend that only understands `snippet_id` and raw
    /// text. `None` means "unfiltered" and lets the backend skip allowlist
    /// evaluation entirely.
    fn resolve_allowlist(&self, filters: &SearchFilters) -> Result<Option<Vec<String>>>;
}

/// The only production [`SnippetStore`]: the `snippets` table `kodit-db`
/// creates, accessed through a shared [`DbPool`].
pub struct SqliteSnippetStore {
    pool: Arc<DbPool>,
}

impl SqliteSnippetStore {
    #[must_use]
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

/// Decode one `snippets` row into a [`Snippet`]. A macro rather than a
/// generic function for the same reason as `kodit-queue`'s `task_from_row!`
/// — the row type `query_sync` returns is an implementation detail of
/// `sqlmodel-sqlite` this crate never names directly.
macro_rules! snippet_from_row {
    ($row:expr) => {{
        let row = $row;
        (|| -> std::result::Result<Snippet, DbError> {
            Ok(Snippet {
                snippet_id: row
                    .get_named::<String>("snippet_id")
                    .map_err(|e| DbError::Decode(e.to_string()))?,
                source_repo_id: row
                    .get_named::<Option<i64>>("source_repo_id")
                    .map_err(|e| DbError::Decode(e.to_string()))?,
                commit_sha: row
                    .get_named::<Option<String>>("commit_sha")
                    .map_err(|e| DbError::Decode(e.to_string()))?,
                file_path: row
                    .get_named::<Option<String>>("file_path")
                    .map_err(|e| DbError::Decode(e.to_string()))?,
                language: row
                    .get_named::<Option<String>>("language")
                    .map_err(|e| DbError::Decode(e.to_string()))?,
                author: row
                    .get_named::<Option<String>>("author")
                    .map_err(|e| DbError::Decode(e.to_string()))?,
                created_at: row.get_named::<i64>("created_at").map_err(|e| DbError::Decode(e.to_string()))?,
                content: row.get_named::<String>("content").map_err(|e| DbError::Decode(e.to_string()))?,
            })
        })()
    }};
}

const SELECT_COLUMNS: &str =
    "snippet_id, source_repo_id, commit_sha, file_path, language, author, created_at, content";

impl SnippetStore for SqliteSnippetStore {
    fn upsert_many(&self, snippets: &[Snippet]) -> Result<()> {
        if snippets.is_empty() {
            return Ok(());
        }
        self.pool
            .with_conn(|conn| {
                for s in snippets {
                    conn.execute_sync(
                        "INSERT INTO snippets \
                         (snippet_id, source_repo_id, commit_sha, file_path, language, author, created_at, content) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                         ON CONFLICT(snippet_id) DO UPDATE SET \
                         source_repo_id = excluded.source_repo_id, \
                         commit_sha = excluded.commit_sha, \
                         file_path = excluded.file_path, \
                         language = excluded.language, \
                         author = excluded.author, \
                         created_at = excluded.created_at, \
                         content = excluded.content",
                        &[
                            Value::Text(s.snippet_id.clone()),
                            s.source_repo_id.map_or(Value::Null, Value::BigInt),
                            s.commit_sha.clone().map_or(Value::Null, Value::Text),
                            s.file_path.clone().map_or(Value::Null, Value::Text),
                            s.language.clone().map_or(Value::Null, Value::Text),
                            s.author.clone().map_or(Value::Null, Value::Text),
                            Value::BigInt(s.created_at),
                            Value::Text(s.content.clone()),
                        ],
                    )
                    .map_err(|e| DbError::Sql(e.to_string()))?;
                }
                Ok(())
            })
            .map_err(Into::into)
    }

    fn snippets_for_commit(&self, commit_sha: &str) -> Result<Vec<Snippet>> {
        self.pool
            .with_conn(|conn| {
                let rows = conn
                    .query_sync(
                        &format!("SELECT {SELECT_COLUMNS} FROM snippets WHERE commit_sha = ?"),
                        &[Value::Text(commit_sha.to_owned())],
                    )
                    .map_err(|e| DbError::Sql(e.to_string()))?;
                rows.iter().map(|row| snippet_from_row!(row)).collect()
            })
            .map_err(Into::into)
    }

    fn delete_for_commit(&self, commit_sha: &str) -> Result<()> {
        self.pool
            .with_conn(|conn| {
                conn.execute_sync("DELETE FROM snippets WHERE commit_sha = ?", &[Value::Text(commit_sha.to_owned())])
                    .map_err(|e| DbError::Sql(e.to_string()))?;
                Ok(())
            })
            .map_err(Into::into)
    }

    fn get(&self, snippet_id: &str) -> Result<Option<Snippet>> {
        self.pool
            .with_conn(|conn| {
                let rows = conn
                    .query_sync(
                        &format!("SELECT {SELECT_COLUMNS} FROM snippets WHERE snippet_id = ?"),
                        &[Value::Text(snippet_id.to_owned())],
                    )
                    .map_err(|e| DbError::Sql(e.to_string()))?;
                rows.first().map(|row| snippet_from_row!(row)).transpose()
            })
            .map_err(Into::into)
    }

    fn resolve_allowlist(&self, filters: &SearchFilters) -> Result<Option<Vec<String>>> {
        if filters.is_empty() {
            return Ok(None);
        }

        // No enrichment table exists in this deployment profile — enrichment
        // generation is out of scope (§1 non-goals), so no snippet ever
        // carries an enrichment type or subtype. A predicate over either
        // field can therefore never be satisfied: resolve to an empty
        // allowlist rather than silently dropping the predicate, which
        // would make the filter behave as if it had not been requested.
        if !filters.enrichment_types.is_empty() || !filters.enrichment_subtypes.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(language) = &filters.language {
            clauses.push("language = ?".to_owned());
            params.push(Value::Text(language.clone()));
        }
        if let Some(author) = &filters.author {
            clauses.push("author = ?".to_owned());
            params.push(Value::Text(author.clone()));
        }
        if let Some(after) = filters.created_after {
            clauses.push("created_at >= ?".to_owned());
            params.push(Value::BigInt(after));
        }
        if let Some(before) = filters.created_before {
            clauses.push("created_at <= ?".to_owned());
            params.push(Value::BigInt(before));
        }
        if let Some(repo_id) = filters.source_repo_id {
            clauses.push("source_repo_id = ?".to_owned());
            params.push(Value::BigInt(repo_id));
        }
        if let Some(glob) = &filters.file_path_glob {
            // Backends without native glob support fall back to prefix
            // matching (§3): strip a trailing `*` if present, then use it
            // as a `LIKE` prefix.
            let prefix = glob.strip_suffix('*').unwrap_or(glob);
            clauses.push("file_path LIKE ?".to_owned());
            params.push(Value::Text(format!("{prefix}%")));
        }
        if !filters.commit_shas.is_empty() {
            let placeholders = filters.commit_shas.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            clauses.push(format!("commit_sha IN ({placeholders})"));
            for sha in &filters.commit_shas {
                params.push(Value::Text(sha.clone()));
            }
        }

        if clauses.is_empty() {
            return Ok(None);
        }

        let sql = format!("SELECT snippet_id FROM snippets WHERE {}", clauses.join(" AND "));
        self.pool
            .with_conn(|conn| {
                let rows = conn.query_sync(&sql, &params).map_err(|e| DbError::Sql(e.to_string()))?;
                rows.iter()
                    .map(|row| row.get_named::<String>("snippet_id").map_err(|e| DbError::Decode(e.to_string())))
                    .collect::<std::result::Result<Vec<String>, DbError>>()
            })
            .map(Some)
            .map_err(Into::into)
    }
}
