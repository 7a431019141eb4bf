//! Lexical (BM25) search backend contract and the default `tantivy`-backed
//! implementation.

use crate::vector::BatchFailureBudget;
use kodit_core::document::Document;
use kodit_core::error::{Error, Result};
use kodit_core::filters::SearchFilters;
use kodit_core::fusion::{RankedItem, RankedList};
use kodit_db::{DbError, DbPool, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, IndexRecordOption, STORED, STRING, Schema, SchemaBuilder, TextFieldIndexing, TextOptions, Value as _};
use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer};
use tantivy::{Index, IndexWriter, TantivyDocument, Term};

const DEFAULT_TOP_K: i64 = 10;
const TOKENIZER_NAME: &str = "kodit_default";
const WRITER_HEAP_BYTES: usize = 15_000_000;

/// Lexical search over indexed [`Document`]s, keyed by snippet id.
pub trait Bm25Store: Send + Sync {
    /// Add or refresh lexical entries. Idempotent on snippet id: re-indexing
    /// an id that already exists is a no-op by default (skip-if-exists).
    /// Blank id or blank text documents are filtered out silently.
    /// `failure_budget` caps the fraction of documents that may fail to add
    /// before the call aborts (default 5%); mirrors `VectorStore::index`'s
    /// contract even though a single `tantivy` commit rarely fails per-document.
    fn index(&self, documents: &[Document], failure_budget: Option<BatchFailureBudget>) -> Result<()>;

    /// Ranked `(snippet_id, score)` pairs, highest score first. `top_k <= 0`
    /// coerces to 10. An empty query returns an empty list. When `allowlist`
    /// is `Some`, only snippet ids present in it are considered eligible —
    /// callers resolve [`SearchFilters`] into an allowlist via the snippet
    /// metadata table before calling this, since this backend only indexes
    /// `snippet_id` and raw text.
    fn search(
        &self,
        query: &str,
        top_k: i64,
        filters: &SearchFilters,
        allowlist: Option<&[String]>,
    ) -> Result<RankedList>;

    /// Remove entries. Deleting unknown ids is a no-op.
    fn delete(&self, snippet_ids: &[String]) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
struct FieldHandles {
    snippet_id: Field,
    passage: Field,
}

fn build_schema() -> (Schema, FieldHandles) {
    let mut builder = SchemaBuilder::new();
    let snippet_id = builder.add_text_field("snippet_id", STRING | STORED);
    let passage_options = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TOKENIZER_NAME)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    let passage = builder.add_text_field("passage", passage_options);
    let schema = builder.build();
    (schema, FieldHandles { snippet_id, passage })
}

fn register_tokenizer(index: &Index) {
    let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(RemoveLongFilter::limit(256))
        .build();
    index.tokenizers().register(TOKENIZER_NAME, analyzer);
}

/// Default BM25 backend: a `tantivy` index storing `(snippet_id, passage)`
/// pairs. Native BM25 scores are already higher-is-better; they are clamped
/// to be non-negative for contract uniformity with the vector store.
pub struct TantivyBm25Store {
    index: Index,
    handles: FieldHandles,
    writer: Mutex<IndexWriter>,
    indexed_ids: Mutex<HashSet<String>>,
}

impl TantivyBm25Store {
    /// An ephemeral, process-local index. Used for tests and for
    /// deployments that rebuild the lexical index from scratch on startup.
    pub fn create_in_ram() -> Result<Self> {
        let (schema, handles) = build_schema();
        let index = Index::create_in_ram(schema);
        register_tokenizer(&index);
        let writer = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| Error::Internal(format!("tantivy writer init: {e}")))?;
        Ok(Self {
            index,
            handles,
            writer: Mutex::new(writer),
            indexed_ids: Mutex::new(HashSet::new()),
        })
    }

    /// A durable index rooted at `dir`, created if absent, reopened if
    /// present. Existing snippet ids are discovered by scanning the index so
    /// the skip-if-exists contract holds across restarts.
    pub fn open_in_dir(dir: &std::path::Path) -> Result<Self> {
        let (schema, handles) = build_schema();
        let index = if dir.join("meta.json").exists() {
            Index::open_in_dir(dir).map_err(|e| Error::Internal(format!("tantivy open: {e}")))?
        } else {
            std::fs::create_dir_all(dir).map_err(Error::Io)?;
            Index::create_in_dir(dir, schema)
                .map_err(|e| Error::Internal(format!("tantivy create: {e}")))?
        };
        register_tokenizer(&index);
        let writer = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| Error::Internal(format!("tantivy writer init: {e}")))?;

        let store = Self {
            index,
            handles,
            writer: Mutex::new(writer),
            indexed_ids: Mutex::new(HashSet::new()),
        };
        store.rebuild_known_ids()?;
        Ok(store)
    }

    fn rebuild_known_ids(&self) -> Result<()> {
        let reader = self
            .index
            .reader()
            .map_err(|e| Error::Internal(format!("tantivy reader: {e}")))?;
        let searcher = reader.searcher();
        let top_docs = searcher
            .search(&tantivy::query::AllQuery, &TopDocs::with_limit(usize::MAX))
            .map_err(|e| Error::Internal(format!("tantivy scan: {e}")))?;
        let mut ids = self.indexed_ids.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for (_score, addr) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(addr)
                .map_err(|e| Error::Internal(format!("tantivy doc fetch: {e}")))?;
            if let Some(id) = doc.get_first(self.handles.snippet_id).and_then(|v| v.as_str()) {
                ids.insert(id.to_owned());
            }
        }
        Ok(())
    }
}

impl Bm25Store for TantivyBm25Store {
    fn index(&self, documents: &[Document], failure_budget: Option<BatchFailureBudget>) -> Result<()> {
        let budget = failure_budget.unwrap_or_default();
        let candidates: Vec<&Document> = documents
            .iter()
            .filter(|d| !d.snippet_id.trim().is_empty() && !d.is_blank())
            .collect();
        let total = candidates.len();
        let mut failed = 0usize;

        let mut writer = self.writer.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut known = self.indexed_ids.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for doc in candidates {
            if known.contains(&doc.snippet_id) {
                continue;
            }
            let result = writer.add_document(tantivy::doc!(
                self.handles.snippet_id => doc.snippet_id.clone(),
                self.handles.passage => doc.text.clone(),
            ));
            match result {
                Ok(()) => {
                    known.insert(doc.snippet_id.clone());
                }
                Err(_) => {
                    failed += 1;
                    if budget.exceeded(failed, total) {
                        return Err(Error::FailureBudgetExceeded { failed, total, budget_pct: budget.pct });
                    }
                }
            }
        }
        writer
            .commit()
            .map_err(|e| Error::Internal(format!("tantivy commit: {e}")))?;
        Ok(())
    }

    fn search(
        &self,
        query: &str,
        top_k: i64,
        _filters: &SearchFilters,
        allowlist: Option<&[String]>,
    ) -> Result<RankedList> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let top_k = if top_k <= 0 { DEFAULT_TOP_K } else { top_k };
        #[allow(clippy::cast_sign_loss)]
        let limit = if allowlist.is_some() {
            (top_k as usize).saturating_mul(8).max(64)
        } else {
            top_k as usize
        };

        let reader = self
            .index
            .reader()
            .map_err(|e| Error::Internal(format!("tantivy reader: {e}")))?;
        let searcher = reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.handles.passage]);
        let parsed = parser
            .parse_query(query)
            .map_err(|e| Error::InvalidInput(format!("bm25 query parse: {e}")))?;
        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(limit))
            .map_err(|e| Error::Internal(format!("tantivy search: {e}")))?;

        let allowed: Option<HashSet<&str>> =
            allowlist.map(|ids| ids.iter().map(String::as_str).collect());

        let mut out = Vec::new();
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(addr)
                .map_err(|e| Error::Internal(format!("tantivy doc fetch: {e}")))?;
            let Some(id) = doc.get_first(self.handles.snippet_id).and_then(|v| v.as_str()) else {
                continue;
            };
            if let Some(allowed) = &allowed {
                if !allowed.contains(id) {
                    continue;
                }
            }
            out.push(RankedItem { snippet_id: id.to_owned(), score: f64::from(score).max(0.0) });
            #[allow(clippy::cast_sign_loss)]
            if out.len() >= top_k as usize {
                break;
            }
        }
        Ok(out)
    }

    fn delete(&self, snippet_ids: &[String]) -> Result<()> {
        if snippet_ids.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut known = self.indexed_ids.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for id in snippet_ids {
            let term = Term::from_field_text(self.handles.snippet_id, id);
            writer.delete_term(term);
            known.remove(id);
        }
        writer
            .commit()
            .map_err(|e| Error::Internal(format!("tantivy commit: {e}")))?;
        Ok(())
    }
}

/// Alternate BM25 backend: `SQLite`'s `fts5` extension, backing onto the
/// `snippets_fts` virtual table `kodit-db` creates alongside `snippets`
/// (triggers keep it in sync on every insert/update/delete — see
/// `kodit_db::schema`). Chosen over `TantivyBm25Store` by
/// `KODIT_BM25_BACKEND=sqlite_fts` for deployments that would rather not run
/// a second on-disk index next to the relational database.
///
/// `index`/`delete` are no-ops here: this store has no state of its own to
/// mutate. Lexical content enters and leaves `snippets_fts` automatically
/// whenever a caller writes to `snippets` through `SnippetStore`, so by the
/// time a `Document` would reach `index`, the trigger has already run.
pub struct SqliteFtsBm25Store {
    pool: Arc<DbPool>,
}

impl SqliteFtsBm25Store {
    #[must_use]
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

/// `fts5` raises a syntax error on bare punctuation and on queries that
/// look like column filters (`column:term`). Quoting every whitespace-split
/// token turns the query into an implicit AND of phrase matches, which is
/// never ambiguous `fts5` syntax regardless of what the caller typed.
fn quote_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Bm25Store for SqliteFtsBm25Store {
    fn index(&self, _documents: &[Document], _failure_budget: Option<BatchFailureBudget>) -> Result<()> {
        Ok(())
    }

    fn search(
        &self,
        query: &str,
        top_k: i64,
        _filters: &SearchFilters,
        allowlist: Option<&[String]>,
    ) -> Result<RankedList> {
        let quoted = quote_fts_query(query);
        if quoted.is_empty() {
            return Ok(Vec::new());
        }
        let top_k = if top_k <= 0 { DEFAULT_TOP_K } else { top_k };
        #[allow(clippy::cast_sign_loss)]
        let limit = if allowlist.is_some() {
            (top_k as usize).saturating_mul(8).max(64)
        } else {
            top_k as usize
        };

        // `bm25()` is lower-is-better in `fts5`; negate so higher-is-better
        // holds across every `Bm25Store` implementation, then clamp
        // non-negative for contract uniformity with `TantivyBm25Store`.
        let rows = self
            .pool
            .with_conn(|conn| {
                conn.query_sync(
                    "SELECT snippet_id, -bm25(snippets_fts) AS rank FROM snippets_fts \
                     WHERE snippets_fts MATCH ? ORDER BY rank DESC LIMIT ?",
                    &[Value::Text(quoted), Value::BigInt(i64::try_from(limit).unwrap_or(i64::MAX))],
                )
                .map_err(|e| DbError::Sql(e.to_string()))
            })
            .map_err(kodit_core::Error::from)?;

        let allowed: Option<HashSet<&str>> =
            allowlist.map(|ids| ids.iter().map(String::as_str).collect());

        let mut out = Vec::new();
        for row in &rows {
            let id = row
                .get_named::<String>("snippet_id")
                .map_err(|e| Error::Internal(format!("fts5 row decode: {e}")))?;
            if let Some(allowed) = &allowed {
                if !allowed.contains(id.as_str()) {
                    continue;
                }
            }
            let score = row.get_named::<f64>("rank").map_err(|e| Error::Internal(format!("fts5 row decode: {e}")))?;
            out.push(RankedItem { snippet_id: id, score: score.max(0.0) });
            #[allow(clippy::cast_sign_loss)]
            if out.len() >= top_k as usize {
                break;
            }
        }
        Ok(out)
    }

    fn delete(&self, _snippet_ids: &[String]) -> Result<()> {
        Ok(())
    }
}
