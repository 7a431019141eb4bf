//! Vector (semantic) search backend contract, the default in-process
//! cosine-similarity implementation, and the `Embedder` collaborator trait.

use crate::batcher::Batcher;
use kodit_core::document::{Document, Embedding, EmbeddingType};
use kodit_core::error::{Error, Result};
use kodit_core::filters::SearchFilters;
use kodit_core::fusion::{RankedItem, RankedList};
use kodit_db::{DbPool, Value};
use std::collections::HashSet;
use std::sync::Arc;

const DEFAULT_TOP_K: i64 = 10;
const DEFAULT_BATCH_FAILURE_BUDGET_PCT: u8 = 5;

/// Caps the fraction of embedding batches within one `index()` call that may
/// fail before the call aborts with [`Error::FailureBudgetExceeded`]. A
/// single misbehaving batch (one bad document, one transient provider
/// hiccup) doesn't sink an otherwise-healthy bulk index; a systemic outage
/// does.
#[derive(Debug, Clone, Copy)]
pub struct BatchFailureBudget {
    pub pct: u8,
}

impl Default for BatchFailureBudget {
    fn default() -> Self {
        Self { pct: DEFAULT_BATCH_FAILURE_BUDGET_PCT }
    }
}

impl BatchFailureBudget {
    pub(crate) fn exceeded(self, failed: usize, total: usize) -> bool {
        if total == 0 {
            return false;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio_pct = (failed as f64 / total as f64) * 100.0;
        ratio_pct > f64::from(self.pct)
    }
}

/// Turns text into vectors. Implemented by [`FastEmbedEmbedder`] in
/// production and by in-memory fakes in tests (§6 "thin collaborator
/// traits").
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, same order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Maximum input characters this embedder comfortably accepts per call,
    /// used to size the [`Batcher`] feeding it.
    fn capacity(&self) -> usize;

    /// The fixed output dimension every vector from this embedder has.
    fn dimension(&self) -> usize;
}

/// Semantic search over indexed [`Embedding`]s, keyed by snippet id and
/// partitioned by [`EmbeddingType`].
pub trait VectorStore: Send + Sync {
    /// Embed and upsert `documents` for `embedding_type`, skipping ids that
    /// already have an embedding of that type. Uses `embedder` through
    /// `batcher` so a single oversized document is truncated the same way
    /// indexing truncates it elsewhere in the pipeline.
    fn index(
        &self,
        documents: &[Document],
        embedding_type: EmbeddingType,
        embedder: &dyn Embedder,
        batcher: &Batcher,
        failure_budget: Option<BatchFailureBudget>,
    ) -> Result<()>;

    /// Ranked `(snippet_id, similarity)` pairs in `[0, 1]`, highest first.
    /// `top_k <= 0` coerces to 10.
    fn search(
        &self,
        query_vector: &[f32],
        embedding_type: EmbeddingType,
        top_k: i64,
        filters: &SearchFilters,
        allowlist: Option<&[String]>,
    ) -> Result<RankedList>;

    /// Whether `snippet_id` already has an embedding of `embedding_type`.
    fn has_embedding(&self, snippet_id: &str, embedding_type: EmbeddingType) -> Result<bool>;

    /// Set-membership probe over many ids at once.
    fn has_embeddings(
        &self,
        snippet_ids: &[String],
        embedding_type: EmbeddingType,
    ) -> Result<HashSet<String>>;

    /// Remove all embedding types for these snippet ids. Idempotent.
    fn delete(&self, snippet_ids: &[String]) -> Result<()>;
}

/// Cosine similarity, normalized to `[0, 1]` (`1` = identical). Returns `0`
/// when either vector has zero magnitude or the lengths disagree.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cos = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
    (cos + 1.0) / 2.0
}

/// The default, dependency-light vector store: embeddings persisted as JSON
/// float arrays in `kodit-db`'s `vector_embeddings` table, brute-force
/// cosine similarity computed at query time. Runs without a native ANN
/// extension; fine at the scale this workspace targets.
pub struct JsonCosineVectorStore {
    pool: Arc<DbPool>,
}

impl JsonCosineVectorStore {
    #[must_use]
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    fn upsert(&self, embeddings: &[Embedding], now_micros: i64) -> Result<()> {
        self.pool
            .with_conn(|conn| {
                for e in embeddings {
                    let json = serde_json::to_string(&e.vector)
                        .map_err(|err| kodit_db::DbError::Decode(err.to_string()))?;
                    conn.execute_sync(
                        "INSERT INTO vector_embeddings (snippet_id, embedding_type, vector, created_at) \
                         VALUES (?, ?, ?, ?) \
                         ON CONFLICT(snippet_id, embedding_type) DO UPDATE SET \
                         vector = excluded.vector, created_at = excluded.created_at",
                        &[
                            Value::Text(e.snippet_id.clone()),
                            Value::Text(e.embedding_type.as_str().to_owned()),
                            Value::Text(json),
                            Value::BigInt(now_micros),
                        ],
                    )
                    .map_err(|err| kodit_db::DbError::Sql(err.to_string()))?;
                }
                Ok(())
            })
            .map_err(Into::into)
    }

    fn load_all(&self, embedding_type: EmbeddingType) -> Result<Vec<(String, Vec<f32>)>> {
        self.pool
            .with_conn(|conn| {
                let rows = conn
                    .query_sync(
                        "SELECT snippet_id, vector FROM vector_embeddings WHERE embedding_type = ?",
                        &[Value::Text(embedding_type.as_str().to_owned())],
                    )
                    .map_err(|e| kodit_db::DbError::Sql(e.to_string()))?;
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    let snippet_id = row
                        .get_named::<String>("snippet_id")
                        .map_err(|e| kodit_db::DbError::Decode(e.to_string()))?;
                    let raw = row
                        .get_named::<String>("vector")
                        .map_err(|e| kodit_db::DbError::Decode(e.to_string()))?;
                    let vector: Vec<f32> = serde_json::from_str(&raw)
                        .map_err(|e| kodit_db::DbError::Decode(e.to_string()))?;
                    out.push((snippet_id, vector));
                }
                Ok(out)
            })
            .map_err(Into::into)
    }
}

impl VectorStore for JsonCosineVectorStore {
    fn index(
        &self,
        documents: &[Document],
        embedding_type: EmbeddingType,
        embedder: &dyn Embedder,
        batcher: &Batcher,
        failure_budget: Option<BatchFailureBudget>,
    ) -> Result<()> {
        let budget = failure_budget.unwrap_or_default();
        let already_embedded = self.has_embeddings(
            &documents.iter().map(|d| d.snippet_id.clone()).collect::<Vec<_>>(),
            embedding_type,
        )?;
        let pending: Vec<&Document> = documents
            .iter()
            .filter(|d| !d.is_blank() && !already_embedded.contains(&d.snippet_id))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let now = now_micros();
        let batches = batcher.batches(&pending.iter().map(|d| (*d).clone()).collect::<Vec<_>>());
        let total = batches.len();
        let mut failed = 0usize;
        let mut last_error = None;

        for batch in batches {
            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
            let outcome = embedder.embed(&texts).and_then(|vectors| {
                if vectors.len() != texts.len() {
                    return Err(Error::Internal(format!(
                        "embedder returned {} vectors for {} inputs",
                        vectors.len(),
                        texts.len()
                    )));
                }
                let embeddings: Vec<Embedding> = batch
                    .iter()
                    .zip(vectors)
                    .map(|(doc, vector)| Embedding {
                        snippet_id: doc.snippet_id.clone(),
                        embedding_type,
                        vector,
                    })
                    .collect();
                self.upsert(&embeddings, now)
            });

            if let Err(e) = outcome {
                failed += 1;
                last_error = Some(e);
                if budget.exceeded(failed, total) {
                    return Err(Error::FailureBudgetExceeded { failed, total, budget_pct: budget.pct });
                }
            }
        }

        if failed > 0 && failed == total {
            return Err(last_error.unwrap_or(Error::Internal("all embedding batches failed".to_owned())));
        }
        Ok(())
    }

    fn search(
        &self,
        query_vector: &[f32],
        embedding_type: EmbeddingType,
        top_k: i64,
        _filters: &SearchFilters,
        allowlist: Option<&[String]>,
    ) -> Result<RankedList> {
        if query_vector.is_empty() {
            return Ok(Vec::new());
        }
        let top_k = if top_k <= 0 { DEFAULT_TOP_K } else { top_k };
        let allowed: Option<HashSet<&str>> =
            allowlist.map(|ids| ids.iter().map(String::as_str).collect());

        let mut scored: Vec<RankedItem> = self
            .load_all(embedding_type)?
            .into_iter()
            .filter(|(id, _)| allowed.as_ref().is_none_or(|a| a.contains(id.as_str())))
            .map(|(snippet_id, vector)| RankedItem {
                score: cosine_similarity(query_vector, &vector),
                snippet_id,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.snippet_id.cmp(&b.snippet_id))
        });
        #[allow(clippy::cast_sign_loss)]
        scored.truncate(top_k as usize);
        Ok(scored)
    }

    fn has_embedding(&self, snippet_id: &str, embedding_type: EmbeddingType) -> Result<bool> {
        self.pool
            .with_conn(|conn| {
                let rows = conn
                    .query_sync(
                        "SELECT 1 AS present FROM vector_embeddings WHERE snippet_id = ? AND embedding_type = ?",
                        &[
                            Value::Text(snippet_id.to_owned()),
                            Value::Text(embedding_type.as_str().to_owned()),
                        ],
                    )
                    .map_err(|e| kodit_db::DbError::Sql(e.to_string()))?;
                Ok(!rows.is_empty())
            })
            .map_err(Into::into)
    }

    fn has_embeddings(
        &self,
        snippet_ids: &[String],
        embedding_type: EmbeddingType,
    ) -> Result<HashSet<String>> {
        if snippet_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let existing: HashSet<String> = self
            .load_all(embedding_type)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        Ok(snippet_ids.iter().filter(|id| existing.contains(*id)).cloned().collect())
    }

    fn delete(&self, snippet_ids: &[String]) -> Result<()> {
        if snippet_ids.is_empty() {
            return Ok(());
        }
        self.pool
            .with_conn(|conn| {
                for id in snippet_ids {
                    conn.execute_sync(
                        "DELETE FROM vector_embeddings WHERE snippet_id = ?",
                        &[Value::Text(id.clone())],
                    )
                    .map_err(|e| kodit_db::DbError::Sql(e.to_string()))?;
                }
                Ok(())
            })
            .map_err(Into::into)
    }
}

fn now_micros() -> i64 {
    #[allow(clippy::cast_possible_wrap)]
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}
