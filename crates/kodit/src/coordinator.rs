//! The hybrid search coordinator (§4.D): fans a query out across BM25 and
//! vector backends, fuses the ranked lists, and hydrates the fused ids back
//! into full snippet payloads. Lives in this crate rather than
//! `kodit-search-core` because it needs the snippet store collaborator and
//! `Config` that crate doesn't own.

use crate::snippet::{Snippet, SnippetStore};
use kodit_core::document::{Document, EmbeddingType};
use kodit_core::error::{Error, Result};
use kodit_core::filters::SearchFilters;
use kodit_core::fusion::{FusedHit, RankedList};
use kodit_search_core::{Batcher, Bm25Store, Embedder, VectorStore};
use std::sync::Arc;
use tracing::warn;

/// Oversampling factor applied to `top_k` when fanning a request out to
/// each backend, so fusion has enough candidates per list to produce a
/// meaningful top-`top_k` after merging. A small multiple, per §4.D.
const OVERSAMPLE_FACTOR: i64 = 3;

/// A query against the hybrid search coordinator.
#[derive(Debug, Clone, Default)]
pub struct MultiRequest {
    pub top_k: i64,
    pub text_query: String,
    pub code_query: String,
    pub keywords: Vec<String>,
    pub filters: SearchFilters,
}

/// One hydrated result: a snippet plus its fused score and the per-list
/// original scores that contributed to it.
#[derive(Debug, Clone)]
pub struct MultiResult {
    pub snippet: Snippet,
    pub fused_score: f64,
    pub original_scores: Vec<f64>,
}

/// Fans a [`MultiRequest`] out to up to three sub-queries (BM25, code
/// vector, summary vector), fuses the results with reciprocal rank fusion,
/// and hydrates the fused snippet ids from the snippet store.
pub struct HybridSearch {
    bm25: Arc<dyn Bm25Store>,
    vectors: Arc<dyn VectorStore>,
    code_embedder: Arc<dyn Embedder>,
    summary_embedder: Arc<dyn Embedder>,
    snippets: Arc<dyn SnippetStore>,
    rrf_k: f64,
}

impl HybridSearch {
    #[must_use]
    pub fn new(
        bm25: Arc<dyn Bm25Store>,
        vectors: Arc<dyn VectorStore>,
        code_embedder: Arc<dyn Embedder>,
        summary_embedder: Arc<dyn Embedder>,
        snippets: Arc<dyn SnippetStore>,
        rrf_k: f64,
    ) -> Self {
        Self { bm25, vectors, code_embedder, summary_embedder, snippets, rrf_k }
    }

    /// Execute the §4.D plan: synthesize a combined query from keywords
    /// when both explicit queries are empty, fan out to every applicable
    /// backend in parallel, tolerate partial sub-query failure, fuse, and
    /// hydrate.
    pub fn search(&self, request: &MultiRequest) -> Result<Vec<MultiResult>> {
        let top_k = if request.top_k > 0 { request.top_k } else { 10 };
        let oversampled_top_k = top_k.saturating_mul(OVERSAMPLE_FACTOR);

        let (mut text_query, mut code_query) = (request.text_query.clone(), request.code_query.clone());
        if text_query.trim().is_empty() && code_query.trim().is_empty() && !request.keywords.is_empty() {
            let synthesized = request.keywords.join(" ");
            text_query = synthesized.clone();
            code_query = synthesized;
        }
        let combined_query = if !text_query.is_empty() { text_query.clone() } else { code_query.clone() };

        let allowlist = self.snippets.resolve_allowlist(&request.filters)?;
        let allowlist_slice = allowlist.as_deref();

        let (bm25_result, (code_result, summary_result)) = rayon::join(
            || self.search_bm25(&combined_query, oversampled_top_k, &request.filters, allowlist_slice),
            || {
                rayon::join(
                    || self.search_vector(&code_query, EmbeddingType::Code, oversampled_top_k, &request.filters, allowlist_slice),
                    || self.search_vector(&text_query, EmbeddingType::Summary, oversampled_top_k, &request.filters, allowlist_slice),
                )
            },
        );

        let mut lists: Vec<RankedList> = Vec::with_capacity(3);
        let mut all_failed = true;
        for (label, outcome) in [("bm25", bm25_result), ("vector:code", code_result), ("vector:summary", summary_result)] {
            match outcome {
                Ok(list) => {
                    all_failed = false;
                    if !list.is_empty() {
                        lists.push(list);
                    }
                }
                Err(e) => warn!(backend = label, error = %e, "hybrid search sub-query failed; continuing with remaining backends"),
            }
        }
        if all_failed {
            return Err(Error::Internal("every hybrid search sub-query failed".to_owned()));
        }

        let fusion = kodit_search_core::fuse_top_k(&lists, self.rrf_k, top_k);
        self.hydrate(fusion.hits)
    }

    fn search_bm25(&self, query: &str, top_k: i64, filters: &SearchFilters, allowlist: Option<&[String]>) -> Result<RankedList> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.bm25.search(query, top_k, filters, allowlist)
    }

    fn search_vector(
        &self,
        query: &str,
        embedding_type: EmbeddingType,
        top_k: i64,
        filters: &SearchFilters,
        allowlist: Option<&[String]>,
    ) -> Result<RankedList> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let embedder = match embedding_type {
            EmbeddingType::Code => &self.code_embedder,
            EmbeddingType::Summary => &self.summary_embedder,
        };
        let batcher = Batcher::new(embedder.capacity())?;
        let doc = Document { snippet_id: "query".to_owned(), text: query.to_owned() };
        let mut batches = batcher.batches(&[doc]);
        let Some(batch) = batches.pop() else {
            return Ok(Vec::new());
        };
        let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
        let mut vectors = embedder.embed(&texts)?;
        let Some(query_vector) = vectors.pop() else {
            return Ok(Vec::new());
        };
        self.vectors.search(&query_vector, embedding_type, top_k, filters, allowlist)
    }

    fn hydrate(&self, hits: Vec<FusedHit>) -> Result<Vec<MultiResult>> {
        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.snippets.get(&hit.snippet_id)? {
                Some(snippet) => {
                    results.push(MultiResult { snippet, fused_score: hit.fused_score, original_scores: hit.original_scores });
                }
                None => warn!(snippet_id = %hit.snippet_id, "fused result references a snippet no longer in the store"),
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snippet::SqliteSnippetStore;
    use kodit_core::fusion::RankedItem;
    use kodit_db::DbPool;
    use std::collections::HashSet;

    struct StubBm25 {
        hits: Vec<RankedItem>,
    }
    impl Bm25Store for StubBm25 {
        fn index(&self, _documents: &[Document], _budget: Option<kodit_search_core::BatchFailureBudget>) -> Result<()> {
            Ok(())
        }
        fn search(&self, query: &str, _top_k: i64, _filters: &SearchFilters, _allowlist: Option<&[String]>) -> Result<RankedList> {
            if query.trim().is_empty() { Ok(Vec::new()) } else { Ok(self.hits.clone()) }
        }
        fn delete(&self, _snippet_ids: &[String]) -> Result<()> {
            Ok(())
        }
    }

    struct FailingBm25;
    impl Bm25Store for FailingBm25 {
        fn index(&self, _documents: &[Document], _budget: Option<kodit_search_core::BatchFailureBudget>) -> Result<()> {
            Ok(())
        }
        fn search(&self, _query: &str, _top_k: i64, _filters: &SearchFilters, _allowlist: Option<&[String]>) -> Result<RankedList> {
            Err(Error::Internal("bm25 backend unavailable".to_owned()))
        }
        fn delete(&self, _snippet_ids: &[String]) -> Result<()> {
            Ok(())
        }
    }

    struct EmptyVectorStore;
    impl VectorStore for EmptyVectorStore {
        fn index(
            &self,
            _documents: &[Document],
            _embedding_type: EmbeddingType,
            _embedder: &dyn Embedder,
            _batcher: &Batcher,
            _budget: Option<kodit_search_core::BatchFailureBudget>,
        ) -> Result<()> {
            Ok(())
        }
        fn search(
            &self,
            _query_vector: &[f32],
            _embedding_type: EmbeddingType,
            _top_k: i64,
            _filters: &SearchFilters,
            _allowlist: Option<&[String]>,
        ) -> Result<RankedList> {
            Ok(Vec::new())
        }
        fn has_embedding(&self, _snippet_id: &str, _embedding_type: EmbeddingType) -> Result<bool> {
            Ok(false)
        }
        fn has_embeddings(&self, _snippet_ids: &[String], _embedding_type: EmbeddingType) -> Result<HashSet<String>> {
            Ok(HashSet::new())
        }
        fn delete(&self, _snippet_ids: &[String]) -> Result<()> {
            Ok(())
        }
    }

    struct StubEmbedder;
    impl Embedder for StubEmbedder {
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0_f32; 4]).collect())
        }
        fn capacity(&self) -> usize {
            16_000
        }
        fn dimension(&self) -> usize {
            4
        }
    }

    fn seeded_store() -> Arc<SqliteSnippetStore> {
        let pool = Arc::new(DbPool::open_memory().unwrap());
        let store = Arc::new(SqliteSnippetStore::new(pool));
        store
            .upsert_many(&[Snippet {
                snippet_id: "a".to_owned(),
                source_repo_id: Some(1),
                commit_sha: Some("c1".to_owned()),
                file_path: Some("src/lib.rs".to_owned()),
                language: Some("rust".to_owned()),
                author: Some("alice".to_owned()),
                created_at: 1,
                content: "fn a() {}".to_owned(),
            }])
            .unwrap();
        store
    }

    #[test]
    fn hybrid_search_hydrates_bm25_only_results() {
        let store = seeded_store();
        let coordinator = HybridSearch::new(
            Arc::new(StubBm25 { hits: vec![RankedItem { snippet_id: "a".to_owned(), score: 5.0 }] }),
            Arc::new(EmptyVectorStore),
            Arc::new(StubEmbedder),
            Arc::new(StubEmbedder),
            store,
            60.0,
        );
        let results = coordinator
            .search(&MultiRequest { top_k: 10, text_query: "hello".to_owned(), ..Default::default() })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet.snippet_id, "a");
    }

    #[test]
    fn one_failing_backend_does_not_fail_the_whole_search() {
        let store = seeded_store();
        let coordinator = HybridSearch::new(
            Arc::new(FailingBm25),
            Arc::new(EmptyVectorStore),
            Arc::new(StubEmbedder),
            Arc::new(StubEmbedder),
            store,
            60.0,
        );
        let results = coordinator
            .search(&MultiRequest { top_k: 10, code_query: "fn a".to_owned(), ..Default::default() })
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn keywords_synthesize_a_combined_query_when_both_explicit_queries_are_empty() {
        let store = seeded_store();
        let coordinator = HybridSearch::new(
            Arc::new(StubBm25 { hits: vec![RankedItem { snippet_id: "a".to_owned(), score: 1.0 }] }),
            Arc::new(EmptyVectorStore),
            Arc::new(StubEmbedder),
            Arc::new(StubEmbedder),
            store,
            60.0,
        );
        let results = coordinator
            .search(&MultiRequest { top_k: 5, keywords: vec!["hello".to_owned(), "world".to_owned()], ..Default::default() })
            .unwrap();
        assert_eq!(results.len(), 1);
    }
}
