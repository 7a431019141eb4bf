//! One [`Handler`] per [`Operation`] (§4.E "Handler registry").
//!
//! Payload convention: repository-scoped operations read `repository_id`
//! (int), `repo_url` (string, clone only), and `repo_path` (string, local
//! clone directory); commit-scoped operations additionally read
//! `commit_sha` (string). Handlers trust these fields are present — the
//! workflow that enqueued the task is responsible for populating them
//! (§3 "Ownership").
//!
//! Real side effects are implemented for the clone/sync/scan/rescan and
//! indexing steps. The remaining extraction/enrichment/doc-generation
//! operations are out of scope for this implementation (§1 non-goals:
//! "LLM-driven enrichment text generation" and "language-specific snippet
//! extraction" are external collaborators, not core responsibilities) —
//! their handlers report progress and complete without producing content,
//! so a deployment that registers every operation still passes startup
//! validation and drains its queue instead of stalling on an unimplemented
//! step.

use crate::collaborators::GitAdapter;
use crate::snippet::{Snippet, SnippetStore};
use kodit_core::document::{Document, EmbeddingType};
use kodit_core::error::{Error, Result};
use kodit_core::task::Payload;
use kodit_queue::{Handler, HandlerContext};
use kodit_search_core::{BatchFailureBudget, Batcher, Bm25Store, Embedder, VectorStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

fn payload_str(payload: &Payload, key: &str) -> Result<String> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| Error::InvalidInput(format!("payload missing required field {key:?}")))
}

fn payload_i64(payload: &Payload, key: &str) -> Result<i64> {
    payload
        .get(key)
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| Error::InvalidInput(format!("payload missing required field {key:?}")))
}

fn now_micros() -> i64 {
    #[allow(clippy::cast_possible_wrap)]
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

/// `repo.clone` — clone a repository to its local working directory.
pub struct RepoCloneHandler {
    git: Arc<dyn GitAdapter>,
}

impl RepoCloneHandler {
    #[must_use]
    pub fn new(git: Arc<dyn GitAdapter>) -> Self {
        Self { git }
    }
}

impl Handler for RepoCloneHandler {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<()> {
        let url = payload_str(ctx.payload, "repo_url")?;
        let path = PathBuf::from(payload_str(ctx.payload, "repo_path")?);
        ctx.tracker.set_current(0, "cloning repository")?;
        self.git.clone_repo(&url, &path)?;
        Ok(())
    }
}

/// `repo.sync` — fast-forward an already-cloned repository.
pub struct RepoSyncHandler {
    git: Arc<dyn GitAdapter>,
}

impl RepoSyncHandler {
    #[must_use]
    pub fn new(git: Arc<dyn GitAdapter>) -> Self {
        Self { git }
    }
}

impl Handler for RepoSyncHandler {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<()> {
        let path = PathBuf::from(payload_str(ctx.payload, "repo_path")?);
        ctx.tracker.set_current(0, "syncing repository")?;
        self.git.update(&path)?;
        Ok(())
    }
}

/// Shared logic for `commit.scan` and `commit.rescan`: read every file at
/// `commit_sha` through the git adapter and store it as one snippet per
/// file. `commit.rescan` additionally clears prior snippets first.
fn scan_commit_into_snippets(
    ctx: &HandlerContext<'_>,
    git: &dyn GitAdapter,
    snippets: &dyn SnippetStore,
) -> Result<()> {
    let repo_path = PathBuf::from(payload_str(ctx.payload, "repo_path")?);
    let commit_sha = payload_str(ctx.payload, "commit_sha")?;
    let repository_id = ctx.payload.get("repository_id").and_then(serde_json::Value::as_i64);

    let files = git.scan_commit(&repo_path, &commit_sha)?;
    ctx.tracker.set_total(files.len() as u64)?;

    let now = now_micros();
    let scanned: Vec<Snippet> = files
        .into_iter()
        .enumerate()
        .map(|(i, file)| {
            ctx.tracker.set_current(i as u64, &format!("scanned {}", file.path)).ok();
            Snippet {
                snippet_id: format!("{commit_sha}:{}", file.path),
                source_repo_id: repository_id,
                commit_sha: Some(commit_sha.clone()),
                file_path: Some(file.path),
                language: None,
                author: None,
                created_at: now,
                content: file.content,
            }
        })
        .collect();

    snippets.upsert_many(&scanned)?;
    Ok(())
}

/// `commit.scan` — initial extraction of a commit's files into the snippet
/// store.
pub struct CommitScanHandler {
    git: Arc<dyn GitAdapter>,
    snippets: Arc<dyn SnippetStore>,
}

impl CommitScanHandler {
    #[must_use]
    pub fn new(git: Arc<dyn GitAdapter>, snippets: Arc<dyn SnippetStore>) -> Self {
        Self { git, snippets }
    }
}

impl Handler for CommitScanHandler {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<()> {
        scan_commit_into_snippets(ctx, self.git.as_ref(), self.snippets.as_ref())
    }
}

/// `commit.rescan` — clears previously indexed data for the commit, then
/// re-runs the scan.
pub struct CommitRescanHandler {
    git: Arc<dyn GitAdapter>,
    snippets: Arc<dyn SnippetStore>,
    bm25: Arc<dyn Bm25Store>,
    vectors: Arc<dyn VectorStore>,
}

impl CommitRescanHandler {
    #[must_use]
    pub fn new(
        git: Arc<dyn GitAdapter>,
        snippets: Arc<dyn SnippetStore>,
        bm25: Arc<dyn Bm25Store>,
        vectors: Arc<dyn VectorStore>,
    ) -> Self {
        Self { git, snippets, bm25, vectors }
    }
}

impl Handler for CommitRescanHandler {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<()> {
        let commit_sha = payload_str(ctx.payload, "commit_sha")?;
        let prior = self.snippets.snippets_for_commit(&commit_sha)?;
        let prior_ids: Vec<String> = prior.iter().map(|s| s.snippet_id.clone()).collect();
        if !prior_ids.is_empty() {
            self.bm25.delete(&prior_ids)?;
            self.vectors.delete(&prior_ids)?;
        }
        self.snippets.delete_for_commit(&commit_sha)?;
        scan_commit_into_snippets(ctx, self.git.as_ref(), self.snippets.as_ref())
    }
}

/// `commit.create_bm25_index` — index every snippet from this commit into
/// the lexical backend.
pub struct CommitCreateBm25IndexHandler {
    snippets: Arc<dyn SnippetStore>,
    bm25: Arc<dyn Bm25Store>,
    failure_budget_pct: u8,
}

impl CommitCreateBm25IndexHandler {
    #[must_use]
    pub fn new(snippets: Arc<dyn SnippetStore>, bm25: Arc<dyn Bm25Store>, failure_budget_pct: u8) -> Self {
        Self { snippets, bm25, failure_budget_pct }
    }
}

impl Handler for CommitCreateBm25IndexHandler {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<()> {
        let commit_sha = payload_str(ctx.payload, "commit_sha")?;
        let snippets = self.snippets.snippets_for_commit(&commit_sha)?;
        ctx.tracker.set_total(snippets.len() as u64)?;
        let documents: Vec<Document> = snippets.iter().map(Snippet::as_document).collect();
        self.bm25.index(&documents, Some(BatchFailureBudget { pct: self.failure_budget_pct }))?;
        ctx.tracker.set_current(documents.len() as u64, "bm25 index built")?;
        Ok(())
    }
}

/// Shared logic for `commit.create_code_embeddings` and
/// `commit.create_summary_embeddings`: embed every snippet from the commit
/// under one [`EmbeddingType`].
struct VectorIndexHandler {
    snippets: Arc<dyn SnippetStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    embedding_type: EmbeddingType,
    failure_budget_pct: u8,
}

impl Handler for VectorIndexHandler {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<()> {
        let commit_sha = payload_str(ctx.payload, "commit_sha")?;
        let snippets = self.snippets.snippets_for_commit(&commit_sha)?;
        ctx.tracker.set_total(snippets.len() as u64)?;
        let documents: Vec<Document> = snippets.iter().map(Snippet::as_document).collect();
        let batcher = Batcher::new(self.embedder.capacity())?;
        self.vectors.index(
            &documents,
            self.embedding_type,
            self.embedder.as_ref(),
            &batcher,
            Some(BatchFailureBudget { pct: self.failure_budget_pct }),
        )?;
        ctx.tracker.set_current(documents.len() as u64, &format!("{} embeddings built", self.embedding_type))?;
        Ok(())
    }
}

/// `commit.create_code_embeddings`.
pub struct CommitCreateCodeEmbeddingsHandler(VectorIndexHandler);

impl CommitCreateCodeEmbeddingsHandler {
    #[must_use]
    pub fn new(
        snippets: Arc<dyn SnippetStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        failure_budget_pct: u8,
    ) -> Self {
        Self(VectorIndexHandler { snippets, vectors, embedder, embedding_type: EmbeddingType::Code, failure_budget_pct })
    }
}

impl Handler for CommitCreateCodeEmbeddingsHandler {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<()> {
        self.0.handle(ctx)
    }
}

/// `commit.create_summary_embeddings`.
pub struct CommitCreateSummaryEmbeddingsHandler(VectorIndexHandler);

impl CommitCreateSummaryEmbeddingsHandler {
    #[must_use]
    pub fn new(
        snippets: Arc<dyn SnippetStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        failure_budget_pct: u8,
    ) -> Self {
        Self(VectorIndexHandler { snippets, vectors, embedder, embedding_type: EmbeddingType::Summary, failure_budget_pct })
    }
}

impl Handler for CommitCreateSummaryEmbeddingsHandler {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<()> {
        self.0.handle(ctx)
    }
}

/// A handler for an operation this implementation does not generate
/// content for (examples, enrichments, documentation generation — all
/// external-collaborator or non-goal territory per §1/§6). Reports
/// `skip` through the tracker with a descriptive message rather than
/// silently completing, so the distinction between "ran and did nothing"
/// and "ran and did something" stays visible in tracked status.
pub struct UnimplementedHandler {
    operation_name: &'static str,
}

impl UnimplementedHandler {
    #[must_use]
    pub fn new(operation_name: &'static str) -> Self {
        Self { operation_name }
    }
}

impl Handler for UnimplementedHandler {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<()> {
        info!(operation = self.operation_name, "no content-generating handler registered for this operation; skipping");
        ctx.tracker.skip(&format!("{} is not implemented by this deployment", self.operation_name))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fakes::FakeGitAdapter;
    use crate::collaborators::ScannedFile;
    use crate::snippet::SqliteSnippetStore;
    use kodit_core::fusion::RankedList;
    use kodit_core::filters::SearchFilters;
    use kodit_db::DbPool;
    use kodit_queue::tracker::{NullReporter, TrackerFactory};
    use kodit_queue::CancellationToken;
    use std::collections::{BTreeMap, HashSet};

    fn ctx_payload(pairs: &[(&str, serde_json::Value)]) -> Payload {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
    }

    fn tracker_factory() -> TrackerFactory {
        TrackerFactory::new(Arc::new(NullReporter))
    }

    #[test]
    fn repo_clone_handler_invokes_git_adapter() {
        let git: Arc<dyn GitAdapter> = Arc::new(FakeGitAdapter::default());
        let handler = RepoCloneHandler::new(git);
        let payload = ctx_payload(&[
            ("repo_url", serde_json::json!("https://example.com/repo.git")),
            ("repo_path", serde_json::json!("/tmp/repo")),
        ]);
        let factory = tracker_factory();
        let tracker = factory.for_operation("repo.clone", "kodit.repository", "1", None).unwrap();
        let cancellation = CancellationToken::new();
        let ctx = HandlerContext { payload: &payload, tracker: &tracker, cancellation: &cancellation };
        assert!(handler.handle(&ctx).is_ok());
    }

    #[test]
    fn commit_scan_handler_stores_one_snippet_per_file() {
        let git = Arc::new(FakeGitAdapter::default());
        git.seed("deadbeef", vec![ScannedFile { path: "a.rs".to_owned(), content: "fn a() {}".to_owned() }]);
        let pool = Arc::new(DbPool::open_memory().unwrap());
        let snippets: Arc<dyn SnippetStore> = Arc::new(SqliteSnippetStore::new(pool));
        let handler = CommitScanHandler::new(git, Arc::clone(&snippets));

        let payload = ctx_payload(&[
            ("repo_path", serde_json::json!("/tmp/repo")),
            ("commit_sha", serde_json::json!("deadbeef")),
            ("repository_id", serde_json::json!(1)),
        ]);
        let factory = tracker_factory();
        let tracker = factory.for_operation("commit.scan", "kodit.commit", "deadbeef", None).unwrap();
        let cancellation = CancellationToken::new();
        let ctx = HandlerContext { payload: &payload, tracker: &tracker, cancellation: &cancellation };
        handler.handle(&ctx).unwrap();

        let stored = snippets.snippets_for_commit("deadbeef").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].file_path.as_deref(), Some("a.rs"));
    }

    #[test]
    fn missing_payload_field_is_invalid_input() {
        let git: Arc<dyn GitAdapter> = Arc::new(FakeGitAdapter::default());
        let handler = RepoCloneHandler::new(git);
        let payload: Payload = BTreeMap::new();
        let factory = tracker_factory();
        let tracker = factory.for_operation("repo.clone", "kodit.repository", "1", None).unwrap();
        let cancellation = CancellationToken::new();
        let ctx = HandlerContext { payload: &payload, tracker: &tracker, cancellation: &cancellation };
        let err = handler.handle(&ctx).unwrap_err();
        assert_eq!(err.error_type(), "INVALID_INPUT");
    }

    #[test]
    fn unimplemented_handler_skips_rather_than_errors() {
        let handler = UnimplementedHandler::new("commit.generate_wiki");
        let payload: Payload = BTreeMap::new();
        let factory = tracker_factory();
        let tracker = factory.for_operation("commit.generate_wiki", "kodit.commit", "1", None).unwrap();
        let cancellation = CancellationToken::new();
        let ctx = HandlerContext { payload: &payload, tracker: &tracker, cancellation: &cancellation };
        handler.handle(&ctx).unwrap();
        assert_eq!(tracker.snapshot().state, kodit_core::status::ReportingState::Skipped);
    }

    struct NullBm25;
    impl Bm25Store for NullBm25 {
        fn index(&self, _documents: &[Document], _budget: Option<BatchFailureBudget>) -> Result<()> {
            Ok(())
        }
        fn search(&self, _query: &str, _top_k: i64, _filters: &SearchFilters, _allowlist: Option<&[String]>) -> Result<RankedList> {
            Ok(Vec::new())
        }
        fn delete(&self, _snippet_ids: &[String]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn bm25_index_handler_indexes_every_snippet_for_the_commit() {
        let pool = Arc::new(DbPool::open_memory().unwrap());
        let snippets: Arc<dyn SnippetStore> = Arc::new(SqliteSnippetStore::new(pool));
        snippets
            .upsert_many(&[Snippet {
                snippet_id: "c1:a.rs".to_owned(),
                source_repo_id: Some(1),
                commit_sha: Some("c1".to_owned()),
                file_path: Some("a.rs".to_owned()),
                language: None,
                author: None,
                created_at: 0,
                content: "fn a() {}".to_owned(),
            }])
            .unwrap();
        let bm25: Arc<dyn Bm25Store> = Arc::new(NullBm25);
        let handler = CommitCreateBm25IndexHandler::new(Arc::clone(&snippets), bm25, 5);

        let payload = ctx_payload(&[("commit_sha", serde_json::json!("c1"))]);
        let factory = tracker_factory();
        let tracker = factory.for_operation("commit.create_bm25_index", "kodit.commit", "c1", None).unwrap();
        let cancellation = CancellationToken::new();
        let ctx = HandlerContext { payload: &payload, tracker: &tracker, cancellation: &cancellation };
        assert!(handler.handle(&ctx).is_ok());
        assert_eq!(tracker.snapshot().total, 1);
    }

    #[allow(dead_code)]
    fn _use_hashset(_s: HashSet<String>) {}
}
