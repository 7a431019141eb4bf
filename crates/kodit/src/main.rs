//! `kodit` — code-knowledge indexing and hybrid search CLI.
//!
//! Four subcommands over one process-wide set of collaborators
//! (database pool, queue, handler registry, worker pool, search
//! backends): `serve` drains the queue in the background, `enqueue`
//! schedules a prescribed workflow, `search` runs a hybrid query, and
//! `config` prints the effective configuration. Every subcommand builds
//! the same collaborators from the same [`Config`]; only `serve` keeps
//! the worker pool running afterward.

mod collaborators;
mod coordinator;
mod handlers;
mod snippet;

use clap::{Parser, Subcommand};
use collaborators::{GitAdapter, ShellGitAdapter};
use coordinator::{HybridSearch, MultiRequest};
use handlers::{
    CommitCreateBm25IndexHandler, CommitCreateCodeEmbeddingsHandler,
    CommitCreateSummaryEmbeddingsHandler, CommitRescanHandler, CommitScanHandler,
    RepoCloneHandler, RepoSyncHandler, UnimplementedHandler,
};
use kodit_core::config::Config;
use kodit_core::error::{Error, Result};
use kodit_core::filters::SearchFilters;
use kodit_core::operation::Operation;
use kodit_core::task::Task;
use kodit_db::DbPool;
use kodit_queue::tracker::{DbReporter, TrackerFactory};
use kodit_queue::{HandlerRegistry, Queue, SqliteQueue, WorkerPool, WorkerPoolConfig};
use kodit_search_core::{Bm25Store, FastEmbedEmbedder, JsonCosineVectorStore, SqliteFtsBm25Store, TantivyBm25Store};
use snippet::{SqliteSnippetStore, SnippetStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "kodit", version, about = "Code-knowledge indexing and hybrid search")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the worker pool and drain the queue until interrupted.
    Serve,
    /// Enqueue a prescribed workflow for a repository or commit.
    Enqueue {
        /// One of: create-new-repository, sync-repository,
        /// scan-and-index-commit, index-commit, rescan-commit.
        #[arg(long)]
        workflow: String,
        /// Numeric repository id this workflow applies to.
        #[arg(long)]
        repository_id: i64,
        /// Repository URL (required for `create-new-repository`).
        #[arg(long)]
        repo_url: Option<String>,
        /// Local working-directory path for the repository clone.
        #[arg(long)]
        repo_path: String,
        /// Commit SHA (required for every commit-scoped workflow).
        #[arg(long)]
        commit_sha: Option<String>,
    },
    /// Run a hybrid BM25 + vector search and print the results.
    Search {
        /// Free-text query, matched against BM25 and the summary embedding.
        #[arg(long, default_value = "")]
        text: String,
        /// Code-oriented query, matched against the code embedding.
        #[arg(long, default_value = "")]
        code: String,
        #[arg(long, default_value_t = 10)]
        top_k: i64,
        #[arg(long)]
        language: Option<String>,
    },
    /// Print the effective configuration (environment overlaid on defaults).
    Config,
}

/// Everything a subcommand needs, built once from [`Config`] and torn down
/// in reverse order of construction on drop.
struct Collaborators {
    config: Config,
    pool: Arc<DbPool>,
    queue: Arc<SqliteQueue>,
    registry: Arc<HandlerRegistry>,
    tracker_factory: Arc<TrackerFactory>,
    bm25: Arc<dyn Bm25Store>,
    vectors: Arc<JsonCosineVectorStore>,
    code_embedder: Arc<FastEmbedEmbedder>,
    summary_embedder: Arc<FastEmbedEmbedder>,
    snippets: Arc<SqliteSnippetStore>,
    git: Arc<dyn GitAdapter>,
}

impl Collaborators {
    fn build(config: Config) -> Result<Self> {
        let pool = Arc::new(DbPool::open(&kodit_db::DbPoolConfig {
            database_url: config.database_url.clone(),
            ..kodit_db::DbPoolConfig::default()
        })?);
        let queue = Arc::new(SqliteQueue::new(Arc::clone(&pool)));
        let snippets = Arc::new(SqliteSnippetStore::new(Arc::clone(&pool)));
        let bm25: Arc<dyn Bm25Store> = match config.bm25_backend.as_str() {
            "sqlite_fts" => Arc::new(SqliteFtsBm25Store::new(Arc::clone(&pool))),
            _ => Arc::new(TantivyBm25Store::create_in_ram()?),
        };
        let vectors = Arc::new(JsonCosineVectorStore::new(Arc::clone(&pool)));
        let code_embedder = Arc::new(FastEmbedEmbedder::load(&config.code_embedding_model)?);
        let summary_embedder = Arc::new(FastEmbedEmbedder::load(&config.summary_embedding_model)?);
        let git: Arc<dyn GitAdapter> = Arc::new(ShellGitAdapter::new());
        let reporter = Arc::new(DbReporter::new(Arc::clone(&pool)));
        let tracker_factory = Arc::new(TrackerFactory::new(reporter));

        let mut registry = HandlerRegistry::new();
        register_handlers(&mut registry, &config, &snippets, &bm25, &vectors, &code_embedder, &summary_embedder, &git);
        registry.validate(&kodit_queue::all_operations())?;

        Ok(Self {
            config,
            pool,
            queue,
            registry: Arc::new(registry),
            tracker_factory,
            bm25,
            vectors,
            code_embedder,
            summary_embedder,
            snippets,
            git,
        })
    }

    fn hybrid_search(&self) -> HybridSearch {
        HybridSearch::new(
            Arc::clone(&self.bm25),
            Arc::clone(&self.vectors) as Arc<dyn kodit_search_core::VectorStore>,
            Arc::clone(&self.code_embedder) as Arc<dyn kodit_search_core::Embedder>,
            Arc::clone(&self.summary_embedder) as Arc<dyn kodit_search_core::Embedder>,
            Arc::clone(&self.snippets) as Arc<dyn SnippetStore>,
            self.config.effective_rrf_k(),
        )
    }
}

/// Wire every `Operation` the prescribed workflows can produce to a real
/// handler, or to [`UnimplementedHandler`] for the non-goal content
/// generation steps (§1/§6). Called once at startup; `validate` below then
/// fails fast if any `Operation` is missing.
#[allow(clippy::too_many_arguments)]
fn register_handlers(
    registry: &mut HandlerRegistry,
    config: &Config,
    snippets: &Arc<SqliteSnippetStore>,
    bm25: &Arc<dyn Bm25Store>,
    vectors: &Arc<JsonCosineVectorStore>,
    code_embedder: &Arc<FastEmbedEmbedder>,
    summary_embedder: &Arc<FastEmbedEmbedder>,
    git: &Arc<dyn GitAdapter>,
) {
    let budget_pct = config.batch_failure_budget_pct;
    let snippets_dyn: Arc<dyn SnippetStore> = Arc::clone(snippets) as Arc<dyn SnippetStore>;
    let bm25_dyn: Arc<dyn kodit_search_core::Bm25Store> = Arc::clone(bm25);
    let vectors_dyn: Arc<dyn kodit_search_core::VectorStore> = Arc::clone(vectors) as Arc<dyn kodit_search_core::VectorStore>;

    registry
        .register(Operation::RepoClone, Arc::new(RepoCloneHandler::new(Arc::clone(git))))
        .register(Operation::RepoSync, Arc::new(RepoSyncHandler::new(Arc::clone(git))))
        .register(Operation::CommitScan, Arc::new(CommitScanHandler::new(Arc::clone(git), Arc::clone(&snippets_dyn))))
        .register(
            Operation::CommitRescan,
            Arc::new(CommitRescanHandler::new(Arc::clone(git), Arc::clone(&snippets_dyn), Arc::clone(&bm25_dyn), Arc::clone(&vectors_dyn))),
        )
        .register(
            Operation::CommitCreateBm25Index,
            Arc::new(CommitCreateBm25IndexHandler::new(Arc::clone(&snippets_dyn), Arc::clone(&bm25_dyn), budget_pct)),
        )
        .register(
            Operation::CommitCreateCodeEmbeddings,
            Arc::new(CommitCreateCodeEmbeddingsHandler::new(
                Arc::clone(&snippets_dyn),
                Arc::clone(&vectors_dyn),
                Arc::clone(code_embedder) as Arc<dyn kodit_search_core::Embedder>,
                budget_pct,
            )),
        )
        .register(
            Operation::CommitCreateSummaryEmbeddings,
            Arc::new(CommitCreateSummaryEmbeddingsHandler::new(
                Arc::clone(&snippets_dyn),
                Arc::clone(&vectors_dyn),
                Arc::clone(summary_embedder) as Arc<dyn kodit_search_core::Embedder>,
                budget_pct,
            )),
        );

    for op in Operation::ALL {
        if registry.get(*op).is_none() {
            registry.register(*op, Arc::new(UnimplementedHandler::new(op.as_str())));
        }
    }
}

fn workflow_for(name: &str) -> Result<kodit_queue::Workflow> {
    match name {
        "create-new-repository" => Ok(kodit_queue::Workflow::CreateNewRepository),
        "sync-repository" => Ok(kodit_queue::Workflow::SyncRepository),
        "scan-and-index-commit" => Ok(kodit_queue::Workflow::ScanAndIndexCommit),
        "index-commit" => Ok(kodit_queue::Workflow::IndexCommit),
        "rescan-commit" => Ok(kodit_queue::Workflow::RescanCommit),
        other => Err(Error::InvalidInput(format!("unknown workflow {other:?}"))),
    }
}

/// Runs until the process is killed: the worker pool's threads are daemon
/// threads from this function's point of view, so there is nothing to join
/// on a clean path. `WorkerPool::shutdown` exists for tests and for any
/// future supervisor that wants to stop serving without exiting.
fn run_serve(collaborators: &Collaborators) -> Result<()> {
    let pool_config =
        WorkerPoolConfig { worker_count: collaborators.config.worker_count, poll_interval: collaborators.config.worker_poll_interval };
    let _worker_pool = WorkerPool::spawn(
        Arc::clone(&collaborators.queue) as Arc<dyn Queue>,
        Arc::clone(&collaborators.registry),
        Arc::clone(&collaborators.tracker_factory),
        pool_config,
    );
    info!("kodit serving; terminate the process to stop");
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}

fn run_enqueue(
    collaborators: &Collaborators,
    workflow: &str,
    repository_id: i64,
    repo_url: Option<String>,
    repo_path: String,
    commit_sha: Option<String>,
) -> Result<()> {
    let workflow = workflow_for(workflow)?;
    let profile = kodit_queue::Profile::new(collaborators.config.profile_examples, collaborators.config.profile_enrichments);
    let operations = workflow.operations(profile);

    let mut payload = kodit_core::task::Payload::new();
    payload.insert("repository_id".to_owned(), serde_json::json!(repository_id));
    payload.insert("repo_path".to_owned(), serde_json::json!(repo_path));
    if let Some(url) = repo_url {
        payload.insert("repo_url".to_owned(), serde_json::json!(url));
    }
    if let Some(sha) = commit_sha {
        payload.insert("commit_sha".to_owned(), serde_json::json!(sha));
    }

    let tasks: Vec<Task> = collaborators.queue.enqueue_operations(&operations, kodit_core::priority::Priority::Normal.value(), payload)?;
    for task in &tasks {
        println!("enqueued {} (id={:?}, priority={})", task.operation, task.id, task.priority);
    }
    Ok(())
}

fn run_search(collaborators: &Collaborators, text: String, code: String, top_k: i64, language: Option<String>) -> Result<()> {
    let coordinator = collaborators.hybrid_search();
    let filters = SearchFilters { language, ..SearchFilters::default() };
    let results = coordinator.search(&MultiRequest { top_k, text_query: text, code_query: code, keywords: Vec::new(), filters })?;
    for result in results {
        println!(
            "{:>8.4}  {}  {}",
            result.fused_score,
            result.snippet.snippet_id,
            result.snippet.file_path.as_deref().unwrap_or("<unknown>")
        );
    }
    Ok(())
}

fn main() {
    kodit_core::logging::init();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("kodit: invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    let outcome = match cli.command {
        Commands::Config => {
            println!("{config:#?}");
            Ok(())
        }
        Commands::Serve => Collaborators::build(config).and_then(|c| run_serve(&c)),
        Commands::Enqueue { workflow, repository_id, repo_url, repo_path, commit_sha } => {
            Collaborators::build(config).and_then(|c| run_enqueue(&c, &workflow, repository_id, repo_url, repo_path, commit_sha))
        }
        Commands::Search { text, code, top_k, language } => {
            Collaborators::build(config).and_then(|c| run_search(&c, text, code, top_k, language))
        }
    };

    if let Err(e) = outcome {
        eprintln!("kodit: {e}");
        std::process::exit(1);
    }
}
