//! Environment-variable-driven configuration.
//!
//! Every setting has a documented default; the only way to get an `Error`
//! out of `Config::from_env` is an explicitly-set value that fails to
//! parse or fails validation (e.g. `KODIT_MAX_CHARS=0`). Nothing here
//! reaches for a config file format — environment variables only, matching
//! this lineage's existing configuration surface.

use crate::error::{Error, Result};
use std::env;
use std::time::Duration;

/// Top-level configuration for the `kodit` process: database location,
/// worker pool sizing, batcher/fusion tuning, and which search backends to
/// construct.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Database ─────────────────────────────────────────────────────
    /// `sqlmodel`/`sqlmodel-sqlite` connection string, e.g.
    /// `sqlite://./kodit.db` or `sqlite://:memory:`.
    pub database_url: String,

    // ── Worker pool ──────────────────────────────────────────────────
    /// Number of worker threads in the pool. Minimum 1 (§4.E).
    pub worker_count: usize,
    /// How often an idle worker re-polls `Dequeue` when no wake-up
    /// notification is available. Default 1s (§4.E).
    pub worker_poll_interval: Duration,

    // ── Task queue profile ───────────────────────────────────────────
    /// Whether prescribed workflows include the `extract_examples`/
    /// `*_example_*` steps (§4.E).
    pub profile_examples: bool,
    /// Whether prescribed workflows include the enrichment steps (§4.E).
    pub profile_enrichments: bool,

    // ── Batcher (§4.A) ───────────────────────────────────────────────
    pub batcher_max_chars: usize,
    pub batcher_max_batch_size: usize,

    // ── Rank fusion (§4.B) ───────────────────────────────────────────
    pub rrf_k: f64,

    // ── Search backends (§4.C) ───────────────────────────────────────
    /// Which `Bm25Store` implementation to construct: `"tantivy"` (default,
    /// a dedicated process-local lexical index) or `"sqlite_fts"` (the
    /// SQL-extension variant, reusing the `snippets_fts` table `kodit-db`
    /// already maintains via triggers — no second index to keep in sync).
    pub bm25_backend: String,
    /// Model identifier used for `EmbeddingType::Code` vectors.
    pub code_embedding_model: String,
    /// Model identifier used for `EmbeddingType::Summary` vectors.
    pub summary_embedding_model: String,
    /// Per-`Index`-call failure budget as an integer percentage (§7).
    pub batch_failure_budget_pct: u8,
}

const DEFAULT_DATABASE_URL: &str = "sqlite://./kodit.db";
const DEFAULT_WORKER_COUNT: usize = 2;
const DEFAULT_WORKER_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_BATCHER_MAX_CHARS: usize = 16_000;
const DEFAULT_BATCHER_MAX_BATCH_SIZE: usize = 1;
const DEFAULT_RRF_K: f64 = 60.0;
const DEFAULT_BM25_BACKEND: &str = "tantivy";
const DEFAULT_CODE_EMBEDDING_MODEL: &str = "jinaai/jina-embeddings-v2-base-code";
const DEFAULT_SUMMARY_EMBEDDING_MODEL: &str = "BAAI/bge-small-en-v1.5";
const DEFAULT_BATCH_FAILURE_BUDGET_PCT: u8 = 5;

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_owned(),
            worker_count: DEFAULT_WORKER_COUNT,
            worker_poll_interval: Duration::from_millis(DEFAULT_WORKER_POLL_INTERVAL_MS),
            profile_examples: true,
            profile_enrichments: true,
            batcher_max_chars: DEFAULT_BATCHER_MAX_CHARS,
            batcher_max_batch_size: DEFAULT_BATCHER_MAX_BATCH_SIZE,
            rrf_k: DEFAULT_RRF_K,
            bm25_backend: DEFAULT_BM25_BACKEND.to_owned(),
            code_embedding_model: DEFAULT_CODE_EMBEDDING_MODEL.to_owned(),
            summary_embedding_model: DEFAULT_SUMMARY_EMBEDDING_MODEL.to_owned(),
            batch_failure_budget_pct: DEFAULT_BATCH_FAILURE_BUDGET_PCT,
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::InvalidInput(format!("{key}={raw:?} is not valid"))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset. Validates eagerly: an invalid value
    /// (wrong type, or a value rejected by `validate`) is an error here,
    /// never discovered later at first use.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let worker_poll_interval_ms: u64 = env_parsed(
            "KODIT_WORKER_POLL_INTERVAL_MS",
            u64::try_from(defaults.worker_poll_interval.as_millis()).unwrap_or(1_000),
        )?;

        let config = Self {
            database_url: env_string("KODIT_DATABASE_URL", &defaults.database_url),
            worker_count: env_parsed("KODIT_WORKER_COUNT", defaults.worker_count)?,
            worker_poll_interval: Duration::from_millis(worker_poll_interval_ms),
            profile_examples: env_parsed("KODIT_PROFILE_EXAMPLES", defaults.profile_examples)?,
            profile_enrichments: env_parsed(
                "KODIT_PROFILE_ENRICHMENTS",
                defaults.profile_enrichments,
            )?,
            batcher_max_chars: env_parsed("KODIT_BATCHER_MAX_CHARS", defaults.batcher_max_chars)?,
            batcher_max_batch_size: env_parsed(
                "KODIT_BATCHER_MAX_BATCH_SIZE",
                defaults.batcher_max_batch_size,
            )?,
            rrf_k: env_parsed("KODIT_RRF_K", defaults.rrf_k)?,
            bm25_backend: env_string("KODIT_BM25_BACKEND", &defaults.bm25_backend),
            code_embedding_model: env_string(
                "KODIT_CODE_EMBEDDING_MODEL",
                &defaults.code_embedding_model,
            ),
            summary_embedding_model: env_string(
                "KODIT_SUMMARY_EMBEDDING_MODEL",
                &defaults.summary_embedding_model,
            ),
            batch_failure_budget_pct: env_parsed(
                "KODIT_BATCH_FAILURE_BUDGET_PCT",
                defaults.batch_failure_budget_pct,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configuration that can never produce correct behavior
    /// (§4.A/§7: `maxChars == 0` is an error at construction time, not a
    /// silently-coerced default like `topK <= 0`).
    pub fn validate(&self) -> Result<()> {
        if self.batcher_max_chars == 0 {
            return Err(Error::InvalidInput("KODIT_BATCHER_MAX_CHARS must be > 0".into()));
        }
        if self.batcher_max_batch_size == 0 {
            return Err(Error::InvalidInput(
                "KODIT_BATCHER_MAX_BATCH_SIZE must be > 0".into(),
            ));
        }
        if self.worker_count == 0 {
            return Err(Error::InvalidInput("KODIT_WORKER_COUNT must be >= 1".into()));
        }
        if self.batch_failure_budget_pct > 100 {
            return Err(Error::InvalidInput(
                "KODIT_BATCH_FAILURE_BUDGET_PCT must be <= 100".into(),
            ));
        }
        if self.bm25_backend != "tantivy" && self.bm25_backend != "sqlite_fts" {
            return Err(Error::InvalidInput(format!(
                "KODIT_BM25_BACKEND must be \"tantivy\" or \"sqlite_fts\", got {:?}",
                self.bm25_backend
            )));
        }
        Ok(())
    }

    /// `rrf_k` coerced per §4.B: values `<= 0` fall back to the default.
    #[must_use]
    pub fn effective_rrf_k(&self) -> f64 {
        if self.rrf_k > 0.0 {
            self.rrf_k
        } else {
            DEFAULT_RRF_K
        }
    }
}
